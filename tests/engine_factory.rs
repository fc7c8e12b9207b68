use std::collections::HashMap;

use sqitch_rust::{engine_for, AppOptions, ConnectionOptions, ErrorKind, Step, Tag};

fn no_file() -> HashMap<String, String> {
    HashMap::new()
}

#[test]
fn pg_engine_resolves_engine_scoped_keys() {
    let mut file = no_file();
    file.insert("core.pg.db_name".into(), "widgets".into());
    file.insert("core.pg.sqitch_schema".into(), "meta".into());
    file.insert("core.memory.db_name".into(), "ignored".into());
    let engine = engine_for("pg", &ConnectionOptions::default(), &file, &AppOptions::default()).unwrap();
    assert_eq!(engine.name(), "pg");
    assert_eq!(engine.destination().as_deref(), Some("widgets"));
    assert_eq!(engine.config().sqitch_schema(), "meta");
}

#[test]
fn unknown_engine_is_config_error() {
    let err = engine_for("oracle", &ConnectionOptions::default(), &no_file(), &AppOptions::default()).err()
                                                                                                    .expect("unknown engine");
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("oracle"));
}

#[test]
fn memory_engine_runs_full_lifecycle_through_trait_object() {
    let app = AppOptions { actor: Some("Wilma".into()), ..Default::default() };
    let mut engine = engine_for("memory", &ConnectionOptions::default(), &no_file(), &app).unwrap();
    assert_eq!(engine.actor(), "Wilma");
    engine.initialize().unwrap();

    let users = Step::new("users");
    engine.log_deploy_step(&users).unwrap();
    engine.log_apply_tag(&Tag::new("v1", &users)).unwrap();
    assert_eq!(engine.latest_item().unwrap().as_deref(), Some("@v1"));
    assert_eq!(engine.events().unwrap().len(), 2);
    assert!(engine.events().unwrap().iter().all(|e| e.logged_by == "Wilma"));
}
