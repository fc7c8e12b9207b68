//! Máquina de estados del state store sobre el backend en memoria.

use std::collections::HashMap;

use sqitch_core::{AppOptions, ConnectionConfig, ConnectionOptions, Engine, EngineError, EventKind, InMemoryEngine, Step, Tag};

fn engine() -> InMemoryEngine {
    let cfg = ConnectionConfig::resolve("memory",
                                        &ConnectionOptions::default(),
                                        &HashMap::<String, String>::new(),
                                        &AppOptions::default(),
                                        "psql").expect("config");
    let mut engine = InMemoryEngine::new(cfg, "Barney Rubble");
    engine.initialize().expect("initialize");
    engine
}

#[test]
fn initialize_is_not_repeatable() {
    let cfg = ConnectionConfig::resolve("memory",
                                        &ConnectionOptions::default(),
                                        &HashMap::<String, String>::new(),
                                        &AppOptions::default(),
                                        "psql").unwrap();
    let mut engine = InMemoryEngine::new(cfg, "tester");
    assert!(!engine.initialized().unwrap());
    engine.initialize().unwrap();
    assert!(engine.initialized().unwrap());
    let err = engine.initialize().unwrap_err();
    assert!(matches!(err, EngineError::SchemaExists(ref s) if s == "sqitch"));
    assert!(engine.initialized().unwrap());
}

#[test]
fn operations_before_initialize_fail() {
    let cfg = ConnectionConfig::resolve("memory",
                                        &ConnectionOptions::default(),
                                        &HashMap::<String, String>::new(),
                                        &AppOptions::default(),
                                        "psql").unwrap();
    let mut engine = InMemoryEngine::new(cfg, "tester");
    assert!(matches!(engine.is_deployed_step(&Step::new("users")), Err(EngineError::Store { .. })));
}

#[test]
fn deploy_then_revert_toggles_deployed_state() {
    let mut engine = engine();
    let users = Step::new("users");
    assert!(!engine.is_deployed_step(&users).unwrap());
    engine.log_deploy_step(&users).unwrap();
    assert!(engine.is_deployed_step(&users).unwrap());
    engine.log_revert_step(&users).unwrap();
    assert!(!engine.is_deployed_step(&users).unwrap());
}

#[test]
fn fail_without_deployed_record_appends_one_event() {
    let mut engine = engine();
    let users = Step::new("users");
    engine.log_fail_step(&users).unwrap();
    let events = engine.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventKind::Fail);
    assert_eq!(events[0].node, "users");
    assert_eq!(events[0].logged_by, "Barney Rubble");
    assert!(!engine.is_deployed_step(&users).unwrap());
}

#[test]
fn tag_requires_deployed_step() {
    let mut engine = engine();
    let users = Step::new("users");
    let alpha = Tag::new("alpha", &users);
    let err = engine.log_apply_tag(&alpha).unwrap_err();
    assert!(matches!(err, EngineError::ForeignKeyViolation { .. }));
    assert!(!engine.is_deployed_tag(&alpha).unwrap());
    assert!(engine.events().unwrap().is_empty(), "failed apply must not log");

    engine.log_deploy_step(&users).unwrap();
    engine.log_apply_tag(&alpha).unwrap();
    assert!(engine.is_deployed_tag(&alpha).unwrap());
}

#[test]
fn event_log_keeps_full_transition_history() {
    let mut engine = engine();
    let users = Step::new("users");
    let alpha = Tag::new("@alpha", &users);

    engine.log_deploy_step(&users).unwrap();
    engine.log_revert_step(&users).unwrap();
    engine.log_fail_step(&users).unwrap();
    engine.log_deploy_step(&users).unwrap();
    engine.log_apply_tag(&alpha).unwrap();
    engine.log_remove_tag(&alpha).unwrap();

    let got: Vec<(EventKind, String)> = engine.events().unwrap().into_iter().map(|e| (e.event, e.node)).collect();
    assert_eq!(got,
               vec![(EventKind::Deploy, "users".to_string()),
                    (EventKind::Revert, "users".to_string()),
                    (EventKind::Fail, "users".to_string()),
                    (EventKind::Deploy, "users".to_string()),
                    (EventKind::Apply, "@alpha".to_string()),
                    (EventKind::Remove, "@alpha".to_string())]);
    let events = engine.events().unwrap();
    assert!(events.windows(2).all(|w| w[0].logged_at < w[1].logged_at));
}

#[test]
fn latest_item_prefers_tag_until_removed() {
    let mut engine = engine();
    assert_eq!(engine.latest_item().unwrap(), None);
    assert_eq!(engine.latest_step().unwrap(), None);
    assert_eq!(engine.latest_tag().unwrap(), None);

    let users = Step::new("users");
    let widgets = Step::new("widgets");
    let alpha = Tag::new("alpha", &users);

    engine.log_deploy_step(&users).unwrap();
    assert_eq!(engine.latest_item().unwrap().as_deref(), Some("users"));

    engine.log_apply_tag(&alpha).unwrap();
    assert_eq!(engine.latest_tag().unwrap().as_deref(), Some("@alpha"));
    assert_eq!(engine.latest_item().unwrap().as_deref(), Some("@alpha"));

    engine.log_deploy_step(&widgets).unwrap();
    assert_eq!(engine.latest_step().unwrap().as_deref(), Some("widgets"));
    assert_eq!(engine.latest_item().unwrap().as_deref(), Some("widgets"));

    engine.log_revert_step(&widgets).unwrap();
    assert_eq!(engine.latest_item().unwrap().as_deref(), Some("@alpha"));

    engine.log_remove_tag(&alpha).unwrap();
    assert_eq!(engine.latest_tag().unwrap(), None);
    assert_eq!(engine.latest_item().unwrap().as_deref(), Some("users"));
}

#[test]
fn dependency_checks_preserve_order() {
    let mut engine = engine();
    engine.log_deploy_step(&Step::new("users")).unwrap();
    engine.log_deploy_step(&Step::new("widgets")).unwrap();

    let candidate = Step::with_dependencies("thingies",
                                            vec!["fred".into(), "barney".into(), "widgets".into()],
                                            vec!["users".into(), "widgets".into()]);
    assert_eq!(engine.check_requires(&candidate).unwrap(), vec!["fred", "barney"]);
    assert_eq!(engine.check_conflicts(&candidate).unwrap(), vec!["users", "widgets"]);

    let free = Step::with_dependencies("free", vec!["users".into()], vec!["nothing".into()]);
    assert!(engine.check_requires(&free).unwrap().is_empty());
    assert!(engine.check_conflicts(&free).unwrap().is_empty());
}

#[test]
fn run_file_and_handle_record_scripts() {
    let engine = engine();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"CREATE TABLE users (id int);").unwrap();
    engine.run_file(file.path()).unwrap();
    let mut input: &[u8] = b"DROP TABLE users;";
    engine.run_handle(&mut input).unwrap();
    assert_eq!(engine.executed_scripts(), vec!["CREATE TABLE users (id int);", "DROP TABLE users;"]);
    assert!(matches!(engine.run_file(std::path::Path::new("/nonexistent/deploy.sql")), Err(EngineError::Io { .. })));
}
