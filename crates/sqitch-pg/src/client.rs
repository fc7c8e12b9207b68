//! Construcción del argv de `psql`.
//!
//! El orden es parte del contrato de compatibilidad: cliente, flags de
//! conexión presentes (username, dbname, host, port) y el bloque fijo de
//! opciones estándar, con `sqitch_schema` siempre al final.
use sqitch_core::ConnectionConfig;

pub fn psql_argv(cfg: &ConnectionConfig) -> Vec<String> {
    let mut argv = vec![cfg.client().to_string()];
    let port = cfg.port().map(|p| p.to_string());
    let conn_flags = [("--username", cfg.username()),
                      ("--dbname", cfg.db_name()),
                      ("--host", cfg.host()),
                      ("--port", port.as_deref())];
    for (flag, value) in conn_flags {
        if let Some(value) = value {
            argv.push(flag.to_string());
            argv.push(value.to_string());
        }
    }
    argv.extend(standard_options(cfg.sqitch_schema()));
    argv
}

fn standard_options(schema: &str) -> Vec<String> {
    ["--quiet",
     "--no-psqlrc",
     "--no-align",
     "--tuples-only",
     "--set",
     "ON_ERROR_ROLLBACK=1",
     "--set",
     "ON_ERROR_STOP=1",
     "--set"].iter()
             .map(|s| s.to_string())
             .chain(std::iter::once(format!("sqitch_schema={schema}")))
             .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::{DEFAULT_CLIENT, ENGINE_NAME};
    use sqitch_core::{AppOptions, ConnectionOptions};

    fn resolve(explicit: ConnectionOptions) -> ConnectionConfig {
        ConnectionConfig::resolve(ENGINE_NAME, &explicit, &HashMap::<String, String>::new(), &AppOptions::default(), DEFAULT_CLIENT).unwrap()
    }

    #[test]
    fn full_argv_in_fixed_order() {
        let cfg = resolve(ConnectionOptions { client: Some("/path/to/psql".into()),
                                              username: Some("freddy".into()),
                                              db_name: Some("widgets".into()),
                                              host: Some("db.example.com".into()),
                                              port: Some("1234".into()),
                                              sqitch_schema: Some("meta".into()),
                                              ..Default::default() });
        assert_eq!(psql_argv(&cfg).join(" "),
                   "/path/to/psql --username freddy --dbname widgets --host db.example.com --port 1234 \
                    --quiet --no-psqlrc --no-align --tuples-only \
                    --set ON_ERROR_ROLLBACK=1 --set ON_ERROR_STOP=1 --set sqitch_schema=meta");
    }

    #[test]
    fn unset_connection_flags_are_omitted() {
        let cfg = resolve(ConnectionOptions { host: Some("localhost".into()), ..Default::default() });
        let argv = psql_argv(&cfg);
        assert_eq!(argv[..3], ["psql", "--host", "localhost"]);
        assert!(!argv.iter().any(|a| a == "--username" || a == "--dbname" || a == "--port"));
    }

    #[test]
    fn password_never_appears_in_argv() {
        let cfg = resolve(ConnectionOptions { password: Some("s3cr3t".into()), ..Default::default() });
        assert!(!psql_argv(&cfg).iter().any(|a| a.contains("s3cr3t")));
    }

    #[test]
    fn sqitch_schema_setting_is_always_last() {
        let default = psql_argv(&resolve(ConnectionOptions::default()));
        let custom = psql_argv(&resolve(ConnectionOptions { sqitch_schema: Some("meta".into()), ..Default::default() }));
        assert_eq!(default.last().map(String::as_str), Some("sqitch_schema=sqitch"));
        assert_eq!(custom.last().map(String::as_str), Some("sqitch_schema=meta"));
        assert_eq!(default[..default.len() - 1], custom[..custom.len() - 1]);
    }
}
