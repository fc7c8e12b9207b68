//! Convenciones de entorno de Postgres y cadena de conexión libpq.

use once_cell::sync::Lazy;
use dotenvy::dotenv;
use sqitch_core::{ConnectionConfig, EnvNames};

/// Nombre del engine en las claves `core.pg.*`.
pub const ENGINE_NAME: &str = "pg";

/// Cliente nativo por defecto según plataforma.
pub const DEFAULT_CLIENT: &str = if cfg!(windows) { "psql.exe" } else { "psql" };

/// Variables que libpq y psql entienden.
pub const PG_ENV: EnvNames = EnvNames { database: "PGDATABASE",
                                        user: "PGUSER",
                                        os_user: &["USER", "USERNAME"],
                                        password: "PGPASSWORD" };

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

/// Cadena `key=value` para `PQconnectdb`. Sólo incluye los atributos
/// configurados; el resto lo completa libpq desde su propio entorno.
pub fn conninfo(cfg: &ConnectionConfig) -> String {
    let port = cfg.port().map(|p| p.to_string());
    let pairs = [("host", cfg.host()),
                 ("port", port.as_deref()),
                 ("user", cfg.username()),
                 ("password", cfg.password()),
                 ("dbname", cfg.db_name())];
    let mut parts: Vec<String> = pairs.iter()
                                      .filter_map(|(k, v)| v.map(|v| format!("{k}={}", quote_value(v))))
                                      .collect();
    parts.push("application_name=sqitch".to_string());
    parts.join(" ")
}

fn quote_value(v: &str) -> String {
    format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use sqitch_core::{AppOptions, ConnectionOptions};

    #[test]
    fn conninfo_quotes_and_skips_unset() {
        let explicit = ConnectionOptions { username: Some("fred".into()),
                                           password: Some("it's\\me".into()),
                                           port: Some("5433".into()),
                                           ..Default::default() };
        let cfg = ConnectionConfig::resolve(ENGINE_NAME, &explicit, &HashMap::<String, String>::new(), &AppOptions::default(), DEFAULT_CLIENT).unwrap();
        assert_eq!(conninfo(&cfg), "port='5433' user='fred' password='it\\'s\\\\me' application_name=sqitch");
    }
}
