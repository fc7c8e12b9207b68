//! Cálculo del destino (identificador visible de la base objetivo).
use super::ConnectionConfig;

/// Nombres de las variables de entorno que consulta cada backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvNames {
    /// Base de datos destino (`PGDATABASE`).
    pub database: &'static str,
    /// Usuario de la base (`PGUSER`).
    pub user: &'static str,
    /// Usuarios genéricos del SO, en orden (`USER`, `USERNAME`).
    pub os_user: &'static [&'static str],
    /// Credencial que sólo se pasa al cliente nativo (`PGPASSWORD`).
    pub password: &'static str,
}

impl EnvNames {
    /// Sin variables propias de un backend: sólo el usuario del SO.
    pub const OS_ONLY: EnvNames = EnvNames { database: "", user: "", os_user: &["USER", "USERNAME"], password: "" };
}

impl ConnectionConfig {
    /// Precedencia: `db_name` > env base > `username` > env usuario > usuario
    /// del SO. `None` si nada resuelve.
    pub fn destination_with<F>(&self, env: &EnvNames, lookup: F) -> Option<String>
        where F: Fn(&str) -> Option<String>
    {
        let lookup = |name: &str| {
            if name.is_empty() {
                return None;
            }
            lookup(name).filter(|v| !v.is_empty())
        };
        self.db_name
            .clone()
            .or_else(|| lookup(env.database))
            .or_else(|| self.username.clone())
            .or_else(|| lookup(env.user))
            .or_else(|| env.os_user.iter().find_map(|name| lookup(*name)))
    }
}
