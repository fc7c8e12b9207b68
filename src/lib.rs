//! sqitch-rust
//!
//! Engine de despliegue de cambios de base de datos: registra qué steps y
//! tags están desplegados en un state store dentro de la propia base destino
//! y corre los scripts de cada step con el cliente nativo.
//!
//! - `sqitch_core`: trait `Engine`, configuración, errores, modelo del plan
//!   y backend en memoria.
//! - `sqitch_pg`: backend PostgreSQL (Diesel + `psql`).
//!
//! `engine_for` elige el backend por nombre.

use log::debug;

pub use sqitch_core::*;
pub use sqitch_pg::{PgEngine, PgStoreError};

/// Nombre del backend en memoria para `engine_for`.
pub const MEMORY_ENGINE: &str = "memory";

/// Construye el engine `name` resolviendo las capas de configuración
/// (`explicit`, `core.<name>.*` en `file`, `app`).
pub fn engine_for(name: &str, explicit: &ConnectionOptions, file: &dyn ConfigSource, app: &AppOptions)
                  -> Result<Box<dyn Engine>, EngineError> {
    debug!("engine_for name={name}");
    match name {
        sqitch_pg::ENGINE_NAME => Ok(Box::new(PgEngine::from_layers(explicit, file, app)?)),
        MEMORY_ENGINE => {
            let config = ConnectionConfig::resolve(MEMORY_ENGINE, explicit, file, app, MEMORY_ENGINE)?;
            let actor = app.actor_with(|k| std::env::var(k).ok());
            Ok(Box::new(InMemoryEngine::new(config, actor)))
        }
        other => Err(EngineError::Config(format!("unknown engine \"{other}\""))),
    }
}
