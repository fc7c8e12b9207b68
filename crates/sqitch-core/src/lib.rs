//! sqitch-core: contrato del engine de despliegue y piezas compartidas.
//!
//! Módulos:
//! - `plan`: nodos inmutables del plan (steps y tags).
//! - `config`: resolución de la configuración de conexión y del destino.
//! - `engine`: trait `Engine` con la lógica común y el backend en memoria.
//! - `event`: registros del state store.
//! - `process`: invocación bloqueante del cliente nativo.
//! - `errors`: error uniforme expuesto por todos los backends.

pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod plan;
pub mod process;

pub use config::{AppOptions, ConfigSource, ConnectionConfig, ConnectionOptions, EnvNames};
pub use engine::{Engine, InMemoryEngine};
pub use errors::{EngineError, ErrorKind};
pub use event::{DeployedStepRecord, DeployedTagRecord, EventKind, EventRecord};
pub use plan::{Plan, PlanNode, Step, Tag};
pub use process::{ProcessRunner, RunOutput, SystemRunner};
