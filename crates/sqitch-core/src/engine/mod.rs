//! Contrato del engine y lógica compartida entre backends.
//!
//! Cada backend implementa las primitivas de su dialecto (DDL, escrituras
//! transaccionales, consultas puntuales, invocación del cliente nativo). El
//! chequeo de dependencias y el cálculo de `latest_*` son métodos por defecto
//! construidos sobre esas primitivas, idénticos para todos los backends.
//!
//! Máquina de estados por step (derivada de la presencia de filas):
//! `NotDeployed --log_deploy_step--> Deployed --log_revert_step|log_fail_step--> NotDeployed`.

mod memory;

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::config::ConnectionConfig;
use crate::errors::EngineError;
use crate::event::{DeployedStepRecord, DeployedTagRecord, EventRecord};
use crate::plan::{Step, Tag};

pub use memory::InMemoryEngine;

pub trait Engine {
    /// Identificador del backend (`pg`, `memory`).
    fn name(&self) -> &'static str;
    fn config(&self) -> &ConnectionConfig;
    /// Destino visible; se recalcula en cada llamada.
    fn destination(&self) -> Option<String>;
    /// Identidad estampada en cada escritura.
    fn actor(&self) -> &str;

    /// `true` sii el schema del state store ya existe.
    fn initialized(&mut self) -> Result<bool, EngineError>;
    /// Crea schema y tablas de forma atómica; `SchemaExists` si ya existen.
    fn initialize(&mut self) -> Result<(), EngineError>;

    /// Ejecuta un script SQL con el cliente nativo.
    fn run_file(&self, path: &Path) -> Result<(), EngineError>;
    /// Ejecuta el SQL leído de `input` con el cliente nativo.
    fn run_handle(&self, input: &mut dyn Read) -> Result<(), EngineError>;

    fn log_deploy_step(&mut self, step: &Step) -> Result<(), EngineError>;
    fn log_revert_step(&mut self, step: &Step) -> Result<(), EngineError>;
    /// Sólo agrega el evento `fail`; no exige que el step esté desplegado.
    fn log_fail_step(&mut self, step: &Step) -> Result<(), EngineError>;
    /// Falla con `ForeignKeyViolation` si el step del tag no está desplegado.
    fn log_apply_tag(&mut self, tag: &Tag) -> Result<(), EngineError>;
    fn log_remove_tag(&mut self, tag: &Tag) -> Result<(), EngineError>;

    fn is_deployed_step(&mut self, step: &Step) -> Result<bool, EngineError>;
    fn is_deployed_tag(&mut self, tag: &Tag) -> Result<bool, EngineError>;

    /// Subconjunto de `names` con fila vigente en `steps`.
    fn deployed_step_names(&mut self, names: &[String]) -> Result<HashSet<String>, EngineError>;
    /// Fila de `steps` con `deployed_at` más reciente.
    fn latest_step_record(&mut self) -> Result<Option<DeployedStepRecord>, EngineError>;
    /// Fila de `tags` con `applied_at` más reciente.
    fn latest_tag_record(&mut self) -> Result<Option<DeployedTagRecord>, EngineError>;
    /// Bitácora completa ordenada por `logged_at`.
    fn events(&mut self) -> Result<Vec<EventRecord>, EngineError>;

    fn latest_step(&mut self) -> Result<Option<String>, EngineError> {
        Ok(self.latest_step_record()?.map(|r| r.step))
    }

    fn latest_tag(&mut self) -> Result<Option<String>, EngineError> {
        Ok(self.latest_tag_record()?.map(|r| r.tag))
    }

    /// Tag vigente si su aplicación es al menos tan reciente como el último
    /// step desplegado; si no, el último step.
    fn latest_item(&mut self) -> Result<Option<String>, EngineError> {
        let step = self.latest_step_record()?;
        let tag = self.latest_tag_record()?;
        Ok(match (step, tag) {
            (Some(s), Some(t)) if t.applied_at >= s.deployed_at => Some(t.tag),
            (Some(s), _) => Some(s.step),
            (None, Some(t)) => Some(t.tag),
            (None, None) => None,
        })
    }

    /// Requisitos de `step` que no están desplegados, en el orden original.
    fn check_requires(&mut self, step: &Step) -> Result<Vec<String>, EngineError> {
        if step.requires.is_empty() {
            return Ok(Vec::new());
        }
        let deployed = self.deployed_step_names(&step.requires)?;
        Ok(step.requires.iter().filter(|r| !deployed.contains(*r)).cloned().collect())
    }

    /// Conflictos de `step` que sí están desplegados, en el orden original.
    fn check_conflicts(&mut self, step: &Step) -> Result<Vec<String>, EngineError> {
        if step.conflicts.is_empty() {
            return Ok(Vec::new());
        }
        let deployed = self.deployed_step_names(&step.conflicts)?;
        Ok(step.conflicts.iter().filter(|c| deployed.contains(*c)).cloned().collect())
    }
}
