//! Backend en memoria con la misma semántica observable que el de Postgres.
//!
//! Sirve como referencia de la máquina de estados y para probar a los
//! consumidores del trait sin base de datos. Cada operación valida antes de
//! mutar, de modo que una falla no deja efectos parciales.
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use super::Engine;
use crate::config::{ConnectionConfig, EnvNames};
use crate::errors::EngineError;
use crate::event::{DeployedStepRecord, DeployedTagRecord, EventKind, EventRecord};
use crate::plan::{Step, Tag};

const IDENT: &str = "memory";

#[derive(Debug, Default)]
struct StateStore {
    steps: Vec<DeployedStepRecord>,
    tags: Vec<DeployedTagRecord>,
    events: Vec<EventRecord>,
}

#[derive(Debug)]
pub struct InMemoryEngine {
    config: ConnectionConfig,
    actor: String,
    store: Option<StateStore>,
    last_ts: Option<DateTime<Utc>>,
    scripts: RefCell<Vec<String>>,
    env: EnvNames,
    lookup: fn(&str) -> Option<String>,
}

impl InMemoryEngine {
    pub fn new(config: ConnectionConfig, actor: impl Into<String>) -> Self {
        Self { config,
               actor: actor.into(),
               store: None,
               last_ts: None,
               scripts: RefCell::new(Vec::new()),
               env: EnvNames::OS_ONLY,
               lookup: |k| std::env::var(k).ok() }
    }

    /// Variables de entorno (y su fuente) consultadas por `destination`.
    pub fn with_env(mut self, env: EnvNames, lookup: fn(&str) -> Option<String>) -> Self {
        self.env = env;
        self.lookup = lookup;
        self
    }

    /// Scripts ejecutados vía `run_file`/`run_handle`, en orden.
    pub fn executed_scripts(&self) -> Vec<String> {
        self.scripts.borrow().clone()
    }

    // Reloj estrictamente creciente: dos escrituras nunca comparten timestamp.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_ts {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_ts = Some(ts);
        ts
    }

    fn store(&self) -> Result<&StateStore, EngineError> {
        self.store.as_ref().ok_or_else(not_initialized)
    }

    /// Ejecuta `f` sobre el store con un timestamp nuevo.
    fn write<F>(&mut self, f: F) -> Result<(), EngineError>
        where F: FnOnce(&mut StateStore, &str, DateTime<Utc>) -> Result<(), EngineError>
    {
        self.store()?;
        let ts = self.tick();
        let actor = self.actor.clone();
        let store = self.store.as_mut().ok_or_else(not_initialized)?;
        f(store, &actor, ts)
    }
}

fn not_initialized() -> EngineError {
    EngineError::Store { ident: IDENT.into(), message: "state store is not initialized".into(), source: None }
}

fn event(kind: EventKind, node_id: &str, node: &str, actor: &str, ts: DateTime<Utc>) -> EventRecord {
    EventRecord { event: kind, node_id: node_id.to_string(), node: node.to_string(), logged_by: actor.to_string(), logged_at: ts }
}

impl Engine for InMemoryEngine {
    fn name(&self) -> &'static str {
        IDENT
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn destination(&self) -> Option<String> {
        self.config.destination_with(&self.env, self.lookup).or_else(|| Some(IDENT.to_string()))
    }

    fn actor(&self) -> &str {
        &self.actor
    }

    fn initialized(&mut self) -> Result<bool, EngineError> {
        Ok(self.store.is_some())
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.store.is_some() {
            return Err(EngineError::SchemaExists(self.config.sqitch_schema().to_string()));
        }
        self.store = Some(StateStore::default());
        Ok(())
    }

    fn run_file(&self, path: &Path) -> Result<(), EngineError> {
        let sql = std::fs::read_to_string(path).map_err(|e| EngineError::io(format!("cannot read {}", path.display()), e))?;
        self.scripts.borrow_mut().push(sql);
        Ok(())
    }

    fn run_handle(&self, input: &mut dyn Read) -> Result<(), EngineError> {
        let mut sql = String::new();
        input.read_to_string(&mut sql).map_err(|e| EngineError::io("cannot read script input", e))?;
        self.scripts.borrow_mut().push(sql);
        Ok(())
    }

    fn log_deploy_step(&mut self, step: &Step) -> Result<(), EngineError> {
        self.write(|store, actor, ts| {
                if store.steps.iter().any(|s| s.step_id == step.id) {
                    return Err(EngineError::Store { ident: IDENT.into(),
                                                    message: format!("step \"{}\" is already deployed", step.name),
                                                    source: None });
                }
                store.steps.push(DeployedStepRecord { step_id: step.id.clone(),
                                                      step: step.name.clone(),
                                                      requires: step.requires.clone(),
                                                      conflicts: step.conflicts.clone(),
                                                      deployed_by: actor.to_string(),
                                                      deployed_at: ts });
                store.events.push(event(EventKind::Deploy, &step.id, &step.name, actor, ts));
                Ok(())
            })
    }

    fn log_revert_step(&mut self, step: &Step) -> Result<(), EngineError> {
        self.write(|store, actor, ts| {
                if store.tags.iter().any(|t| t.step_id == step.id) {
                    return Err(EngineError::ForeignKeyViolation { ident: IDENT.into(),
                                                                  message: format!("step \"{}\" is still referenced by a tag", step.name),
                                                                  source: None });
                }
                store.steps.retain(|s| s.step_id != step.id);
                store.events.push(event(EventKind::Revert, &step.id, &step.name, actor, ts));
                Ok(())
            })
    }

    fn log_fail_step(&mut self, step: &Step) -> Result<(), EngineError> {
        self.write(|store, actor, ts| {
                store.events.push(event(EventKind::Fail, &step.id, &step.name, actor, ts));
                Ok(())
            })
    }

    fn log_apply_tag(&mut self, tag: &Tag) -> Result<(), EngineError> {
        let name = tag.formatted_name();
        self.write(|store, actor, ts| {
                if !store.steps.iter().any(|s| s.step_id == tag.step_id) {
                    return Err(EngineError::ForeignKeyViolation { ident: IDENT.into(),
                                                                  message: format!("tag \"{name}\" references step \"{}\" which is not deployed",
                                                                                   tag.step_name),
                                                                  source: None });
                }
                if store.tags.iter().any(|t| t.tag_id == tag.id) {
                    return Err(EngineError::Store { ident: IDENT.into(),
                                                    message: format!("tag \"{name}\" is already applied"),
                                                    source: None });
                }
                store.tags.push(DeployedTagRecord { tag_id: tag.id.clone(),
                                                    tag: name.clone(),
                                                    step_id: tag.step_id.clone(),
                                                    applied_by: actor.to_string(),
                                                    applied_at: ts });
                store.events.push(event(EventKind::Apply, &tag.id, &name, actor, ts));
                Ok(())
            })
    }

    fn log_remove_tag(&mut self, tag: &Tag) -> Result<(), EngineError> {
        let name = tag.formatted_name();
        self.write(|store, actor, ts| {
                store.tags.retain(|t| t.tag_id != tag.id);
                store.events.push(event(EventKind::Remove, &tag.id, &name, actor, ts));
                Ok(())
            })
    }

    fn is_deployed_step(&mut self, step: &Step) -> Result<bool, EngineError> {
        Ok(self.store()?.steps.iter().any(|s| s.step_id == step.id))
    }

    fn is_deployed_tag(&mut self, tag: &Tag) -> Result<bool, EngineError> {
        Ok(self.store()?.tags.iter().any(|t| t.tag_id == tag.id))
    }

    fn deployed_step_names(&mut self, names: &[String]) -> Result<HashSet<String>, EngineError> {
        Ok(self.store()?
               .steps
               .iter()
               .filter(|s| names.contains(&s.step))
               .map(|s| s.step.clone())
               .collect())
    }

    fn latest_step_record(&mut self) -> Result<Option<DeployedStepRecord>, EngineError> {
        Ok(self.store()?.steps.iter().max_by_key(|s| s.deployed_at).cloned())
    }

    fn latest_tag_record(&mut self) -> Result<Option<DeployedTagRecord>, EngineError> {
        Ok(self.store()?.tags.iter().max_by_key(|t| t.applied_at).cloned())
    }

    fn events(&mut self) -> Result<Vec<EventRecord>, EngineError> {
        let mut events = self.store()?.events.clone();
        events.sort_by_key(|e| e.logged_at);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::{AppOptions, ConnectionOptions};

    const ENV: EnvNames = EnvNames { database: "MEMDATABASE",
                                     user: "MEMUSER",
                                     os_user: &["USER"],
                                     password: "MEMPASSWORD" };

    fn engine(username: Option<&str>, db_name: Option<&str>) -> InMemoryEngine {
        let explicit = ConnectionOptions { username: username.map(String::from),
                                           db_name: db_name.map(String::from),
                                           ..Default::default() };
        let cfg = ConnectionConfig::resolve(IDENT, &explicit, &HashMap::<String, String>::new(), &AppOptions::default(), IDENT).unwrap();
        InMemoryEngine::new(cfg, "tester")
    }

    fn full_env(k: &str) -> Option<String> {
        match k {
            "MEMDATABASE" => Some("x".into()),
            "MEMUSER" => Some("y".into()),
            "USER" => Some("z".into()),
            _ => None,
        }
    }

    fn os_user_only(k: &str) -> Option<String> {
        (k == "USER").then(|| "z".to_string())
    }

    #[test]
    fn destination_follows_shared_precedence() {
        assert_eq!(engine(None, None).with_env(ENV, full_env).destination().as_deref(), Some("x"));
        assert_eq!(engine(None, None).with_env(ENV, os_user_only).destination().as_deref(), Some("z"));
        assert_eq!(engine(Some("fred"), None).with_env(ENV, os_user_only).destination().as_deref(), Some("fred"));
        assert_eq!(engine(Some("fred"), Some("widgets")).with_env(ENV, full_env).destination().as_deref(), Some("widgets"));
    }

    #[test]
    fn destination_falls_back_to_backend_name() {
        let engine = engine(None, None).with_env(ENV, |_| None);
        assert_eq!(engine.destination().as_deref(), Some("memory"));
    }
}
