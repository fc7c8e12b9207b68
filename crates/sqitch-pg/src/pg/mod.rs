//! Implementación Postgres (Diesel) del trait `Engine`.
//!
//! - Una sola conexión por engine, abierta al primer uso y reutilizada.
//! - Cada transición (fila de `steps`/`tags` + evento) corre en una única
//!   transacción read-write; nunca queda visible a medias.
//! - Errores transitorios se reintentan con backoff corto; la unidad
//!   reintentada es siempre la transacción completa.
//! - Todo error nativo se traduce a `EngineError` antes de salir.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use log::{debug, warn};

use sqitch_core::{AppOptions, ConfigSource, ConnectionConfig, ConnectionOptions, DeployedStepRecord, DeployedTagRecord,
                  Engine, EngineError, EventKind, EventRecord, ProcessRunner, Step, SystemRunner, Tag};

use crate::bootstrap::{create_state_store, schema_exists, set_search_path};
use crate::client::psql_argv;
use crate::config::{conninfo, DEFAULT_CLIENT, ENGINE_NAME, PG_ENV};
use crate::error::{PgStoreError, ENGINE_IDENT};
use crate::schema::{events, steps, tags};

/// Fila mapeada de `steps` (orden de columnas del `table!`).
#[derive(Queryable, Debug)]
pub struct StepRow {
    pub step_id: String,
    pub step: String,
    pub requires: Vec<String>,
    pub conflicts: Vec<String>,
    pub deployed_by: String,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = steps)]
pub struct NewStepRow<'a> {
    pub step_id: &'a str,
    pub step: &'a str,
    pub requires: &'a [String],
    pub conflicts: &'a [String],
    pub deployed_by: &'a str,
}

#[derive(Queryable, Debug)]
pub struct TagRow {
    pub tag_id: String,
    pub tag: String,
    pub step_id: String,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = tags)]
pub struct NewTagRow<'a> {
    pub tag_id: &'a str,
    pub tag: &'a str,
    pub step_id: &'a str,
    pub applied_by: &'a str,
}

#[derive(Queryable, Debug)]
pub struct EventRow {
    pub event: String,
    pub node_id: String,
    pub node: String,
    pub logged_by: String,
    pub logged_at: DateTime<Utc>,
}

/// Inserción en `events`; `logged_at` lo asigna la base (`clock_timestamp()`).
#[derive(Insertable, Debug)]
#[diesel(table_name = events)]
pub struct NewEventRow<'a> {
    pub event: &'a str,
    pub node_id: &'a str,
    pub node: &'a str,
    pub logged_by: &'a str,
}

impl From<StepRow> for DeployedStepRecord {
    fn from(r: StepRow) -> Self {
        Self { step_id: r.step_id,
               step: r.step,
               requires: r.requires,
               conflicts: r.conflicts,
               deployed_by: r.deployed_by,
               deployed_at: r.deployed_at }
    }
}

impl From<TagRow> for DeployedTagRecord {
    fn from(r: TagRow) -> Self {
        Self { tag_id: r.tag_id, tag: r.tag, step_id: r.step_id, applied_by: r.applied_by, applied_at: r.applied_at }
    }
}

/// Retry simple con backoff lineal muy pequeño (hasta 3 reintentos).
///
/// Política:
/// - Backoff: 15ms, 30ms, 45ms.
/// - Logs: se emite `warn!` por intento.
/// - Una desconexión sólo se reintenta si `idempotent`: una escritura pudo
///   haber hecho commit antes de que se cortara la conexión.
fn with_retry<F, T>(idempotent: bool, mut f: F) -> Result<T, PgStoreError>
    where F: FnMut() -> Result<T, PgStoreError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && (idempotent || !e.is_disconnect()) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn insert_event(tx: &mut PgConnection, kind: EventKind, node_id: &str, node: &str, actor: &str) -> Result<(), DieselError> {
    diesel::insert_into(events::table).values(NewEventRow { event: kind.as_str(), node_id, node, logged_by: actor })
                                      .execute(tx)?;
    Ok(())
}

fn open_connection(cfg: &ConnectionConfig) -> Result<PgConnection, PgStoreError> {
    let mut conn = PgConnection::establish(&conninfo(cfg))?;
    set_search_path(&mut conn, cfg.sqitch_schema())?;
    Ok(conn)
}

/// Engine de Postgres.
pub struct PgEngine {
    config: ConnectionConfig,
    actor: String,
    conn: Option<PgConnection>,
    runner: Box<dyn ProcessRunner>,
}

impl PgEngine {
    /// Engine sobre una configuración ya resuelta. No abre la conexión.
    pub fn new(config: ConnectionConfig, actor: impl Into<String>) -> Self {
        Self { config, actor: actor.into(), conn: None, runner: Box::new(SystemRunner) }
    }

    /// Resuelve las cuatro capas de configuración (`core.pg.*`) y el actor.
    pub fn from_layers(explicit: &ConnectionOptions, file: &dyn ConfigSource, app: &AppOptions) -> Result<Self, EngineError> {
        let config = ConnectionConfig::resolve(ENGINE_NAME, explicit, file, app, DEFAULT_CLIENT)?;
        let actor = app.actor_with(|k| std::env::var(k).ok());
        Ok(Self::new(config, actor))
    }

    /// Reemplaza el runner del cliente nativo.
    pub fn with_runner(mut self, runner: Box<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Argv base de `psql` para esta configuración.
    pub fn client_command(&self) -> Vec<String> {
        psql_argv(&self.config)
    }

    fn translate(&self, err: PgStoreError) -> EngineError {
        let destination = self.destination().unwrap_or_else(|| ENGINE_IDENT.to_string());
        err.into_engine_error(&destination)
    }

    fn connection(&mut self) -> Result<&mut PgConnection, PgStoreError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                debug!("connection:open schema={}", self.config.sqitch_schema());
                open_connection(&self.config)?
            }
        };
        Ok(self.conn.insert(conn))
    }

    /// Lectura con la conexión, con retry; descarta la conexión si se cayó.
    fn with_connection<F, T>(&mut self, f: F) -> Result<T, EngineError>
        where F: FnMut(&mut PgConnection) -> Result<T, PgStoreError>
    {
        self.run_with_connection(true, f)
    }

    fn run_with_connection<F, T>(&mut self, idempotent: bool, mut f: F) -> Result<T, EngineError>
        where F: FnMut(&mut PgConnection) -> Result<T, PgStoreError>
    {
        let result = with_retry(idempotent, || {
            let conn = self.connection()?;
            let r = f(conn);
            if matches!(&r, Err(e) if e.is_disconnect()) {
                self.conn = None;
            }
            r
        });
        result.map_err(|e| self.translate(e))
    }

    /// Transacción read-write con el actor del engine.
    fn transact<F>(&mut self, f: F) -> Result<(), EngineError>
        where F: Fn(&mut PgConnection, &str) -> Result<(), DieselError>
    {
        let actor = self.actor.clone();
        self.run_with_connection(false, |conn| {
                conn.build_transaction()
                    .read_write()
                    .run(|tx| f(tx, &actor))
                    .map_err(PgStoreError::from)
            })
    }

    fn run_client(&self, extra: &[String], input: Option<&mut dyn Read>) -> Result<(), EngineError> {
        let mut argv = psql_argv(&self.config);
        argv.extend_from_slice(extra);
        let env = self.config.client_env(PG_ENV.password);
        self.runner.run(&argv, &env, input)?.into_result(self.config.client())?;
        Ok(())
    }
}

impl Engine for PgEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn destination(&self) -> Option<String> {
        self.config.destination_with(&PG_ENV, |k| std::env::var(k).ok())
    }

    fn actor(&self) -> &str {
        &self.actor
    }

    fn initialized(&mut self) -> Result<bool, EngineError> {
        let schema = self.config.sqitch_schema().to_string();
        self.with_connection(|conn| Ok(schema_exists(conn, &schema)?))
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        let schema = self.config.sqitch_schema().to_string();
        debug!("initialize:start schema={schema}");
        self.run_with_connection(false, |conn| create_state_store(conn, &schema))?;
        debug!("initialize:done schema={schema}");
        Ok(())
    }

    fn run_file(&self, path: &Path) -> Result<(), EngineError> {
        debug!("run_file path={}", path.display());
        self.run_client(&["--file".to_string(), path.display().to_string()], None)
    }

    fn run_handle(&self, input: &mut dyn Read) -> Result<(), EngineError> {
        debug!("run_handle");
        self.run_client(&[], Some(input))
    }

    fn log_deploy_step(&mut self, step: &Step) -> Result<(), EngineError> {
        debug!("log_deploy_step:start step={}", step.name);
        self.transact(|tx, actor| {
                diesel::insert_into(steps::table).values(NewStepRow { step_id: &step.id,
                                                                      step: &step.name,
                                                                      requires: &step.requires,
                                                                      conflicts: &step.conflicts,
                                                                      deployed_by: actor })
                                                 .execute(tx)?;
                insert_event(tx, EventKind::Deploy, &step.id, &step.name, actor)
            })?;
        debug!("log_deploy_step:done step={}", step.name);
        Ok(())
    }

    fn log_revert_step(&mut self, step: &Step) -> Result<(), EngineError> {
        debug!("log_revert_step:start step={}", step.name);
        self.transact(|tx, actor| {
                diesel::delete(steps::table.filter(steps::step_id.eq(&step.id))).execute(tx)?;
                insert_event(tx, EventKind::Revert, &step.id, &step.name, actor)
            })?;
        debug!("log_revert_step:done step={}", step.name);
        Ok(())
    }

    fn log_fail_step(&mut self, step: &Step) -> Result<(), EngineError> {
        debug!("log_fail_step step={}", step.name);
        self.transact(|tx, actor| insert_event(tx, EventKind::Fail, &step.id, &step.name, actor))
    }

    fn log_apply_tag(&mut self, tag: &Tag) -> Result<(), EngineError> {
        let name = tag.formatted_name();
        debug!("log_apply_tag:start tag={name} step={}", tag.step_name);
        self.transact(|tx, actor| {
                diesel::insert_into(tags::table).values(NewTagRow { tag_id: &tag.id,
                                                                    tag: &name,
                                                                    step_id: &tag.step_id,
                                                                    applied_by: actor })
                                                .execute(tx)?;
                insert_event(tx, EventKind::Apply, &tag.id, &name, actor)
            })?;
        debug!("log_apply_tag:done tag={name}");
        Ok(())
    }

    fn log_remove_tag(&mut self, tag: &Tag) -> Result<(), EngineError> {
        let name = tag.formatted_name();
        debug!("log_remove_tag:start tag={name}");
        self.transact(|tx, actor| {
                diesel::delete(tags::table.filter(tags::tag_id.eq(&tag.id))).execute(tx)?;
                insert_event(tx, EventKind::Remove, &tag.id, &name, actor)
            })?;
        debug!("log_remove_tag:done tag={name}");
        Ok(())
    }

    fn is_deployed_step(&mut self, step: &Step) -> Result<bool, EngineError> {
        self.with_connection(|conn| {
                Ok(diesel::select(exists(steps::table.filter(steps::step_id.eq(&step.id)))).get_result::<bool>(conn)?)
            })
    }

    fn is_deployed_tag(&mut self, tag: &Tag) -> Result<bool, EngineError> {
        self.with_connection(|conn| {
                Ok(diesel::select(exists(tags::table.filter(tags::tag_id.eq(&tag.id)))).get_result::<bool>(conn)?)
            })
    }

    fn deployed_step_names(&mut self, names: &[String]) -> Result<HashSet<String>, EngineError> {
        let found: Vec<String> = self.with_connection(|conn| {
                                         Ok(steps::table.filter(steps::step.eq_any(names))
                                                        .select(steps::step)
                                                        .load(conn)?)
                                     })?;
        Ok(found.into_iter().collect())
    }

    fn latest_step_record(&mut self) -> Result<Option<DeployedStepRecord>, EngineError> {
        let row: Option<StepRow> = self.with_connection(|conn| {
                                           Ok(steps::table.order(steps::deployed_at.desc())
                                                          .first(conn)
                                                          .optional()?)
                                       })?;
        Ok(row.map(DeployedStepRecord::from))
    }

    fn latest_tag_record(&mut self) -> Result<Option<DeployedTagRecord>, EngineError> {
        let row: Option<TagRow> = self.with_connection(|conn| {
                                          Ok(tags::table.order(tags::applied_at.desc())
                                                        .first(conn)
                                                        .optional()?)
                                      })?;
        Ok(row.map(DeployedTagRecord::from))
    }

    fn events(&mut self) -> Result<Vec<EventRecord>, EngineError> {
        debug!("events:start");
        let rows: Vec<EventRow> = self.with_connection(|conn| {
                                          Ok(events::table.order(events::logged_at.asc()).load(conn)?)
                                      })?;
        let records = rows.into_iter()
                          .map(|r| {
                              let event = r.event.parse::<EventKind>().map_err(|message| EngineError::Store { ident: ENGINE_IDENT.to_string(),
                                                                                                              message,
                                                                                                              source: None })?;
                              Ok(EventRecord { event, node_id: r.node_id, node: r.node, logged_by: r.logged_by, logged_at: r.logged_at })
                          })
                          .collect::<Result<Vec<_>, EngineError>>()?;
        debug!("events:done count={}", records.len());
        Ok(records)
    }
}
