//! sqitch-pg
//!
//! Backend PostgreSQL del engine de despliegue (Diesel, conexión síncrona).
//!
//! Módulos:
//! - `pg`: `PgEngine`, state store transaccional sobre `steps`/`tags`/`events`.
//! - `bootstrap`: DDL del state store y chequeo de existencia del schema.
//! - `client`: argv de `psql` para correr scripts de despliegue.
//! - `config`: variables de entorno de libpq, `.env` y cadena de conexión.
//! - `error`: errores nativos y su traducción a `EngineError`.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DEFAULT_CLIENT, ENGINE_NAME, PG_ENV};
pub use error::PgStoreError;
pub use pg::PgEngine;
