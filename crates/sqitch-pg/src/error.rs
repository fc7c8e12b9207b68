//! Errores nativos del backend Postgres.
//! Mapea errores de Diesel / conexión a variantes semánticas y, en la frontera
//! pública del engine, a `sqitch_core::EngineError`.

use diesel::result::{ConnectionError, DatabaseErrorKind, Error as DieselError};
use sqitch_core::EngineError;
use thiserror::Error;

/// Identificador usado cuando el driver no aporta un tipo de error propio.
pub const ENGINE_IDENT: &str = "pg";

#[derive(Debug, Error)]
pub enum PgStoreError {
    #[error("foreign key violation: {message}")]
    ForeignKeyViolation {
        message: String,
        #[source]
        source: DieselError,
    },
    #[error("serialization conflict (retryable): {message}")]
    SerializationConflict {
        message: String,
        #[source]
        source: DieselError,
    },
    #[error("connection closed: {message}")]
    ClosedConnection {
        message: String,
        #[source]
        source: DieselError,
    },
    #[error("database error ({ident}): {message}")]
    Database {
        ident: String,
        message: String,
        #[source]
        source: DieselError,
    },
    #[error("cannot connect: {0}")]
    Connection(#[from] ConnectionError),
    #[error("schema \"{0}\" already exists")]
    SchemaExists(String),
}

impl From<DieselError> for PgStoreError {
    fn from(err: DieselError) -> Self {
        let (kind, message) = match &err {
            DieselError::DatabaseError(kind, info) => (Some(*kind), info.message().to_string()),
            other => (None, other.to_string()),
        };
        match kind {
            Some(DatabaseErrorKind::ForeignKeyViolation) => Self::ForeignKeyViolation { message, source: err },
            Some(DatabaseErrorKind::SerializationFailure) => Self::SerializationConflict { message, source: err },
            Some(DatabaseErrorKind::ClosedConnection) => Self::ClosedConnection { message, source: err },
            Some(other) => Self::Database { ident: format!("{other:?}"), message, source: err },
            None => Self::Database { ident: ENGINE_IDENT.to_string(), message, source: err },
        }
    }
}

impl PgStoreError {
    /// Transitorio: conviene reintentar la unidad de trabajo completa.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SerializationConflict { .. } | Self::ClosedConnection { .. } => true,
            // Algunos mensajes de desconexión llegan sin kind propio; match
            // best-effort sobre el texto.
            Self::Database { message, .. } => {
                let m = message.to_lowercase();
                m.contains("deadlock detected")
                || m.contains("terminating connection due to administrator command")
                || m.contains("server closed the connection unexpectedly")
            }
            _ => false,
        }
    }

    /// La conexión quedó inservible y debe reabrirse.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ClosedConnection { .. } => true,
            Self::Database { message, .. } => message.to_lowercase().contains("server closed the connection"),
            _ => false,
        }
    }

    /// Traducción a la forma uniforme expuesta por el engine.
    pub fn into_engine_error(self, destination: &str) -> EngineError {
        match self {
            Self::ForeignKeyViolation { message, source } => {
                EngineError::ForeignKeyViolation { ident: format!("{:?}", DatabaseErrorKind::ForeignKeyViolation),
                                                   message,
                                                   source: Some(Box::new(source)) }
            }
            Self::SerializationConflict { message, source } => {
                EngineError::Store { ident: format!("{:?}", DatabaseErrorKind::SerializationFailure),
                                     message,
                                     source: Some(Box::new(source)) }
            }
            Self::ClosedConnection { message, source } => {
                EngineError::Connection { destination: destination.to_string(), message, source: Some(Box::new(source)) }
            }
            Self::Database { ident, message, source } => EngineError::Store { ident, message, source: Some(Box::new(source)) },
            Self::Connection(err) => EngineError::Connection { destination: destination.to_string(),
                                                               message: err.to_string(),
                                                               source: Some(Box::new(err)) },
            Self::SchemaExists(schema) => EngineError::SchemaExists(schema),
        }
    }
}
