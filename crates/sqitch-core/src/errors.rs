//! Errores públicos del engine.
//!
//! Toda falla nativa (driver, cliente de base de datos, IO) se traduce a
//! `EngineError` en la frontera pública de cada operación. Cada variante
//! expone un identificador (`ident`) y el mensaje original del backend
//! (`message`); el error nativo queda disponible vía `source()`.

use thiserror::Error;

/// Error nativo retenido para diagnóstico.
pub type NativeError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Valor de configuración mal formado (p.ej. `port` no entero).
    #[error("invalid configuration: {0}")]
    Config(String),
    /// No se pudo abrir la conexión con la base destino.
    #[error("cannot connect to {destination}: {message}")]
    Connection {
        destination: String,
        message: String,
        #[source]
        source: Option<NativeError>,
    },
    /// `initialize` invocado sobre un schema ya existente.
    #[error("schema \"{0}\" already exists")]
    SchemaExists(String),
    /// Tag aplicado sin que su step esté desplegado.
    #[error("{message}")]
    ForeignKeyViolation {
        ident: String,
        message: String,
        #[source]
        source: Option<NativeError>,
    },
    /// Cualquier otra falla del backend.
    #[error("{message}")]
    Store {
        ident: String,
        message: String,
        #[source]
        source: Option<NativeError>,
    },
    /// El cliente nativo terminó con estado distinto de cero.
    #[error("{client} exited with status {status}: {stderr}")]
    Client { client: String, status: i32, stderr: String },
    /// Falla al lanzar el cliente o al leer un script.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Clasificación estable de `EngineError`, sin payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    SchemaExists,
    ForeignKeyViolation,
    Store,
    Client,
    Io,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::SchemaExists(_) => ErrorKind::SchemaExists,
            Self::ForeignKeyViolation { .. } => ErrorKind::ForeignKeyViolation,
            Self::Store { .. } => ErrorKind::Store,
            Self::Client { .. } => ErrorKind::Client,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Código nativo del backend cuando existe; si no, un identificador fijo.
    pub fn ident(&self) -> &str {
        match self {
            Self::ForeignKeyViolation { ident, .. } | Self::Store { ident, .. } => ident,
            Self::Config(_) => "config",
            Self::Connection { .. } => "connection",
            Self::SchemaExists(_) => "schema_exists",
            Self::Client { .. } => "client",
            Self::Io { .. } => "io",
        }
    }

    /// Mensaje legible tal como lo reportó el backend.
    pub fn message(&self) -> String {
        match self {
            Self::ForeignKeyViolation { message, .. }
            | Self::Store { message, .. }
            | Self::Connection { message, .. } => message.clone(),
            Self::Client { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}
