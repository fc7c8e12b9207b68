//! Resolución de la configuración de conexión.
//!
//! Cada atributo se resuelve una sola vez, al construir el engine, con la
//! precedencia (de mayor a menor):
//! 1. valor explícito pasado al constructor del engine,
//! 2. clave `core.<engine>.<attr>` del archivo de configuración,
//! 3. opción global homónima de la aplicación,
//! 4. default fijo (`client` nativo del backend, `sqitch_schema = "sqitch"`).
//!
//! El resultado (`ConnectionConfig`) es inmutable. El destino (`destination`)
//! no se almacena: se recalcula en cada llamada a partir de la config y del
//! entorno.

mod destination;

use std::collections::HashMap;

use crate::constants::{DEFAULT_SQITCH_SCHEMA, FALLBACK_ACTOR};
use crate::errors::EngineError;

pub use destination::EnvNames;

/// Capa "archivo de configuración". El lector de archivos es externo; sólo se
/// necesita búsqueda por clave completa (`core.pg.username`).
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Atributos de conexión tal como llegan de una capa (todos opcionales, sin
/// validar).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub client: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db_name: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub sqitch_schema: Option<String>,
}

/// Opciones globales del objeto aplicación.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOptions {
    pub connection: ConnectionOptions,
    /// Identidad estampada en cada escritura del state store.
    pub actor: Option<String>,
}

impl AppOptions {
    /// Actor configurado, o el usuario del SO, o `"sqitch"`.
    pub fn actor_with<F>(&self, lookup: F) -> String
        where F: Fn(&str) -> Option<String>
    {
        non_empty(self.actor.clone()).or_else(|| non_empty(lookup("USER")))
                                     .or_else(|| non_empty(lookup("USERNAME")))
                                     .unwrap_or_else(|| FALLBACK_ACTOR.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attr {
    Client,
    Username,
    Password,
    DbName,
    Host,
    Port,
    SqitchSchema,
}

impl Attr {
    fn key(self) -> &'static str {
        match self {
            Attr::Client => "client",
            Attr::Username => "username",
            Attr::Password => "password",
            Attr::DbName => "db_name",
            Attr::Host => "host",
            Attr::Port => "port",
            Attr::SqitchSchema => "sqitch_schema",
        }
    }

    fn from_options(self, opts: &ConnectionOptions) -> Option<String> {
        let v = match self {
            Attr::Client => &opts.client,
            Attr::Username => &opts.username,
            Attr::Password => &opts.password,
            Attr::DbName => &opts.db_name,
            Attr::Host => &opts.host,
            Attr::Port => &opts.port,
            Attr::SqitchSchema => &opts.sqitch_schema,
        };
        non_empty(v.clone())
    }
}

/// Configuración de conexión resuelta; inmutable tras construirse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    client: String,
    username: Option<String>,
    password: Option<String>,
    db_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    sqitch_schema: String,
}

struct Layers<'a> {
    engine: &'a str,
    explicit: &'a ConnectionOptions,
    file: &'a dyn ConfigSource,
    app: &'a ConnectionOptions,
}

impl Layers<'_> {
    /// Primer valor no vacío según la precedencia, junto con su origen.
    fn pick(&self, attr: Attr) -> Option<(String, String)> {
        if let Some(v) = attr.from_options(self.explicit) {
            return Some((format!("{} (explicit)", attr.key()), v));
        }
        let file_key = format!("core.{}.{}", self.engine, attr.key());
        if let Some(v) = non_empty(self.file.get(&file_key)) {
            return Some((file_key, v));
        }
        attr.from_options(self.app).map(|v| (format!("--{}", attr.key()), v))
    }

    fn value(&self, attr: Attr) -> Option<String> {
        self.pick(attr).map(|(_, v)| v)
    }
}

impl ConnectionConfig {
    /// Fusiona las cuatro capas en una configuración inmutable.
    ///
    /// `default_client` es el binario nativo del backend (p.ej. `psql`).
    /// Falla con `EngineError::Config` si `port` no es un entero válido.
    pub fn resolve(engine: &str,
                   explicit: &ConnectionOptions,
                   file: &dyn ConfigSource,
                   app: &AppOptions,
                   default_client: &str)
                   -> Result<Self, EngineError> {
        let layers = Layers { engine, explicit, file, app: &app.connection };
        let port = match layers.pick(Attr::Port) {
            Some((origin, raw)) => Some(parse_port(&origin, &raw)?),
            None => None,
        };
        Ok(Self { client: layers.value(Attr::Client).unwrap_or_else(|| default_client.to_string()),
                  username: layers.value(Attr::Username),
                  password: layers.value(Attr::Password),
                  db_name: layers.value(Attr::DbName),
                  host: layers.value(Attr::Host),
                  port,
                  sqitch_schema: layers.value(Attr::SqitchSchema)
                                       .unwrap_or_else(|| DEFAULT_SQITCH_SCHEMA.to_string()) })
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn db_name(&self) -> Option<&str> {
        self.db_name.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn sqitch_schema(&self) -> &str {
        &self.sqitch_schema
    }

    /// Variables de entorno que sólo debe ver el proceso del cliente nativo.
    /// Vacío si no hay password configurado.
    pub fn client_env(&self, password_var: &str) -> Vec<(String, String)> {
        self.password
            .as_ref()
            .map(|pw| vec![(password_var.to_string(), pw.clone())])
            .unwrap_or_default()
    }
}

fn parse_port(origin: &str, raw: &str) -> Result<u16, EngineError> {
    raw.trim()
       .parse::<u16>()
       .map_err(|_| EngineError::Config(format!("{origin}: port must be an integer between 0 and 65535, got \"{raw}\"")))
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}
