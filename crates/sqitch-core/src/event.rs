//! Registros del state store: steps/tags vigentes y bitácora de eventos.
//!
//! - `DeployedStepRecord` existe sii el step está desplegado.
//! - `DeployedTagRecord` existe sii el tag está aplicado, y sólo mientras su
//!   step siga desplegado.
//! - `EventRecord` es append-only; es el único rastro durable de un `fail`.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tipos de transición registrados en `events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Deploy,
    Revert,
    Fail,
    Apply,
    Remove,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [Self::Deploy, Self::Revert, Self::Fail, Self::Apply, Self::Remove];

    /// Nombre estable en minúsculas (valor de la columna `event`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Revert => "revert",
            Self::Fail => "fail",
            Self::Apply => "apply",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter()
                 .copied()
                 .find(|k| k.as_str() == s)
                 .ok_or_else(|| format!("unknown event kind: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedStepRecord {
    pub step_id: String,
    pub step: String,
    pub requires: Vec<String>,
    pub conflicts: Vec<String>,
    pub deployed_by: String,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedTagRecord {
    pub tag_id: String,
    pub tag: String,
    pub step_id: String,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: EventKind,
    pub node_id: String,
    pub node: String,
    pub logged_by: String,
    pub logged_at: DateTime<Utc>,
}
