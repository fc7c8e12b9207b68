//! Constantes compartidas por todos los backends.

/// Schema por defecto donde vive el state store.
pub const DEFAULT_SQITCH_SCHEMA: &str = "sqitch";

/// Actor usado cuando no hay identidad configurada ni usuario del SO.
pub const FALLBACK_ACTOR: &str = "sqitch";

/// Prefijo de visualización de los tags (`@alpha`).
pub const TAG_MARKER: char = '@';
