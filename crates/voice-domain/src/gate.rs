use serde::{Deserialize, Serialize};

/// Boolean/int prerequisites the assistant must satisfy during an encounter.
/// The core treats these as opaque key-value state; only the instruction
/// syncer reads them, to decide when to request updated instructions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateFlags {
    #[serde(default)]
    pub greeting_done: bool,
    #[serde(default)]
    pub intro_done: bool,
    #[serde(default)]
    pub consent_done: bool,
    #[serde(default)]
    pub identity_verified: bool,
    #[serde(default)]
    pub locked_pressure_count: i64,
    #[serde(default)]
    pub supervisor_escalated: bool,
}
