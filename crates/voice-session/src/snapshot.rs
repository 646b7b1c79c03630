use serde::{Deserialize, Serialize};

use voice_domain::{GateFlags, SessionStatus};
use voice_vad::NoiseCategory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSnapshot {
    pub category: NoiseCategory,
    pub threshold: f32,
    pub silence_ms: u32,
}

/// Public, read-only view of the controller (§6.4). The raw peer-connection
/// and mic-stream handles are deliberately not part of this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub status: SessionStatus,
    pub error: Option<String>,
    pub session_id: Option<String>,
    pub user_partial: String,
    pub assistant_partial: String,
    pub mic_level: f32,
    pub mic_paused: bool,
    pub encounter_phase: Option<String>,
    pub encounter_gate: GateFlags,
    pub outstanding_gate: Vec<String>,
    pub adaptive: Option<AdaptiveSnapshot>,
}
