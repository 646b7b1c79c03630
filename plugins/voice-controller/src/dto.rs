use serde::{Deserialize, Serialize};

use voice_domain::Audience;

/// Parameters for starting a new encounter (§4.1). The controller is
/// rebuilt from scratch on every `start_encounter` call — the previous one,
/// if any, must already have been stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartEncounterRequest {
    pub persona_id: String,
    pub scenario_id: String,
    pub audience: Audience,
}
