use serde::{Deserialize, Serialize};
use serde_json::Value;

use voice_domain::GateFlags;

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub persona_id: String,
    pub scenario_id: String,
    pub mode: &'static str,
}

impl CreateSessionRequest {
    pub fn new(persona_id: impl Into<String>, scenario_id: impl Into<String>) -> Self {
        Self { persona_id: persona_id.into(), scenario_id: scenario_id.into(), mode: "sps" }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub sps_session_id: String,
    pub phase: String,
    pub gate: GateFlags,
    pub gate_state: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenRequest {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenOpts {
    pub expires_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub rtc_token: String,
    pub model: String,
    pub tts_voice: String,
    pub opts: TokenOpts,
    pub persona: Value,
    pub context: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SdpRequest {
    pub session_id: String,
    pub sdp: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstructionsRequest {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateFlags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstructionsResponse {
    pub instructions: String,
    pub phase: String,
    pub outstanding_gate: Vec<String>,
    pub role_id: String,
    pub available_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayTurnRequest {
    pub role: String,
    pub text: String,
    pub is_final: bool,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitted_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpsTurn {
    pub role: String,
    pub text: String,
    pub channel: String,
    pub timestamp_ms: i64,
    pub started_at_ms: i64,
    pub finalized_at_ms: i64,
    pub emitted_at_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpsTurnsRequest {
    pub turns: Vec<SpsTurn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpsTurnsResponse {
    pub ok: bool,
    pub received: usize,
    pub saved: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndSessionResponse {
    pub summary: Value,
    pub metrics: Value,
}
