use serde::{Deserialize, Serialize};
use serde_json::Value;

use voice_domain::{MediaReference, Role, Turn};

/// The small JSON envelope every message carries, playing the role a
/// Socket.IO/Engine.IO frame would: `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub event: String,
    pub data: Value,
}

impl WireEnvelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }
}

pub const EVENT_JOIN_SESSION: &str = "join-session";
pub const EVENT_REQUEST_CATCHUP: &str = "request-catchup";
pub const EVENT_TRANSCRIPT: &str = "transcript";
pub const EVENT_TRANSCRIPT_ERROR: &str = "transcript-error";
pub const EVENT_CATCHUP_TRANSCRIPTS: &str = "catchup-transcripts";

#[derive(Debug, Serialize)]
pub struct JoinSessionPayload {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct RequestCatchupPayload {
    pub session_id: String,
    pub since: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptPayload {
    pub role: Role,
    pub text: String,
    pub is_final: bool,
    pub timestamp: i64,
    pub item_id: Option<String>,
    pub media: Option<MediaReference>,
}

impl TranscriptPayload {
    pub fn into_turn(self, emitted_at_ms: i64) -> Turn {
        Turn {
            item_id: self.item_id,
            role: self.role,
            text: self.text,
            is_final: self.is_final,
            started_at_ms: self.timestamp,
            emitted_at_ms,
            finalized_at_ms: if self.is_final { Some(emitted_at_ms) } else { None },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptErrorPayload {
    pub message: String,
}
