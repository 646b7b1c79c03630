use serde::{Deserialize, Serialize};
use serde_json::Value;
use voice_domain::{GateFlags, MediaReference, Role, SessionStatus, Turn};

/// Events delivered synchronously to every conversation listener, in
/// registration order. A panicking listener is isolated (§4.12) and does not
/// prevent later listeners from receiving the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConversationEvent {
    Status {
        status: SessionStatus,
        error: Option<String>,
    },
    Session {
        session_id: String,
        realtime_session_id: Option<String>,
    },
    Partial {
        role: Role,
        text: String,
        started_at_ms: i64,
        emitted_at_ms: i64,
    },
    Transcript {
        turn: Box<Turn>,
        media: Option<MediaReference>,
    },
    MicLevel {
        level: f32,
    },
    Pause {
        paused: bool,
    },
    Instructions {
        phase: Option<String>,
        outstanding_gate: Vec<String>,
        gate: GateFlags,
    },
}

impl ConversationEvent {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConversationEvent::Status { .. } => "status",
            ConversationEvent::Session { .. } => "session",
            ConversationEvent::Partial { .. } => "partial",
            ConversationEvent::Transcript { .. } => "transcript",
            ConversationEvent::MicLevel { .. } => "mic-level",
            ConversationEvent::Pause { .. } => "pause",
            ConversationEvent::Instructions { .. } => "instructions",
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
