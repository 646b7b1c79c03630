//! Shared data model for the realtime voice conversation core.
//!
//! These types are owned by the conversation controller (`voice-session`) and
//! flow outward as read-only snapshots to every other crate in the workspace.

mod config;
mod fingerprint;
mod gate;
mod media;
mod session;
mod turn;

pub use config::VoiceConfig;
pub use fingerprint::{Channel, Fingerprint};
pub use gate::GateFlags;
pub use media::{MediaKind, MediaReference};
pub use session::{Audience, Session, SessionStatus};
pub use turn::{Partial, Role, Turn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum VoiceError {
    #[error("microphone permission denied")]
    MicDenied,
    #[error("voice feature disabled")]
    VoiceDisabled,
    #[error("session request failed: http {0}")]
    SessionHttp(u16),
    #[error("token request failed: http {0}")]
    TokenHttp(u16),
    #[error("sdp exchange failed: http {0}")]
    SdpHttp(u16),
    #[error("ice negotiation failed")]
    IceFailed,
    #[error("data channel closed before session was ready")]
    DataChannelClosedEarly,
    #[error("already starting")]
    AlreadyStarting,
    #[error("operation cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, VoiceError>;
