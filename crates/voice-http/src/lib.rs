//! HTTP REST transport consumed by the conversation core (§6.1): session
//! creation, ephemeral-token/SDP exchange, instruction refresh, and
//! transcript relay, all behind one shared `reqwest::Client`.

mod client;
mod dto;

pub use client::VoiceHttpClient;
pub use dto::*;
