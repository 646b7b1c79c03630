//! WebRTC Manager (§4.2): peer connection lifecycle, SDP negotiation, the
//! `oai-events` data channel, and Opus audio encode/decode against the
//! realtime service.

mod codec;
mod io;
mod manager;

pub use codec::{f32_to_pcm16, pcm16_to_f32, OpusCodec};
pub use manager::{WebrtcEvent, WebrtcManager};
