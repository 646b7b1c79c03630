//! Backend Socket Client (§4.8): transcript relay/catch-up transport,
//! hand-built on `tokio-tungstenite` since no Engine.IO/Socket.IO crate
//! exists in this workspace's dependency set.

mod protocol;
mod socket;

pub use protocol::{TranscriptErrorPayload, TranscriptPayload, WireEnvelope};
pub use socket::{
    derive_socket_url, BackendCallbacks, BackendSocket, BackendSocketSnapshot, CatchupCallback,
    ErrorCallback, LifecycleCallback, TranscriptCallback, TungsteniteBackendSocket,
};
