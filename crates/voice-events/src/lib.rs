//! Event fan-out contracts for the realtime voice conversation core.
//!
//! Two parallel channels: conversation events for the host UI, and
//! finer-grained debug events with a bounded replay backlog. Both are
//! delivered synchronously, in registration order, with per-listener error
//! isolation (§4.12).

mod bus;
mod conversation;
mod debug;

pub use bus::{ConversationBus, ConversationListener, DebugBus, DebugListener, EventEmitter};
pub use conversation::ConversationEvent;
pub use debug::{DebugEvent, DebugKind};

/// Topic names used when bridging events onto a host event channel (e.g. a
/// Tauri `app.emit`), kept as constants to avoid typos at call sites.
pub mod event_names {
    pub const CONVERSATION: &str = "voice:conversation";
    pub const DEBUG: &str = "voice:debug";
}
