//! Conversation Controller (§4.1): composes every other crate in the
//! workspace into the single facade a host (the Tauri plugin, or a headless
//! test) drives.

mod controller;
mod epoch;
mod fsm;
mod instructions;
mod snapshot;
mod state;

pub use controller::{EncounterIdentity, VoiceController};
pub use fsm::ConnectionState;
pub use instructions::{InstructionSyncer, InstructionsUpdate};
pub use snapshot::{AdaptiveSnapshot, ControllerSnapshot};
pub use state::SessionStateManager;
