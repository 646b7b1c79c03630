//! Transcript Coordinator and Handler (§4.6/§4.7): aggregates realtime
//! deltas into ordered user/assistant turns, reconciling the audio- and
//! text-transcript streams and deciding backend-relay vs. local-fallback
//! emission.

mod coordinator;
mod dedupe;
mod handler;
mod media;

pub use coordinator::{CoordinatorOutput, DebugMarker, TranscriptCoordinator};
pub use dedupe::DedupeTable;
pub use handler::{EmissionMode, HandlerOutcome, TranscriptHandler};
pub use media::{parse_media_markers, ParsedText};
