use voice_domain::{MediaReference, Partial, Role, Turn};

use crate::coordinator::{CoordinatorOutput, DebugMarker, TranscriptCoordinator};
use crate::dedupe::DedupeTable;
use crate::media::parse_media_markers;

/// Whether finalized turns relay to the backend socket (the canonical path,
/// replayed back to every tab) or emit straight to the local event bus
/// (§4.6, used when the socket is down or relay is disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionMode {
    Backend,
    Fallback,
}

pub enum HandlerOutcome {
    Partial(Partial),
    LocalFinal { turn: Turn, media: Option<MediaReference> },
    RelayFinal { turn: Turn, media: Option<MediaReference> },
    Suppressed(DebugMarker),
}

/// Thin layer atop the [`TranscriptCoordinator`] (§4.7): resolves the
/// timestamp the UI orders by, chooses local-vs-relay emission, and folds
/// in media-marker parsing for assistant finals.
pub struct TranscriptHandler {
    coordinator: TranscriptCoordinator,
    dedupe: DedupeTable,
    session_id: String,
    mode: EmissionMode,
    media_catalog: Vec<MediaReference>,
}

impl TranscriptHandler {
    pub fn new(session_id: impl Into<String>, fallback_ms: i64, extended_fallback_ms: i64) -> Self {
        Self {
            coordinator: TranscriptCoordinator::new(fallback_ms, extended_fallback_ms),
            dedupe: DedupeTable::new(),
            session_id: session_id.into(),
            mode: EmissionMode::Backend,
            media_catalog: Vec::new(),
        }
    }

    pub fn set_mode(&mut self, mode: EmissionMode) {
        self.mode = mode;
    }

    pub fn set_media_catalog(&mut self, catalog: Vec<MediaReference>) {
        self.media_catalog = catalog;
    }

    fn finalize(&mut self, turn: Turn, marker: Option<DebugMarker>) -> HandlerOutcome {
        let (turn, media) = if turn.role == Role::Assistant {
            let parsed = parse_media_markers(&turn.text, &self.media_catalog);
            let turn = Turn { text: parsed.clean_text, ..turn };
            (turn, parsed.media)
        } else {
            (turn, None)
        };
        let _ = marker;

        match self.mode {
            EmissionMode::Backend => HandlerOutcome::RelayFinal { turn, media },
            EmissionMode::Fallback => {
                self.dedupe.register(&self.session_id, turn.role, &turn.text, turn.started_at_ms);
                HandlerOutcome::LocalFinal { turn, media }
            }
        }
    }

    fn from_output(&mut self, output: CoordinatorOutput) -> HandlerOutcome {
        match output {
            CoordinatorOutput::Partial(p) => HandlerOutcome::Partial(p),
            CoordinatorOutput::Final { turn, marker } => self.finalize(turn, marker),
            CoordinatorOutput::Debug(marker) => HandlerOutcome::Suppressed(marker),
        }
    }

    pub fn user_speech_started(&mut self, item_id: Option<String>, now_ms: i64) -> HandlerOutcome {
        let out = self.coordinator.user_speech_started(item_id, now_ms);
        self.from_output(out)
    }

    pub fn user_audio_delta(&mut self, delta: &str, now_ms: i64) -> HandlerOutcome {
        let out = self.coordinator.user_audio_delta(delta, now_ms);
        self.from_output(out)
    }

    pub fn user_speech_stopped(&mut self, now_ms: i64) {
        self.coordinator.user_speech_stopped(now_ms);
    }

    pub fn user_completed(&mut self, text: String, now_ms: i64) -> Option<HandlerOutcome> {
        let out = self.coordinator.user_completed(text, now_ms)?;
        Some(self.from_output(out))
    }

    pub fn user_failed(&mut self, now_ms: i64) -> Option<HandlerOutcome> {
        let out = self.coordinator.user_failed(now_ms)?;
        Some(self.from_output(out))
    }

    pub fn poll_user_timeout(&mut self, now_ms: i64) -> Option<HandlerOutcome> {
        let out = self.coordinator.poll_user_timeout(now_ms)?;
        Some(self.from_output(out))
    }

    pub fn assistant_audio_delta(&mut self, item_id: Option<String>, delta: &str, now_ms: i64) -> HandlerOutcome {
        let out = self.coordinator.assistant_audio_delta(item_id, delta, now_ms);
        self.from_output(out)
    }

    pub fn assistant_text_delta(&mut self, item_id: Option<String>, delta: &str, now_ms: i64) -> HandlerOutcome {
        let out = self.coordinator.assistant_text_delta(item_id, delta, now_ms);
        self.from_output(out)
    }

    pub fn assistant_content_part_added(&mut self, item_id: Option<String>, output_text: Option<String>, now_ms: i64) -> Option<HandlerOutcome> {
        let out = self.coordinator.assistant_content_part_added(item_id, output_text, now_ms)?;
        Some(self.from_output(out))
    }

    pub fn assistant_text_done(&mut self, item_id: Option<String>, text: String, now_ms: i64) -> HandlerOutcome {
        let out = self.coordinator.assistant_text_done(item_id, text, now_ms);
        self.from_output(out)
    }

    pub fn assistant_audio_done(&mut self, text: String, now_ms: i64) -> HandlerOutcome {
        let out = self.coordinator.assistant_audio_done(text, now_ms);
        self.from_output(out)
    }

    /// Processes a turn replayed by the backend socket (live broadcast or
    /// catch-up). Suppresses it if a locally-emitted fallback final already
    /// covered the same `(role, normalized_text, started_at_ms±200ms)`.
    pub fn ingest_relayed_turn(&mut self, turn: Turn) -> HandlerOutcome {
        if self.dedupe.is_duplicate(&self.session_id, turn.role, &turn.text, turn.started_at_ms) {
            return HandlerOutcome::Suppressed("relay.duplicate");
        }
        self.dedupe.register(&self.session_id, turn.role, &turn.text, turn.started_at_ms);
        HandlerOutcome::LocalFinal { turn, media: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_mode_relays_user_finals() {
        let mut handler = TranscriptHandler::new("s1", 800, 1800);
        handler.user_speech_started(None, 0);
        handler.user_speech_stopped(100);
        let outcome = handler.user_completed("hello".to_string(), 200).unwrap();
        assert!(matches!(outcome, HandlerOutcome::RelayFinal { .. }));
    }

    #[test]
    fn fallback_mode_emits_locally_and_registers_dedupe() {
        let mut handler = TranscriptHandler::new("s1", 800, 1800);
        handler.set_mode(EmissionMode::Fallback);
        handler.user_speech_started(None, 0);
        let outcome = handler.user_completed("hello".to_string(), 200).unwrap();
        assert!(matches!(outcome, HandlerOutcome::LocalFinal { .. }));

        let replay = Turn {
            item_id: None,
            role: Role::User,
            text: "hello".to_string(),
            is_final: true,
            started_at_ms: 0,
            emitted_at_ms: 250,
            finalized_at_ms: Some(250),
        };
        let outcome = handler.ingest_relayed_turn(replay);
        assert!(matches!(outcome, HandlerOutcome::Suppressed("relay.duplicate")));
    }

    #[test]
    fn assistant_final_strips_media_marker() {
        let mut handler = TranscriptHandler::new("s1", 800, 1800);
        handler.set_media_catalog(vec![MediaReference {
            id: "xray-1".to_string(),
            kind: voice_domain::MediaKind::Image,
            url: None,
            thumbnail: None,
            caption: "scan".to_string(),
            animation_id: None,
        }]);
        handler.assistant_text_delta(Some("it-1".into()), "Here: [[MEDIA:xray-1]]", 0);
        let outcome = handler.assistant_text_done(Some("it-1".into()), "Here: [[MEDIA:xray-1]]".to_string(), 10);
        match outcome {
            HandlerOutcome::RelayFinal { turn, media } => {
                assert_eq!(turn.text, "Here:");
                assert!(media.is_some());
            }
            _ => panic!("expected relay final"),
        }
    }
}
