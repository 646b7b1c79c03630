//! Event Dispatcher (§4.5): classifies each realtime data-channel message
//! into a family, emits a debug event for every message, and runs an
//! optional pre-classification listener hook for logging/replay.

use serde_json::Value;

use voice_events::{DebugBus, DebugEvent, DebugKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Session,
    Speech,
    Transcription,
    Assistant,
    ConversationItem,
    Error,
    Unknown,
}

impl EventFamily {
    pub fn classify(type_word: &str) -> Self {
        let lower = type_word.to_lowercase();
        if lower.contains("error") || lower.contains("warning") {
            return EventFamily::Error;
        }
        match type_word {
            "session.created" | "session.updated" => EventFamily::Session,
            "input_audio_buffer.speech_started"
            | "input_audio_buffer.speech_stopped"
            | "input_audio_buffer.committed" => EventFamily::Speech,
            t if t.starts_with("input_audio_transcription.")
                || t.starts_with("conversation.item.input_audio_transcription.") =>
            {
                EventFamily::Transcription
            }
            "response.created"
            | "response.audio_transcript.delta"
            | "response.audio_transcript.done"
            | "response.output_text.delta"
            | "response.output_text.done"
            | "response.content_part.added"
            | "response.content_part.done"
            | "response.done" => EventFamily::Assistant,
            "conversation.item.created" | "conversation.item.truncated" => EventFamily::ConversationItem,
            _ => EventFamily::Unknown,
        }
    }
}

/// One parsed, classified data-channel message, ready for a family-specific
/// handler to pick apart further.
pub struct ClassifiedEvent {
    pub family: EventFamily,
    pub type_word: String,
    pub payload: Value,
}

pub type RealtimeListener = Box<dyn Fn(&Value) + Send + Sync>;

/// Parses and classifies raw data-channel text, recording a debug event for
/// every message it sees regardless of family.
#[derive(Default)]
pub struct EventDispatcher {
    listener: Option<RealtimeListener>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&mut self, listener: RealtimeListener) {
        self.listener = Some(listener);
    }

    pub fn dispatch(&self, raw: &str, debug: &DebugBus, now_ms: i64) -> Option<ClassifiedEvent> {
        let payload: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("failed to parse realtime event: {e}");
                debug.record(DebugEvent::new(DebugKind::Error, "dispatch.parse_error", now_ms));
                return None;
            }
        };

        if let Some(listener) = &self.listener {
            listener(&payload);
        }

        let type_word = payload.get("type").and_then(Value::as_str).unwrap_or("").to_string();
        let family = EventFamily::classify(&type_word);

        let kind = if family == EventFamily::Error { DebugKind::Error } else { DebugKind::Event };
        debug.record(DebugEvent::new(kind, type_word.clone(), now_ms).with_data(payload.clone()));

        if family == EventFamily::Unknown {
            tracing::debug!(%type_word, "unrecognized realtime event type");
        }

        Some(ClassifiedEvent { family, type_word, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_families() {
        assert_eq!(EventFamily::classify("session.created"), EventFamily::Session);
        assert_eq!(EventFamily::classify("input_audio_buffer.speech_started"), EventFamily::Speech);
        assert_eq!(EventFamily::classify("input_audio_transcription.delta"), EventFamily::Transcription);
        assert_eq!(
            EventFamily::classify("conversation.item.input_audio_transcription.completed"),
            EventFamily::Transcription
        );
        assert_eq!(EventFamily::classify("response.audio_transcript.delta"), EventFamily::Assistant);
        assert_eq!(EventFamily::classify("conversation.item.created"), EventFamily::ConversationItem);
        assert_eq!(EventFamily::classify("response.error"), EventFamily::Error);
        assert_eq!(EventFamily::classify("session.warning"), EventFamily::Error);
        assert_eq!(EventFamily::classify("something.new"), EventFamily::Unknown);
    }

    #[test]
    fn dispatch_records_debug_event_for_every_message() {
        let dispatcher = EventDispatcher::new();
        let debug = DebugBus::new(10);
        let classified = dispatcher.dispatch(r#"{"type":"session.created"}"#, &debug, 0).unwrap();
        assert_eq!(classified.family, EventFamily::Session);
        assert_eq!(debug.backlog_len(), 1);
    }

    #[test]
    fn malformed_json_is_dropped_but_still_recorded() {
        let dispatcher = EventDispatcher::new();
        let debug = DebugBus::new(10);
        assert!(dispatcher.dispatch("not json", &debug, 0).is_none());
        assert_eq!(debug.backlog_len(), 1);
    }

    #[test]
    fn listener_hook_runs_before_classification() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.set_listener(Box::new(move |_| called_clone.store(true, Ordering::SeqCst)));

        let debug = DebugBus::new(10);
        dispatcher.dispatch(r#"{"type":"response.done"}"#, &debug, 0);
        assert!(called.load(Ordering::SeqCst));
    }
}
