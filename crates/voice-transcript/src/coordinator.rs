use voice_domain::{Channel, Partial, Role, Turn};

/// Per-turn aggregation state while a user or assistant turn is in progress
/// (§4.6). Dropped once finalized.
struct ActiveTurn {
    item_id: Option<String>,
    role: Role,
    started_at_ms: i64,
    dominant_channel: Option<Channel>,
    audio_buffer: String,
    text_buffer: String,
    fallback_deadline_ms: Option<i64>,
    extended_deadline_ms: Option<i64>,
}

impl ActiveTurn {
    fn new(role: Role, item_id: Option<String>, started_at_ms: i64) -> Self {
        Self {
            item_id,
            role,
            started_at_ms,
            dominant_channel: None,
            audio_buffer: String::new(),
            text_buffer: String::new(),
            fallback_deadline_ms: None,
            extended_deadline_ms: None,
        }
    }

    fn dominant_text(&self) -> &str {
        match self.dominant_channel {
            Some(Channel::Text) => &self.text_buffer,
            _ => &self.audio_buffer,
        }
    }
}

/// A debug marker attached to the output for observability (§4.5/§4.12),
/// e.g. `"fallback"`, `"failed"`, `"assistant.audio.done.superseded"`.
pub type DebugMarker = &'static str;

pub enum CoordinatorOutput {
    Partial(Partial),
    Final { turn: Turn, marker: Option<DebugMarker> },
    Debug(DebugMarker),
}

/// Aggregates realtime deltas into user and assistant turns (§4.6), the
/// hardest subsystem in the core: user-side fallback timers and
/// assistant-side dominant-channel reconciliation between the audio and
/// text transcript streams.
pub struct TranscriptCoordinator {
    user_turn: Option<ActiveTurn>,
    assistant_turn: Option<ActiveTurn>,
    fallback_ms: i64,
    extended_fallback_ms: i64,
    assistant_text_done: bool,
}

impl TranscriptCoordinator {
    pub fn new(fallback_ms: i64, extended_fallback_ms: i64) -> Self {
        Self {
            user_turn: None,
            assistant_turn: None,
            fallback_ms,
            extended_fallback_ms,
            assistant_text_done: false,
        }
    }

    // ---- user side ----------------------------------------------------

    pub fn user_speech_started(&mut self, item_id: Option<String>, now_ms: i64) -> CoordinatorOutput {
        let item_id = item_id.or_else(|| Some(uuid::Uuid::new_v4().to_string()));
        self.user_turn = Some(ActiveTurn::new(Role::User, item_id, now_ms));
        CoordinatorOutput::Partial(Partial { role: Role::User, text: String::new(), started_at_ms: now_ms, emitted_at_ms: now_ms })
    }

    pub fn user_audio_delta(&mut self, delta: &str, now_ms: i64) -> CoordinatorOutput {
        if self.user_turn.is_none() {
            // Delta arrived without a preceding speech_started: auto-allocate.
            self.user_turn = Some(ActiveTurn::new(Role::User, None, now_ms));
        }
        let turn = self.user_turn.as_mut().expect("just ensured");
        turn.audio_buffer.push_str(delta);
        CoordinatorOutput::Partial(Partial {
            role: Role::User,
            text: turn.audio_buffer.clone(),
            started_at_ms: turn.started_at_ms,
            emitted_at_ms: now_ms,
        })
    }

    /// `speech_stopped` / `input_audio_buffer.committed`: arms both timers.
    pub fn user_speech_stopped(&mut self, now_ms: i64) {
        if let Some(turn) = self.user_turn.as_mut() {
            turn.fallback_deadline_ms = Some(now_ms + self.fallback_ms);
            turn.extended_deadline_ms = Some(now_ms + self.extended_fallback_ms);
        }
    }

    pub fn user_completed(&mut self, text: String, now_ms: i64) -> Option<CoordinatorOutput> {
        let turn = self.user_turn.take()?;
        Some(CoordinatorOutput::Final {
            turn: Turn {
                item_id: turn.item_id,
                role: Role::User,
                text,
                is_final: true,
                started_at_ms: turn.started_at_ms,
                emitted_at_ms: now_ms,
                finalized_at_ms: Some(now_ms),
            },
            marker: None,
        })
    }

    pub fn user_failed(&mut self, now_ms: i64) -> Option<CoordinatorOutput> {
        let turn = self.user_turn.take()?;
        Some(CoordinatorOutput::Final {
            turn: Turn {
                item_id: turn.item_id,
                role: Role::User,
                text: "[Speech not transcribed]".to_string(),
                is_final: true,
                started_at_ms: turn.started_at_ms,
                emitted_at_ms: now_ms,
                finalized_at_ms: Some(now_ms),
            },
            marker: Some("failed"),
        })
    }

    /// Called on a periodic tick; finalizes a user turn whose fallback or
    /// extended-fallback deadline has passed.
    pub fn poll_user_timeout(&mut self, now_ms: i64) -> Option<CoordinatorOutput> {
        let fires_extended = self.user_turn.as_ref().and_then(|t| t.extended_deadline_ms).is_some_and(|d| now_ms >= d);
        let fires_fallback = self.user_turn.as_ref().and_then(|t| t.fallback_deadline_ms).is_some_and(|d| now_ms >= d);

        if !fires_extended && !fires_fallback {
            return None;
        }

        let turn = self.user_turn.take()?;
        Some(CoordinatorOutput::Final {
            turn: Turn {
                item_id: turn.item_id,
                role: Role::User,
                text: turn.audio_buffer,
                is_final: true,
                started_at_ms: turn.started_at_ms,
                emitted_at_ms: now_ms,
                finalized_at_ms: Some(now_ms),
            },
            marker: Some("fallback"),
        })
    }

    // ---- assistant side -------------------------------------------------

    pub fn assistant_audio_delta(&mut self, item_id: Option<String>, delta: &str, now_ms: i64) -> CoordinatorOutput {
        let turn = self.assistant_turn_mut(item_id, now_ms);
        turn.audio_buffer.push_str(delta);
        if turn.dominant_channel.is_none() {
            turn.dominant_channel = Some(Channel::Audio);
        }
        let emit_partial = turn.dominant_channel != Some(Channel::Text);
        let (text, started_at_ms) = (turn.dominant_text().to_string(), turn.started_at_ms);
        if emit_partial {
            CoordinatorOutput::Partial(Partial { role: Role::Assistant, text, started_at_ms, emitted_at_ms: now_ms })
        } else {
            CoordinatorOutput::Debug("assistant.audio.delta.suppressed")
        }
    }

    pub fn assistant_text_delta(&mut self, item_id: Option<String>, delta: &str, now_ms: i64) -> CoordinatorOutput {
        let turn = self.assistant_turn_mut(item_id, now_ms);
        turn.text_buffer.push_str(delta);
        turn.dominant_channel = Some(Channel::Text);
        CoordinatorOutput::Partial(Partial {
            role: Role::Assistant,
            text: turn.text_buffer.clone(),
            started_at_ms: turn.started_at_ms,
            emitted_at_ms: now_ms,
        })
    }

    pub fn assistant_content_part_added(&mut self, item_id: Option<String>, output_text: Option<String>, now_ms: i64) -> Option<CoordinatorOutput> {
        let output_text = output_text.filter(|t| !t.is_empty())?;
        Some(self.assistant_text_delta(item_id, &output_text, now_ms))
    }

    pub fn assistant_text_done(&mut self, item_id: Option<String>, text: String, now_ms: i64) -> CoordinatorOutput {
        self.assistant_text_done = true;
        let turn = self.assistant_turn.take().unwrap_or_else(|| ActiveTurn::new(Role::Assistant, item_id, now_ms));
        CoordinatorOutput::Final {
            turn: Turn {
                item_id: turn.item_id,
                role: Role::Assistant,
                text,
                is_final: true,
                started_at_ms: turn.started_at_ms,
                emitted_at_ms: now_ms,
                finalized_at_ms: Some(now_ms),
            },
            marker: None,
        }
    }

    /// `response.audio_transcript.done`: final only if the text stream
    /// never produced a done event for this turn; otherwise superseded.
    pub fn assistant_audio_done(&mut self, text: String, now_ms: i64) -> CoordinatorOutput {
        if self.assistant_text_done {
            self.assistant_text_done = false;
            return CoordinatorOutput::Debug("assistant.audio.done.superseded");
        }
        let turn = match self.assistant_turn.take() {
            Some(turn) => turn,
            None => ActiveTurn::new(Role::Assistant, None, now_ms),
        };
        CoordinatorOutput::Final {
            turn: Turn {
                item_id: turn.item_id,
                role: Role::Assistant,
                text,
                is_final: true,
                started_at_ms: turn.started_at_ms,
                emitted_at_ms: now_ms,
                finalized_at_ms: Some(now_ms),
            },
            marker: None,
        }
    }

    fn assistant_turn_mut(&mut self, item_id: Option<String>, now_ms: i64) -> &mut ActiveTurn {
        if self.assistant_turn.is_none() {
            self.assistant_turn = Some(ActiveTurn::new(Role::Assistant, item_id, now_ms));
            self.assistant_text_done = false;
        }
        self.assistant_turn.as_mut().expect("just ensured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_partial(output: &CoordinatorOutput) -> bool {
        matches!(output, CoordinatorOutput::Partial(_))
    }

    #[test]
    fn user_turn_finalizes_from_completed_text() {
        let mut c = TranscriptCoordinator::new(800, 1800);
        c.user_speech_started(None, 1000);
        assert!(is_partial(&c.user_audio_delta("he", 1050)));
        c.user_speech_stopped(1200);
        let out = c.user_completed("hello doctor".to_string(), 1300).unwrap();
        match out {
            CoordinatorOutput::Final { turn, marker } => {
                assert_eq!(turn.text, "hello doctor");
                assert_eq!(turn.started_at_ms, 1000);
                assert!(marker.is_none());
            }
            _ => panic!("expected final"),
        }
    }

    #[test]
    fn user_turn_finalizes_on_fallback_timeout() {
        let mut c = TranscriptCoordinator::new(800, 1800);
        c.user_speech_started(None, 0);
        c.user_audio_delta("partial text", 100);
        c.user_speech_stopped(200);
        assert!(c.poll_user_timeout(500).is_none());
        let out = c.poll_user_timeout(1000).unwrap();
        match out {
            CoordinatorOutput::Final { turn, marker } => {
                assert_eq!(turn.text, "partial text");
                assert_eq!(marker, Some("fallback"));
            }
            _ => panic!("expected final"),
        }
    }

    #[test]
    fn delta_without_speech_started_auto_allocates_turn() {
        let mut c = TranscriptCoordinator::new(800, 1800);
        let out = c.user_audio_delta("surprise", 42);
        match out {
            CoordinatorOutput::Partial(p) => assert_eq!(p.started_at_ms, 42),
            _ => panic!("expected partial"),
        }
    }

    #[test]
    fn assistant_text_stream_overrides_audio_dominant_channel() {
        let mut c = TranscriptCoordinator::new(800, 1800);
        c.assistant_audio_delta(Some("it-1".into()), "garbled", 0);
        let out = c.assistant_text_delta(Some("it-1".into()), "The real answer", 50);
        match out {
            CoordinatorOutput::Partial(p) => assert_eq!(p.text, "The real answer"),
            _ => panic!("expected partial"),
        }
        // further audio deltas no longer emit partials
        let out = c.assistant_audio_delta(Some("it-1".into()), " more garble", 100);
        assert!(matches!(out, CoordinatorOutput::Debug(_)));
    }

    #[test]
    fn late_audio_done_after_text_done_is_superseded() {
        let mut c = TranscriptCoordinator::new(800, 1800);
        c.assistant_text_delta(Some("it-1".into()), "final answer", 0);
        let _ = c.assistant_text_done(Some("it-1".into()), "final answer".to_string(), 50);
        let out = c.assistant_audio_done("garbled tail".to_string(), 60);
        assert!(matches!(out, CoordinatorOutput::Debug("assistant.audio.done.superseded")));
    }

    #[test]
    fn repeated_identical_assistant_text_is_not_suppressed_by_equality() {
        let mut c = TranscriptCoordinator::new(800, 1800);
        let first = c.assistant_text_done(Some("it-1".into()), "same text".to_string(), 0);
        let second = c.assistant_text_done(Some("it-2".into()), "same text".to_string(), 1000);
        assert!(matches!(first, CoordinatorOutput::Final { .. }));
        assert!(matches!(second, CoordinatorOutput::Final { .. }));
    }
}
