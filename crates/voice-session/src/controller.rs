use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use voice_audio::{MicStream, RemotePlayback};
use voice_backend::{BackendCallbacks, BackendSocket, TungsteniteBackendSocket};
use voice_dispatch::{EventDispatcher, EventFamily};
use voice_domain::{Audience, GateFlags, Result, Role, Session, VoiceConfig, VoiceError};
use voice_events::{ConversationEvent, DebugEvent, DebugKind, EventEmitter};
use voice_http::{CreateSessionRequest, RelayTurnRequest, TokenRequest, VoiceHttpClient};
use voice_storage::TranscriptSink;
use voice_transcript::{EmissionMode, HandlerOutcome, TranscriptHandler};
use voice_vad::AdaptiveVad;
use voice_webrtc::{f32_to_pcm16, WebrtcEvent, WebrtcManager};

use crate::epoch::Epoch;
use crate::fsm::ConnectionState;
use crate::instructions::InstructionSyncer;
use crate::snapshot::{AdaptiveSnapshot, ControllerSnapshot};
use crate::state::SessionStateManager;

const HTTP_RETRY_DELAYS_MS: [u64; 3] = [250, 750, 2000];
const SESSION_ACK_TIMEOUT_MS: u64 = 5000;

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Routes a turn replayed by the backend socket (live broadcast or
/// catch-up) straight to the local event bus; `ingest_relayed_turn` only
/// ever yields `LocalFinal` or `Suppressed` (§4.6, §4.8).
fn route_relayed_outcome(outcome: HandlerOutcome, events: &EventEmitter) {
    match outcome {
        HandlerOutcome::LocalFinal { turn, media } => {
            events.conversation.emit(ConversationEvent::Transcript { turn: Box::new(turn), media });
        }
        HandlerOutcome::Suppressed(marker) => {
            events.debug.record(DebugEvent::new(DebugKind::Info, marker, now_ms()));
        }
        HandlerOutcome::Partial(_) | HandlerOutcome::RelayFinal { .. } => {}
    }
}

/// Identity of the encounter a controller instance drives; created once and
/// handed to `VoiceController::new`.
pub struct EncounterIdentity {
    pub persona_id: String,
    pub scenario_id: String,
    pub audience: Audience,
}

/// Composes every other crate in the workspace into the single facade the
/// host exposes (§6.4, §9: "central controller class" → composition, not
/// inheritance). Owns exactly one active session at a time.
pub struct VoiceController {
    config: VoiceConfig,
    http: Arc<VoiceHttpClient>,
    identity: EncounterIdentity,
    events: EventEmitter,
    epoch: Epoch,
    connection_state: Mutex<ConnectionState>,
    state: SessionStateManager,
    session: Mutex<Option<Session>>,
    webrtc: AsyncMutex<Option<Arc<WebrtcManager>>>,
    mic: AsyncMutex<Option<MicStream>>,
    playback: AsyncMutex<Option<RemotePlayback>>,
    transcript: Arc<Mutex<TranscriptHandler>>,
    vad: Mutex<AdaptiveVad>,
    instructions: InstructionSyncer,
    backend: Arc<dyn BackendSocket>,
    mic_paused: AtomicBool,
    last_mic_level: Mutex<f32>,
    user_partial: Mutex<String>,
    assistant_partial: Mutex<String>,
    encounter_phase: Mutex<Option<String>>,
    encounter_gate: Mutex<GateFlags>,
    outstanding_gate: Mutex<Vec<String>>,
    sink: Mutex<Option<Arc<dyn TranscriptSink>>>,
}

impl VoiceController {
    pub fn new(config: VoiceConfig, base_url: &str, identity: EncounterIdentity) -> Result<Arc<Self>> {
        let http = Arc::new(VoiceHttpClient::new(base_url));
        let events = EventEmitter::new(config.debug_backlog_capacity);
        let transcript = Arc::new(Mutex::new(TranscriptHandler::new(
            "pending",
            config.stt_fallback_ms as i64,
            config.stt_extended_ms as i64,
        )));

        let debug_for_backend = events.debug.clone();
        let callbacks = BackendCallbacks {
            on_connect: Some(Box::new({
                let debug = debug_for_backend.clone();
                move || debug.record(DebugEvent::new(DebugKind::Info, "backend.connected", now_ms()))
            })),
            on_disconnect: Some(Box::new({
                let debug = debug_for_backend.clone();
                move || debug.record(DebugEvent::new(DebugKind::Info, "backend.disconnected", now_ms()))
            })),
            on_reconnect: Some(Box::new({
                let debug = debug_for_backend.clone();
                move || debug.record(DebugEvent::new(DebugKind::Info, "backend.reconnected", now_ms()))
            })),
            on_transcript: Some(Box::new({
                let transcript = Arc::clone(&transcript);
                let events = events.clone();
                move |payload| {
                    let turn = payload.into_turn(now_ms());
                    let outcome = transcript.lock().unwrap().ingest_relayed_turn(turn);
                    route_relayed_outcome(outcome, &events);
                }
            })),
            on_transcript_error: Some(Box::new({
                let debug = debug_for_backend.clone();
                move |msg: String| debug.record(DebugEvent::new(DebugKind::Warn, "backend.transcript_error", now_ms()).with_data(Value::String(msg)))
            })),
            on_catchup: Some(Box::new({
                let transcript = Arc::clone(&transcript);
                let events = events.clone();
                move |mut payloads| {
                    // §5: catch-up is applied after all queued live events, ordered by
                    // started_at_ms within the batch to preserve temporal coherence.
                    payloads.sort_by_key(|p| p.timestamp);
                    let mut transcript = transcript.lock().unwrap();
                    for payload in payloads {
                        let turn = payload.into_turn(now_ms());
                        let outcome = transcript.ingest_relayed_turn(turn);
                        route_relayed_outcome(outcome, &events);
                    }
                }
            })),
            on_max_failures: Some(Box::new({
                let debug = debug_for_backend.clone();
                move || debug.record(DebugEvent::new(DebugKind::Warn, "backend.max_failures", now_ms()))
            })),
            on_failure: Some(Box::new({
                let debug = debug_for_backend.clone();
                move |msg: String| {
                    debug.record(DebugEvent::new(DebugKind::Warn, "backend.failure", now_ms()).with_data(Value::String(msg)))
                }
            })),
        };
        let backend = Arc::new(TungsteniteBackendSocket::with_failure_budget(
            base_url,
            config.max_socket_failures,
            callbacks,
        )?);

        Ok(Arc::new(Self {
            transcript,
            instructions: InstructionSyncer::new(Arc::clone(&http), "pending"),
            config,
            http,
            identity,
            events,
            epoch: Epoch::new(),
            connection_state: Mutex::new(ConnectionState::Idle),
            state: SessionStateManager::new(),
            session: Mutex::new(None),
            webrtc: AsyncMutex::new(None),
            mic: AsyncMutex::new(None),
            playback: AsyncMutex::new(None),
            vad: Mutex::new(AdaptiveVad::new()),
            backend,
            mic_paused: AtomicBool::new(false),
            last_mic_level: Mutex::new(0.0),
            user_partial: Mutex::new(String::new()),
            assistant_partial: Mutex::new(String::new()),
            encounter_phase: Mutex::new(None),
            encounter_gate: Mutex::new(GateFlags::default()),
            outstanding_gate: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        }))
    }

    /// Wires a local persistence hook in after construction, mirroring how a
    /// host app resolves its data directory asynchronously during plugin
    /// setup rather than having the controller depend on one directly.
    /// Every finalized turn seen from that point on is also handed to the
    /// sink (§9).
    pub fn set_transcript_sink(&self, sink: Arc<dyn TranscriptSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let mic_level = *self.last_mic_level.lock().unwrap();
        ControllerSnapshot {
            status: self.state.status(),
            error: self.state.error(),
            session_id: self.session.lock().unwrap().as_ref().map(|s| s.session_id.clone()),
            user_partial: self.user_partial.lock().unwrap().clone(),
            assistant_partial: self.assistant_partial.lock().unwrap().clone(),
            mic_level,
            mic_paused: self.mic_paused.load(Ordering::Acquire),
            encounter_phase: self.encounter_phase.lock().unwrap().clone(),
            encounter_gate: self.encounter_gate.lock().unwrap().clone(),
            outstanding_gate: self.outstanding_gate.lock().unwrap().clone(),
            adaptive: if self.config.adaptive_vad_enabled {
                let vad = self.vad.lock().unwrap();
                let category = vad.category();
                let params = category.params();
                Some(AdaptiveSnapshot { category, threshold: params.threshold, silence_ms: params.silence_ms })
            } else {
                None
            },
        }
    }

    fn set_connection_state(&self, state: ConnectionState) {
        *self.connection_state.lock().unwrap() = state;
        tracing::debug!(?state, "voice connection state transition");
    }

    fn is_epoch_current(&self, captured: u64) -> bool {
        self.epoch.is_current(captured)
    }

    /// Drives the FSM from `Idle` through `Connected` (§4.1). Not `Sync`
    /// with itself — callers must serialize `start`/`stop` externally, which
    /// the Tauri plugin's single managed `Arc<VoiceController>` guarantees.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if *self.connection_state.lock().unwrap() != ConnectionState::Idle {
            return Err(VoiceError::AlreadyStarting);
        }

        let captured = self.epoch.advance();
        self.set_connection_state(ConnectionState::RequestMic);
        self.state.set_connecting();
        self.emit_status();

        let mic = MicStream::start(None).map_err(|_| VoiceError::MicDenied)?;
        if !self.is_epoch_current(captured) {
            return Err(VoiceError::Cancelled);
        }

        self.set_connection_state(ConnectionState::CreateSession);
        let created = self
            .http
            .create_session(&CreateSessionRequest::new(&self.identity.persona_id, &self.identity.scenario_id))
            .await?;
        if !self.is_epoch_current(captured) {
            return Err(VoiceError::Cancelled);
        }

        let session = Session::new(
            created.session_id.clone(),
            self.identity.persona_id.clone(),
            self.identity.scenario_id.clone(),
            self.identity.audience,
            now_ms(),
        );
        *self.session.lock().unwrap() = Some(session);
        *self.encounter_phase.lock().unwrap() = Some(created.phase.clone());
        *self.encounter_gate.lock().unwrap() = created.gate.clone();
        let mut transcript = TranscriptHandler::new(
            created.session_id.clone(),
            self.config.stt_fallback_ms as i64,
            self.config.stt_extended_ms as i64,
        );
        if !self.config.backend_relay_enabled {
            transcript.set_mode(EmissionMode::Fallback);
        }
        *self.transcript.lock().unwrap() = transcript;

        self.set_connection_state(ConnectionState::FetchToken);
        let token = self.fetch_token_with_retry(&created.session_id, captured).await?;
        if !self.is_epoch_current(captured) {
            return Err(VoiceError::Cancelled);
        }
        let _ = token.rtc_token;

        self.set_connection_state(ConnectionState::NegotiateSdp);
        let webrtc = Arc::new(WebrtcManager::connect(&self.http, &created.session_id, voice_audio::TARGET_SAMPLE_RATE).await?);
        if !self.is_epoch_current(captured) {
            return Err(VoiceError::Cancelled);
        }

        let playback = RemotePlayback::start(None).map_err(|e| VoiceError::Transport(e.to_string()))?;

        let level_handle = mic.level_handle();
        *self.mic.lock().await = Some(mic);
        *self.playback.lock().await = Some(playback);
        *self.webrtc.lock().await = Some(Arc::clone(&webrtc));

        self.set_connection_state(ConnectionState::AwaitDataChannel);
        self.spawn_level_reporter(level_handle, Arc::clone(&webrtc), captured);

        if self.config.backend_relay_enabled {
            let _ = self.backend.connect(&created.session_id).await;
        }

        self.spawn_mic_forwarder(Arc::clone(&webrtc), captured);
        self.spawn_event_loop(Arc::clone(&webrtc), captured);
        self.spawn_transcript_timeout_ticker(captured);

        Ok(())
    }

    async fn fetch_token_with_retry(&self, session_id: &str, captured: u64) -> Result<voice_http::TokenResponse> {
        let req = TokenRequest { session_id: session_id.to_string(), ..Default::default() };
        let mut last_err = None;
        for (attempt, delay_ms) in HTTP_RETRY_DELAYS_MS.iter().enumerate() {
            if !self.is_epoch_current(captured) {
                return Err(VoiceError::Cancelled);
            }
            match self.http.fetch_rtc_token(&req).await {
                Ok(resp) => return Ok(resp),
                Err(VoiceError::TokenHttp(code)) if (500..600).contains(&code) && attempt + 1 < HTTP_RETRY_DELAYS_MS.len() => {
                    last_err = Some(VoiceError::TokenHttp(code));
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(VoiceError::TokenHttp(599)))
    }

    fn spawn_mic_forwarder(self: &Arc<Self>, webrtc: Arc<WebrtcManager>, captured: u64) {
        let this = Arc::clone(self);
        let rt = tokio::runtime::Handle::current();
        std::thread::spawn(move || {
            loop {
                if !this.is_epoch_current(captured) {
                    return;
                }
                let frame = {
                    let guard = match this.mic.try_lock() {
                        Ok(g) => g,
                        Err(_) => continue,
                    };
                    guard.as_ref().and_then(|m| m.frames().recv_timeout(Duration::from_millis(200)).ok())
                };
                let Some(samples) = frame else { continue };
                if this.mic_paused.load(Ordering::Acquire) {
                    continue;
                }
                let pcm = f32_to_pcm16(&samples);
                let webrtc = Arc::clone(&webrtc);
                rt.block_on(async move {
                    if let Err(e) = webrtc.send_audio_frame(&pcm).await {
                        tracing::warn!("failed to send audio frame: {e}");
                    }
                });
            }
        });
    }

    /// Polls mic level at a fixed cadence (§4.3), republishes it to the UI,
    /// and feeds it to the Adaptive VAD (§4.10), pushing a `turn_detection`
    /// update over the data channel whenever the noise category shifts.
    fn spawn_level_reporter(self: &Arc<Self>, level: Arc<Mutex<f32>>, webrtc: Arc<WebrtcManager>, captured: u64) {
        let this = Arc::clone(self);
        MicStream::spawn_level_reporter(level, 200, move |level| {
            if !this.is_epoch_current(captured) {
                return;
            }
            *this.last_mic_level.lock().unwrap() = level;
            this.events.conversation.emit(ConversationEvent::MicLevel { level });

            if !this.config.adaptive_vad_enabled {
                return;
            }
            let recommendation = {
                let mut vad = this.vad.lock().unwrap();
                if vad.observe(level).is_err() {
                    return;
                }
                vad.next_recommendation()
            };
            if let Some(params) = recommendation {
                let webrtc = Arc::clone(&webrtc);
                tokio::spawn(async move {
                    let payload = serde_json::json!({
                        "type": "session.update",
                        "session": {
                            "turn_detection": {
                                "threshold": params.threshold,
                                "silence_duration_ms": params.silence_ms,
                            }
                        },
                    });
                    let _ = webrtc.send_json(&payload).await;
                });
            }
        });
    }

    /// Polls the coordinator's user-transcript fallback/extended-fallback
    /// deadlines (§4.6 step 3, Scenario C): the server may never send
    /// `...completed` for a committed user utterance, so this ticker is
    /// what actually fires the fallback finalization once the deadline
    /// passes.
    fn spawn_transcript_timeout_ticker(self: &Arc<Self>, captured: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(100));
            loop {
                interval.tick().await;
                if !this.is_epoch_current(captured) {
                    return;
                }
                let outcome = this.transcript.lock().unwrap().poll_user_timeout(now_ms());
                if let Some(outcome) = outcome {
                    this.route_outcome(outcome).await;
                }
            }
        });
    }

    fn spawn_event_loop(self: &Arc<Self>, webrtc: Arc<WebrtcManager>, captured: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let dispatcher = EventDispatcher::new();
            loop {
                if !this.is_epoch_current(captured) {
                    return;
                }
                match webrtc.next_event().await {
                    Some(WebrtcEvent::DataChannelOpen) => this.on_data_channel_open(&webrtc, captured).await,
                    Some(WebrtcEvent::DataChannelMessage(bytes)) => {
                        if let Ok(text) = String::from_utf8(bytes) {
                            this.on_data_channel_message(&dispatcher, &text).await;
                        }
                    }
                    Some(WebrtcEvent::RemoteAudio(samples)) => {
                        if let Some(playback) = this.playback.lock().await.as_ref() {
                            playback.push(&samples);
                        }
                    }
                    Some(WebrtcEvent::Closed) | None => {
                        this.state.set_error("webrtc connection closed");
                        this.emit_status();
                        return;
                    }
                }
            }
        });
    }

    async fn on_data_channel_open(self: &Arc<Self>, webrtc: &Arc<WebrtcManager>, captured: u64) {
        self.events.debug.record(DebugEvent::new(DebugKind::Info, "datachannel.open", now_ms()));
        let _ = webrtc.flush_pending().await;
        let _ = webrtc.enable_modalities().await;
        self.state.begin_awaiting_session_ack();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(SESSION_ACK_TIMEOUT_MS)).await;
            if !this.is_epoch_current(captured) {
                return;
            }
            if this.state.awaiting_session_ack() {
                tracing::warn!("session.updated ack not received within timeout, proceeding anyway");
                this.state.mark_session_ready();
                this.state.set_connected();
                this.set_connection_state(ConnectionState::Connected);
                this.emit_status();
            }
        });

        self.refresh_instructions(Some("datachannel.open")).await;
    }

    async fn on_data_channel_message(self: &Arc<Self>, dispatcher: &EventDispatcher, raw: &str) {
        let Some(classified) = dispatcher.dispatch(raw, &self.events.debug, now_ms()) else { return };

        match classified.family {
            EventFamily::Session => {
                if classified.type_word == "session.updated" {
                    self.state.mark_session_ready();
                    self.state.set_connected();
                    self.set_connection_state(ConnectionState::Connected);
                    self.emit_status();
                }
            }
            EventFamily::Speech => self.handle_speech_event(&classified.type_word, &classified.payload).await,
            EventFamily::Transcription => self.handle_transcription_event(&classified.type_word, &classified.payload).await,
            EventFamily::Assistant => self.handle_assistant_event(&classified.type_word, &classified.payload).await,
            EventFamily::ConversationItem | EventFamily::Unknown => {}
            EventFamily::Error => tracing::warn!(event = classified.type_word, "realtime service reported an error"),
        }
    }

    async fn handle_speech_event(&self, type_word: &str, payload: &Value) {
        let item_id = payload.get("item_id").and_then(Value::as_str).map(str::to_string);
        let outcome = {
            let mut transcript = self.transcript.lock().unwrap();
            match type_word {
                "input_audio_buffer.speech_started" => Some(transcript.user_speech_started(item_id, now_ms())),
                "input_audio_buffer.speech_stopped" | "input_audio_buffer.committed" => {
                    transcript.user_speech_stopped(now_ms());
                    None
                }
                _ => None,
            }
        };
        if let Some(outcome) = outcome {
            self.route_outcome(outcome).await;
        }
    }

    async fn handle_transcription_event(&self, type_word: &str, payload: &Value) {
        let delta = payload.get("delta").and_then(Value::as_str).unwrap_or("");
        let outcome = if type_word.ends_with("completed") {
            let transcript_text = payload.get("transcript").and_then(Value::as_str).unwrap_or(delta).to_string();
            self.transcript.lock().unwrap().user_completed(transcript_text, now_ms())
        } else if type_word.ends_with("failed") {
            self.transcript.lock().unwrap().user_failed(now_ms())
        } else {
            Some(self.transcript.lock().unwrap().user_audio_delta(delta, now_ms()))
        };
        if let Some(outcome) = outcome {
            self.route_outcome(outcome).await;
        }
    }

    async fn handle_assistant_event(&self, type_word: &str, payload: &Value) {
        let item_id = payload.get("item_id").and_then(Value::as_str).map(str::to_string);
        let delta = payload.get("delta").and_then(Value::as_str).unwrap_or("").to_string();

        let outcome = match type_word {
            "response.audio_transcript.delta" => {
                Some(self.transcript.lock().unwrap().assistant_audio_delta(item_id, &delta, now_ms()))
            }
            "response.output_text.delta" => Some(self.transcript.lock().unwrap().assistant_text_delta(item_id, &delta, now_ms())),
            "response.content_part.added" => {
                let output_text = payload
                    .get("content_part")
                    .and_then(|p| p.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.transcript.lock().unwrap().assistant_content_part_added(item_id, output_text, now_ms())
            }
            "response.output_text.done" | "response.content_part.done" => {
                let text = payload
                    .get("content_part")
                    .and_then(|p| p.get("text"))
                    .or_else(|| payload.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                Some(self.transcript.lock().unwrap().assistant_text_done(item_id, text, now_ms()))
            }
            "response.audio_transcript.done" => {
                let text = payload
                    .get("transcript")
                    .or_else(|| payload.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                Some(self.transcript.lock().unwrap().assistant_audio_done(text, now_ms()))
            }
            _ => None,
        };

        if let Some(outcome) = outcome {
            self.route_outcome(outcome).await;
        }
    }

    fn set_partial(&self, role: Role, text: String) {
        match role {
            Role::User => *self.user_partial.lock().unwrap() = text,
            Role::Assistant => *self.assistant_partial.lock().unwrap() = text,
        }
    }

    fn clear_partial(&self, role: Role) {
        self.set_partial(role, String::new());
    }

    fn persist_turn(&self, turn: &voice_domain::Turn) {
        let Some(sink) = self.sink.lock().unwrap().clone() else { return };
        let session_id = self.session.lock().unwrap().as_ref().map(|s| s.session_id.clone());
        if let Some(session_id) = session_id {
            sink.record_turn(&session_id, turn);
        }
    }

    async fn route_outcome(&self, outcome: HandlerOutcome) {
        match outcome {
            HandlerOutcome::Partial(partial) => {
                self.set_partial(partial.role, partial.text.clone());
                self.events.conversation.emit(ConversationEvent::Partial {
                    role: partial.role,
                    text: partial.text,
                    started_at_ms: partial.started_at_ms,
                    emitted_at_ms: partial.emitted_at_ms,
                });
            }
            HandlerOutcome::LocalFinal { turn, media } => {
                self.clear_partial(turn.role);
                self.persist_turn(&turn);
                self.events.conversation.emit(ConversationEvent::Transcript { turn: Box::new(turn), media });
            }
            HandlerOutcome::RelayFinal { turn, media } => {
                self.clear_partial(turn.role);
                self.persist_turn(&turn);
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let req = RelayTurnRequest {
                    role: role.to_string(),
                    text: turn.text.clone(),
                    is_final: turn.is_final,
                    timestamp: turn.started_at_ms,
                    item_id: turn.item_id.clone(),
                    started_at: Some(turn.started_at_ms),
                    finalized_at: turn.finalized_at_ms,
                    emitted_at: Some(turn.emitted_at_ms),
                    media: media.as_ref().and_then(|m| serde_json::to_value(m).ok()),
                    source: None,
                };
                let session_id = self.session.lock().unwrap().as_ref().map(|s| s.session_id.clone());
                if let Some(session_id) = session_id {
                    if let Err(e) = self.http.relay_transcript(&session_id, &req).await {
                        tracing::warn!("transcript relay failed, falling back to local emit: {e}");
                        self.events.conversation.emit(ConversationEvent::Transcript { turn: Box::new(turn), media });
                    }
                }
            }
            HandlerOutcome::Suppressed(marker) => {
                self.events.debug.record(DebugEvent::new(DebugKind::Info, marker, now_ms()));
            }
        }
    }

    fn emit_status(&self) {
        self.events.conversation.emit(ConversationEvent::Status { status: self.state.status(), error: self.state.error() });
    }

    pub async fn stop(self: &Arc<Self>) {
        self.epoch.advance();
        self.set_connection_state(ConnectionState::Disconnecting);

        if let Some(webrtc) = self.webrtc.lock().await.take() {
            let _ = webrtc.close().await;
        }
        if let Some(mic) = self.mic.lock().await.take() {
            let _ = mic.pause();
        }
        if let Some(playback) = self.playback.lock().await.take() {
            playback.clear();
            let _ = playback.pause();
        }
        self.backend.disconnect().await;
        *self.user_partial.lock().unwrap() = String::new();
        *self.assistant_partial.lock().unwrap() = String::new();

        self.state.set_idle();
        self.set_connection_state(ConnectionState::Idle);
        self.emit_status();
    }

    pub async fn pause(&self) {
        self.mic_paused.store(true, Ordering::Release);
        if let Some(mic) = self.mic.lock().await.as_ref() {
            let _ = mic.pause();
        }
        self.events.conversation.emit(ConversationEvent::Pause { paused: true });
    }

    pub async fn resume(&self) {
        self.mic_paused.store(false, Ordering::Release);
        if let Some(mic) = self.mic.lock().await.as_ref() {
            let _ = mic.resume();
        }
        self.events.conversation.emit(ConversationEvent::Pause { paused: false });
    }

    pub async fn send_text(&self, text: String) {
        let webrtc = self.webrtc.lock().await.clone();
        if let Some(webrtc) = webrtc {
            let payload = serde_json::json!({
                "type": "conversation.item.create",
                "item": { "type": "message", "role": "user", "content": [{"type": "input_text", "text": text}] },
            });
            let _ = webrtc.send_json(&payload).await;
        }
    }

    pub async fn refresh_instructions(self: &Arc<Self>, reason: Option<&str>) {
        let phase = self.encounter_phase.lock().unwrap().clone();
        let gate = self.encounter_gate.lock().unwrap().clone();
        let reason = reason.unwrap_or("manual").to_string();
        match self.instructions.refresh(&reason, phase.clone(), Some(gate.clone())).await {
            Ok(Some(update)) => {
                *self.encounter_phase.lock().unwrap() = Some(update.phase.clone());
                *self.outstanding_gate.lock().unwrap() = update.outstanding_gate.clone();
                if let Some(webrtc) = self.webrtc.lock().await.as_ref() {
                    let payload = serde_json::json!({
                        "type": "session.update",
                        "session": { "instructions": update.instructions },
                    });
                    let _ = webrtc.send_json(&payload).await;
                }
                self.events.conversation.emit(ConversationEvent::Instructions {
                    phase: Some(update.phase),
                    outstanding_gate: update.outstanding_gate,
                    gate,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("instruction refresh failed: {e}"),
        }
    }

    pub fn update_encounter_state(self: &Arc<Self>, phase: Option<String>, gate: Option<GateFlags>) {
        if let Some(phase) = phase {
            *self.encounter_phase.lock().unwrap() = Some(phase);
        }
        if let Some(gate) = gate {
            *self.encounter_gate.lock().unwrap() = gate;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh_instructions(Some("gate.update")).await });
    }

    pub fn add_conversation_listener(&self, listener: voice_events::ConversationListener) {
        self.events.conversation.subscribe(listener);
    }

    pub fn add_event_listener(&self, listener: voice_events::DebugListener) {
        self.events.debug.subscribe(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_domain::SessionStatus;

    fn test_identity() -> EncounterIdentity {
        EncounterIdentity { persona_id: "persona-1".to_string(), scenario_id: "scenario-1".to_string(), audience: Audience::Student }
    }

    #[tokio::test]
    async fn new_controller_starts_idle_with_no_session() {
        let controller = VoiceController::new(VoiceConfig::default(), "http://127.0.0.1:0", test_identity()).unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.session_id.is_none());
        assert!(!snapshot.mic_paused);
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_mic_paused_flag() {
        let controller = VoiceController::new(VoiceConfig::default(), "http://127.0.0.1:0", test_identity()).unwrap();
        controller.pause().await;
        assert!(controller.snapshot().mic_paused);
        controller.resume().await;
        assert!(!controller.snapshot().mic_paused);
    }

    #[tokio::test]
    async fn update_encounter_state_applies_phase_and_gate_before_any_network_roundtrip() {
        let controller = VoiceController::new(VoiceConfig::default(), "http://127.0.0.1:0", test_identity()).unwrap();
        let gate = GateFlags { greeting_done: true, ..GateFlags::default() };
        controller.update_encounter_state(Some("exam".to_string()), Some(gate));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.encounter_phase.as_deref(), Some("exam"));
        assert!(snapshot.encounter_gate.greeting_done);
    }

    #[tokio::test]
    async fn send_text_without_an_active_webrtc_manager_is_a_noop() {
        let controller = VoiceController::new(VoiceConfig::default(), "http://127.0.0.1:0", test_identity()).unwrap();
        controller.send_text("hello".to_string()).await;
    }

    #[tokio::test]
    async fn starting_twice_rejects_the_second_call_with_already_starting() {
        let controller = VoiceController::new(VoiceConfig::default(), "http://127.0.0.1:0", test_identity()).unwrap();
        *controller.connection_state.lock().unwrap() = ConnectionState::RequestMic;
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, VoiceError::AlreadyStarting));
    }

    struct RecordingSink(Mutex<Vec<(String, String)>>);

    impl TranscriptSink for RecordingSink {
        fn record_turn(&self, session_id: &str, turn: &voice_domain::Turn) {
            self.0.lock().unwrap().push((session_id.to_string(), turn.text.clone()));
        }
    }

    #[tokio::test]
    async fn finalized_turns_reach_the_sink_once_a_session_exists() {
        let controller = VoiceController::new(VoiceConfig::default(), "http://127.0.0.1:0", test_identity()).unwrap();
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        controller.set_transcript_sink(sink.clone());

        *controller.session.lock().unwrap() = Some(Session::new("sess-1", "persona-1", "scenario-1", Audience::Student, 0));

        let turn = voice_domain::Turn {
            item_id: None,
            role: Role::User,
            text: "hello doctor".to_string(),
            is_final: true,
            started_at_ms: 0,
            emitted_at_ms: 0,
            finalized_at_ms: Some(0),
        };
        controller.persist_turn(&turn);

        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.as_slice(), [("sess-1".to_string(), "hello doctor".to_string())]);
    }

    #[tokio::test]
    async fn persisting_without_an_active_session_is_a_noop() {
        let controller = VoiceController::new(VoiceConfig::default(), "http://127.0.0.1:0", test_identity()).unwrap();
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        controller.set_transcript_sink(sink.clone());

        let turn = voice_domain::Turn {
            item_id: None,
            role: Role::Assistant,
            text: "no session yet".to_string(),
            is_final: true,
            started_at_ms: 0,
            emitted_at_ms: 0,
            finalized_at_ms: None,
        };
        controller.persist_turn(&turn);

        assert!(sink.0.lock().unwrap().is_empty());
    }
}
