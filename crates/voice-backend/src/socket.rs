use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use voice_domain::{Result, VoiceError};

use crate::protocol::{
    JoinSessionPayload, RequestCatchupPayload, TranscriptErrorPayload, TranscriptPayload,
    WireEnvelope, EVENT_CATCHUP_TRANSCRIPTS, EVENT_JOIN_SESSION, EVENT_REQUEST_CATCHUP,
    EVENT_TRANSCRIPT, EVENT_TRANSCRIPT_ERROR,
};

const DEFAULT_FAILURE_BUDGET: u32 = 3;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub type TranscriptCallback = Box<dyn Fn(TranscriptPayload) + Send + Sync>;
pub type CatchupCallback = Box<dyn Fn(Vec<TranscriptPayload>) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(String) + Send + Sync>;
pub type LifecycleCallback = Box<dyn Fn() + Send + Sync>;

/// Lifecycle and message callbacks, grounded on the same boxed-closure
/// idiom `voice-events` uses for its listener fan-outs.
#[derive(Default)]
pub struct BackendCallbacks {
    pub on_connect: Option<LifecycleCallback>,
    pub on_disconnect: Option<LifecycleCallback>,
    pub on_reconnect: Option<LifecycleCallback>,
    pub on_catchup: Option<CatchupCallback>,
    pub on_transcript: Option<TranscriptCallback>,
    pub on_transcript_error: Option<ErrorCallback>,
    pub on_failure: Option<ErrorCallback>,
    pub on_max_failures: Option<LifecycleCallback>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackendSocketSnapshot {
    pub enabled: bool,
    pub connected: bool,
    pub consecutive_failures: u32,
    pub last_received_timestamp: i64,
}

#[async_trait]
pub trait BackendSocket: Send + Sync {
    async fn connect(&self, session_id: &str) -> Result<()>;
    async fn disconnect(&self);
    async fn join_session(&self, session_id: &str) -> Result<()>;
    async fn request_catchup(&self, session_id: &str) -> Result<()>;
    async fn emit(&self, event: &str, data: serde_json::Value) -> Result<()>;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn snapshot(&self) -> BackendSocketSnapshot;
}

/// Derives the socket namespace URL from the HTTP base URL: same origin
/// and path, `/socket.io/` appended, `http(s)` rewritten to `ws(s)`.
pub fn derive_socket_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).map_err(|e| VoiceError::Protocol(format!("invalid backend url: {e}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme).map_err(|_| VoiceError::Protocol("failed to rewrite url scheme".to_string()))?;
    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

struct Inner {
    url: Url,
    failure_budget: u32,
    sink: Mutex<Option<WsSink>>,
    callbacks: BackendCallbacks,
    enabled: AtomicBool,
    connected: AtomicBool,
    consecutive_failures: AtomicU32,
    last_received_timestamp: AtomicI64,
    has_connected_once: AtomicBool,
}

impl Inner {
    fn record_failure(self: &Arc<Self>, message: String) {
        self.connected.store(false, Ordering::Release);
        if let Some(cb) = &self.callbacks.on_disconnect {
            cb();
        }
        if let Some(cb) = &self.callbacks.on_failure {
            cb(message);
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_budget {
            self.enabled.store(false, Ordering::Release);
            if let Some(cb) = &self.callbacks.on_max_failures {
                cb();
            }
        }
    }

    fn handle_envelope(self: &Arc<Self>, envelope: WireEnvelope) {
        match envelope.event.as_str() {
            EVENT_TRANSCRIPT => match serde_json::from_value::<TranscriptPayload>(envelope.data) {
                Ok(payload) => {
                    self.bump_last_received(payload.timestamp);
                    if let Some(cb) = &self.callbacks.on_transcript {
                        cb(payload);
                    }
                }
                Err(e) => tracing::warn!("malformed transcript payload: {e}"),
            },
            EVENT_TRANSCRIPT_ERROR => match serde_json::from_value::<TranscriptErrorPayload>(envelope.data) {
                Ok(payload) => {
                    if let Some(cb) = &self.callbacks.on_transcript_error {
                        cb(payload.message);
                    }
                }
                Err(e) => tracing::warn!("malformed transcript-error payload: {e}"),
            },
            EVENT_CATCHUP_TRANSCRIPTS => match serde_json::from_value::<Vec<TranscriptPayload>>(envelope.data) {
                Ok(turns) => {
                    if let Some(max) = turns.iter().map(|t| t.timestamp).max() {
                        self.bump_last_received(max);
                    }
                    if let Some(cb) = &self.callbacks.on_catchup {
                        cb(turns);
                    }
                }
                Err(e) => tracing::warn!("malformed catchup-transcripts payload: {e}"),
            },
            other => tracing::debug!(event = other, "unrecognized backend event"),
        }
    }

    fn bump_last_received(&self, timestamp: i64) {
        let _ = self.last_received_timestamp.fetch_max(timestamp, Ordering::AcqRel);
    }

    async fn write_envelope(&self, envelope: &WireEnvelope) -> Result<()> {
        let text = serde_json::to_string(envelope).map_err(|e| VoiceError::Protocol(e.to_string()))?;
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or_else(|| VoiceError::Transport("backend socket not connected".to_string()))?;
        sink.send(Message::Text(text)).await.map_err(|e| VoiceError::Transport(e.to_string()))
    }

    async fn request_catchup_with_since(&self, session_id: &str, since: i64) -> Result<()> {
        let payload = RequestCatchupPayload { session_id: session_id.to_string(), since };
        let value = serde_json::to_value(payload).map_err(|e| VoiceError::Protocol(e.to_string()))?;
        self.write_envelope(&WireEnvelope::new(EVENT_REQUEST_CATCHUP, value)).await
    }
}

/// Hand-rolled backend transport (§4.8): no Engine.IO/Socket.IO wire crate
/// is available in this ecosystem, so messages travel as a small JSON
/// envelope over a plain `tokio-tungstenite` connection. Cheaply `Clone`
/// (an `Arc` around the connection state) so the controller can hand out a
/// shared handle while a background task owns the read half.
#[derive(Clone)]
pub struct TungsteniteBackendSocket {
    inner: Arc<Inner>,
}

impl TungsteniteBackendSocket {
    pub fn new(base_url: &str, callbacks: BackendCallbacks) -> Result<Self> {
        Self::with_failure_budget(base_url, DEFAULT_FAILURE_BUDGET, callbacks)
    }

    pub fn with_failure_budget(base_url: &str, failure_budget: u32, callbacks: BackendCallbacks) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                url: derive_socket_url(base_url)?,
                failure_budget,
                sink: Mutex::new(None),
                callbacks,
                enabled: AtomicBool::new(true),
                connected: AtomicBool::new(false),
                consecutive_failures: AtomicU32::new(0),
                last_received_timestamp: AtomicI64::new(0),
                has_connected_once: AtomicBool::new(false),
            }),
        })
    }
}

#[async_trait]
impl BackendSocket for TungsteniteBackendSocket {
    async fn connect(&self, session_id: &str) -> Result<()> {
        let inner = &self.inner;
        if !inner.enabled.load(Ordering::Acquire) {
            return Err(VoiceError::Protocol("backend socket disabled after repeated failures".to_string()));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(inner.url.clone()).await.map_err(|e| {
            inner.record_failure(e.to_string());
            VoiceError::Transport(format!("backend socket connect failed: {e}"))
        })?;

        let (sink, mut stream) = ws_stream.split();
        *inner.sink.lock().await = Some(sink);

        let was_reconnect = inner.has_connected_once.swap(true, Ordering::AcqRel);
        inner.connected.store(true, Ordering::Release);
        inner.consecutive_failures.store(0, Ordering::Release);

        if was_reconnect {
            if let Some(cb) = &inner.callbacks.on_reconnect {
                cb();
            }
            let since = inner.last_received_timestamp.load(Ordering::Acquire);
            let _ = inner.request_catchup_with_since(session_id, since).await;
        } else if let Some(cb) = &inner.callbacks.on_connect {
            cb();
        }

        self.join_session(session_id).await?;

        let task_inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<WireEnvelope>(&text) {
                        Ok(envelope) => task_inner.handle_envelope(envelope),
                        Err(e) => tracing::warn!("malformed backend envelope: {e}"),
                    },
                    Ok(Message::Close(_)) => {
                        task_inner.record_failure("connection closed by peer".to_string());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        task_inner.record_failure(e.to_string());
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.inner.connected.store(false, Ordering::Release);
        if let Some(cb) = &self.inner.callbacks.on_disconnect {
            cb();
        }
    }

    async fn join_session(&self, session_id: &str) -> Result<()> {
        let payload = JoinSessionPayload { session_id: session_id.to_string() };
        let value = serde_json::to_value(payload).map_err(|e| VoiceError::Protocol(e.to_string()))?;
        self.inner.write_envelope(&WireEnvelope::new(EVENT_JOIN_SESSION, value)).await
    }

    async fn request_catchup(&self, session_id: &str) -> Result<()> {
        let since = self.inner.last_received_timestamp.load(Ordering::Acquire);
        self.inner.request_catchup_with_since(session_id, since).await
    }

    async fn emit(&self, event: &str, data: serde_json::Value) -> Result<()> {
        self.inner.write_envelope(&WireEnvelope::new(event, data)).await
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
        if enabled {
            self.inner.consecutive_failures.store(0, Ordering::Release);
        }
    }

    fn snapshot(&self) -> BackendSocketSnapshot {
        BackendSocketSnapshot {
            enabled: self.is_enabled(),
            connected: self.inner.connected.load(Ordering::Acquire),
            consecutive_failures: self.inner.consecutive_failures.load(Ordering::Acquire),
            last_received_timestamp: self.inner.last_received_timestamp.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ws_url_from_http_base() {
        let url = derive_socket_url("http://localhost:4000/app").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/app/socket.io/");
    }

    #[test]
    fn derives_wss_from_https() {
        let url = derive_socket_url("https://sps.example.test").unwrap();
        assert_eq!(url.scheme(), "wss");
    }
}
