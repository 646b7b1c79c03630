use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use str0m::change::SdpAnswer;
use str0m::channel::ChannelId;
use str0m::media::{Direction, Frequency, MediaKind, MediaTime, Mid, Pt};
use str0m::Rtc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

use voice_domain::{Result, VoiceError};
use voice_http::VoiceHttpClient;

use crate::codec::OpusCodec;
use crate::io::drive_io;

const DATA_CHANNEL_LABEL: &str = "oai-events";
const MAX_QUEUED_DC_MESSAGES: usize = 50;
const HTTP_RETRY_DELAYS_MS: [u64; 3] = [250, 750, 2000];

/// A message arriving off the data channel, or a notable WebRTC lifecycle
/// event, handed to the Event Dispatcher.
pub enum WebrtcEvent {
    DataChannelOpen,
    DataChannelMessage(Vec<u8>),
    RemoteAudio(Vec<f32>),
    Closed,
}

/// Owns the peer connection (§4.2): SDP negotiation, the `oai-events` data
/// channel, and the bidirectional Opus audio track. Driven by a background
/// task that pumps `str0m`'s Sans-IO output/input over a UDP socket.
pub struct WebrtcManager {
    rtc: Arc<Mutex<Rtc>>,
    audio_track: Mid,
    data_channel: ChannelId,
    encoder: Arc<Mutex<OpusCodec>>,
    decoder: Arc<Mutex<OpusCodec>>,
    opus_pt: Pt,
    clock_rate: Frequency,
    rtp_offset: AtomicU64,
    dc_open: Arc<AtomicBool>,
    pending_dc_messages: Arc<Mutex<Vec<Vec<u8>>>>,
    events: Mutex<mpsc::UnboundedReceiver<WebrtcEvent>>,
}

/// Retries a transient 5xx on `/api/voice/sdp` with the same backoff as the
/// token fetch (three attempts, 250ms/750ms/2s).
async fn exchange_sdp_with_retry(http: &VoiceHttpClient, session_id: &str, offer_sdp: String) -> Result<String> {
    let mut last_err = None;
    for (attempt, delay_ms) in HTTP_RETRY_DELAYS_MS.iter().enumerate() {
        match http.exchange_sdp(session_id, offer_sdp.clone()).await {
            Ok(answer) => return Ok(answer),
            Err(VoiceError::SdpHttp(code)) if (500..600).contains(&code) && attempt + 1 < HTTP_RETRY_DELAYS_MS.len() => {
                last_err = Some(VoiceError::SdpHttp(code));
                tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(VoiceError::SdpHttp(599)))
}

impl WebrtcManager {
    /// Negotiates a peer connection against the realtime service: builds
    /// the local SDP offer, exchanges it for an answer via
    /// `POST /api/voice/sdp`, and applies the answer.
    pub async fn connect(http: &VoiceHttpClient, session_id: &str, opus_sample_rate: u32) -> Result<Self> {
        let mut rtc = Rtc::new();

        let mut changes = rtc.sdp_api();
        let audio_track = changes.add_media(MediaKind::Audio, Direction::SendRecv, None, None, None);
        let data_channel = changes.add_channel(DATA_CHANNEL_LABEL.to_string());
        let (offer, pending) = changes
            .apply()
            .ok_or_else(|| VoiceError::Protocol("no SDP changes to apply".to_string()))?;

        let answer_sdp = exchange_sdp_with_retry(http, session_id, offer.to_sdp_string()).await?;
        let answer = SdpAnswer::from_sdp_string(&answer_sdp)
            .map_err(|e| VoiceError::Protocol(format!("failed to parse SDP answer: {e}")))?;

        rtc.sdp_api()
            .accept_answer(pending, answer)
            .map_err(|e| VoiceError::Protocol(format!("failed to apply SDP answer: {e}")))?;

        let (opus_pt, clock_rate) = {
            let writer = rtc
                .writer(audio_track)
                .ok_or_else(|| VoiceError::Protocol("audio track writer unavailable".to_string()))?;
            let params = writer
                .payload_params()
                .next()
                .ok_or_else(|| VoiceError::Protocol("no payload type negotiated".to_string()))?;
            (params.pt(), params.spec().clock_rate)
        };

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| VoiceError::Transport(format!("failed to bind local UDP socket: {e}")))?;

        let rtc = Arc::new(Mutex::new(rtc));
        let dc_open = Arc::new(AtomicBool::new(false));
        let decoder = Arc::new(Mutex::new(OpusCodec::new(opus_sample_rate)?));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(drive_io(
            Arc::clone(&rtc),
            socket,
            data_channel,
            audio_track,
            Arc::clone(&decoder),
            Arc::clone(&dc_open),
            tx,
        ));

        Ok(Self {
            rtc,
            audio_track,
            data_channel,
            encoder: Arc::new(Mutex::new(OpusCodec::new(opus_sample_rate)?)),
            decoder,
            opus_pt,
            clock_rate,
            rtp_offset: AtomicU64::new(0),
            dc_open,
            pending_dc_messages: Arc::new(Mutex::new(Vec::new())),
            events: Mutex::new(rx),
        })
    }

    pub fn is_data_channel_open(&self) -> bool {
        self.dc_open.load(Ordering::Acquire)
    }

    /// Sends a `session.update` enabling both modalities; must be the first
    /// message after the data channel opens (§4.2).
    pub async fn enable_modalities(&self) -> Result<()> {
        self.send_json(&serde_json::json!({
            "type": "session.update",
            "session": { "modalities": ["text", "audio"] },
        }))
        .await
    }

    pub async fn send_json(&self, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| VoiceError::Protocol(e.to_string()))?;

        if !self.is_data_channel_open() {
            let mut pending = self.pending_dc_messages.lock().await;
            if pending.len() >= MAX_QUEUED_DC_MESSAGES {
                return Err(VoiceError::Protocol("data channel message queue full".to_string()));
            }
            pending.push(bytes);
            return Ok(());
        }

        self.write_to_channel(&bytes).await
    }

    async fn write_to_channel(&self, bytes: &[u8]) -> Result<()> {
        let mut rtc = self.rtc.lock().await;
        let mut channel = rtc
            .channel(self.data_channel)
            .ok_or_else(|| VoiceError::Protocol("data channel unavailable".to_string()))?;
        channel
            .write(true, bytes)
            .map_err(|e| VoiceError::Transport(format!("data channel write failed: {e}")))
    }

    /// Called when the driving loop observes the channel opening; flushes
    /// anything queued while the handshake was still in flight.
    pub async fn flush_pending(&self) -> Result<()> {
        self.dc_open.store(true, Ordering::Release);
        let mut pending = self.pending_dc_messages.lock().await;
        for msg in pending.drain(..) {
            self.write_to_channel(&msg).await?;
        }
        Ok(())
    }

    /// Opus-encodes one frame of mono PCM audio and writes it to the audio
    /// track's next RTP timestamp.
    pub async fn send_audio_frame(&self, pcm: &[i16]) -> Result<()> {
        let opus = self.encoder.lock().await.encode(pcm)?;
        let clock_hz = self.clock_rate.get() as u64;
        let samples_at_clock = (pcm.len() as u64) * clock_hz / self.clock_rate.get() as u64;
        let offset = self.rtp_offset.fetch_add(samples_at_clock.max(1), Ordering::Relaxed);

        let mut rtc = self.rtc.lock().await;
        let writer = rtc
            .writer(self.audio_track)
            .ok_or_else(|| VoiceError::Protocol("audio track writer unavailable".to_string()))?;
        writer
            .write(self.opus_pt, Instant::now(), MediaTime::new(offset, self.clock_rate), opus)
            .map_err(|e| VoiceError::Transport(format!("audio track write failed: {e}")))
    }

    pub async fn decode_remote_frame(&self, opus_data: &[u8]) -> Result<Vec<i16>> {
        self.decoder.lock().await.decode(opus_data)
    }

    /// Pulls the next WebRTC lifecycle/data event for the Event Dispatcher.
    pub async fn next_event(&self) -> Option<WebrtcEvent> {
        self.events.lock().await.recv().await
    }

    pub async fn close(&self) -> Result<()> {
        let mut rtc = self.rtc.lock().await;
        if let Some(mut channel) = rtc.channel(self.data_channel) {
            let _ = channel.write(true, b"{}");
        }
        rtc.disconnect();
        Ok(())
    }
}
