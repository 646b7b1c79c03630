use std::time::Duration;

use reqwest::StatusCode;
use voice_domain::{Result, VoiceError};

use crate::dto::{
    CreateSessionRequest, CreateSessionResponse, EndSessionResponse, InstructionsRequest,
    InstructionsResponse, RelayTurnRequest, SdpRequest, SpsTurnsRequest, SpsTurnsResponse,
    TokenRequest, TokenResponse,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const SDP_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin `reqwest`-based transport for the HTTP REST surface the conversation
/// core consumes (§6.1): session creation, token/SDP exchange, instruction
/// refresh, and transcript relay/fallback persistence.
pub struct VoiceHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl VoiceHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn create_session(&self, req: &CreateSessionRequest) -> Result<CreateSessionResponse> {
        let resp = self
            .client
            .post(self.url("/api/sessions"))
            .json(req)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VoiceError::SessionHttp(resp.status().as_u16()));
        }
        resp.json().await.map_err(|e| VoiceError::Protocol(e.to_string()))
    }

    pub async fn fetch_rtc_token(&self, req: &TokenRequest) -> Result<TokenResponse> {
        let resp = self
            .client
            .post(self.url("/api/voice/token"))
            .json(req)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VoiceError::TokenHttp(resp.status().as_u16()));
        }
        resp.json().await.map_err(|e| VoiceError::Protocol(e.to_string()))
    }

    /// The response body is the raw SDP answer text, not JSON.
    pub async fn exchange_sdp(&self, session_id: &str, offer_sdp: String) -> Result<String> {
        let req = SdpRequest { session_id: session_id.to_string(), sdp: offer_sdp };
        let resp = self
            .client
            .post(self.url("/api/voice/sdp"))
            .json(&req)
            .timeout(SDP_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if resp.status() == StatusCode::PRECONDITION_FAILED || !resp.status().is_success() {
            return Err(VoiceError::SdpHttp(resp.status().as_u16()));
        }
        resp.text().await.map_err(|e| VoiceError::Protocol(e.to_string()))
    }

    pub async fn fetch_instructions(&self, req: &InstructionsRequest) -> Result<InstructionsResponse> {
        let resp = self
            .client
            .post(self.url("/api/voice/instructions"))
            .json(req)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VoiceError::Protocol(format!("instructions request failed: {}", resp.status())));
        }
        resp.json().await.map_err(|e| VoiceError::Protocol(e.to_string()))
    }

    /// Fallback-path relay of a single finalized turn (used when the
    /// backend socket is unavailable at emission time).
    pub async fn relay_transcript(&self, session_id: &str, req: &RelayTurnRequest) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/api/transcript/relay/{session_id}")))
            .json(req)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if resp.status() != StatusCode::NO_CONTENT && !resp.status().is_success() {
            return Err(VoiceError::Protocol(format!("transcript relay failed: {}", resp.status())));
        }
        Ok(())
    }

    pub async fn sync_turns(&self, session_id: &str, req: &SpsTurnsRequest) -> Result<SpsTurnsResponse> {
        let resp = self
            .client
            .post(self.url(&format!("/api/sessions/{session_id}/sps/turns")))
            .json(req)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VoiceError::Protocol(format!("turn sync failed: {}", resp.status())));
        }
        resp.json().await.map_err(|e| VoiceError::Protocol(e.to_string()))
    }

    pub async fn end_session(&self, session_id: &str) -> Result<EndSessionResponse> {
        let resp = self
            .client
            .post(self.url(&format!("/api/sessions/{session_id}/end")))
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VoiceError::Protocol(format!("end session failed: {}", resp.status())));
        }
        resp.json().await.map_err(|e| VoiceError::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path_without_double_slash() {
        let client = VoiceHttpClient::new("https://example.test/");
        assert_eq!(client.url("/api/sessions"), "https://example.test/api/sessions");
    }
}
