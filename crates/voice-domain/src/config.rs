use serde::{Deserialize, Serialize};

/// Runtime configuration for the voice conversation core (spec §6.5). All
/// fields are optional on the wire; `Default` supplies the documented
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub voice_enabled: bool,
    pub sps_enabled: bool,
    pub stt_fallback_ms: u64,
    pub stt_extended_ms: u64,
    pub voice_debug: bool,
    pub voice_autostart: bool,
    pub max_socket_failures: u32,
    pub session_ack_timeout_ms: u64,
    pub adaptive_vad_enabled: bool,
    pub debug_backlog_capacity: usize,
    pub backend_relay_enabled: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_enabled: true,
            sps_enabled: true,
            stt_fallback_ms: 800,
            stt_extended_ms: 1800,
            voice_debug: false,
            voice_autostart: false,
            max_socket_failures: 3,
            session_ack_timeout_ms: 5000,
            adaptive_vad_enabled: true,
            debug_backlog_capacity: 500,
            backend_relay_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = VoiceConfig::default();
        assert!(cfg.voice_enabled);
        assert_eq!(cfg.stt_fallback_ms, 800);
        assert_eq!(cfg.stt_extended_ms, 1800);
        assert_eq!(cfg.max_socket_failures, 3);
        assert_eq!(cfg.session_ack_timeout_ms, 5000);
        assert_eq!(cfg.debug_backlog_capacity, 500);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_with_defaults() {
        let cfg: VoiceConfig = toml_like_from_json(r#"{"voice_debug": true}"#);
        assert!(cfg.voice_debug);
        assert_eq!(cfg.stt_fallback_ms, 800);
    }

    fn toml_like_from_json(json: &str) -> VoiceConfig {
        serde_json::from_str(json).unwrap()
    }
}
