//! Plugin state management for the voice controller.

use std::sync::Arc;

use tokio::sync::RwLock;
use voice_domain::VoiceConfig;
use voice_session::VoiceController;
use voice_storage::TranscriptSink;

use crate::error::{Result, VoiceCommandError};

/// Application state for the voice plugin. Holds at most one live
/// `VoiceController`; `start` replaces it, `stop` clears it.
pub struct VoiceState {
    base_url: RwLock<String>,
    config: RwLock<VoiceConfig>,
    controller: RwLock<Option<Arc<VoiceController>>>,
    sink: RwLock<Option<Arc<dyn TranscriptSink>>>,
}

impl Default for VoiceState {
    fn default() -> Self {
        Self {
            base_url: RwLock::new(String::new()),
            config: RwLock::new(VoiceConfig::default()),
            controller: RwLock::new(None),
            sink: RwLock::new(None),
        }
    }
}

impl VoiceState {
    pub fn new(base_url: impl Into<String>, config: VoiceConfig) -> Self {
        Self {
            base_url: RwLock::new(base_url.into()),
            config: RwLock::new(config),
            controller: RwLock::new(None),
            sink: RwLock::new(None),
        }
    }

    pub async fn base_url(&self) -> String {
        self.base_url.read().await.clone()
    }

    pub async fn config(&self) -> VoiceConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: VoiceConfig) {
        *self.config.write().await = config;
    }

    pub async fn controller(&self) -> Option<Arc<VoiceController>> {
        self.controller.read().await.clone()
    }

    pub async fn require_controller(&self) -> Result<Arc<VoiceController>> {
        self.controller().await.ok_or(VoiceCommandError::NotStarted)
    }

    pub async fn set_controller(&self, controller: Arc<VoiceController>) {
        *self.controller.write().await = Some(controller);
    }

    pub async fn clear_controller(&self) {
        *self.controller.write().await = None;
    }

    /// Set once the plugin resolves the app data directory during setup;
    /// absent until then, so an encounter started very early just runs
    /// without local persistence rather than failing.
    pub async fn set_sink(&self, sink: Arc<dyn TranscriptSink>) {
        *self.sink.write().await = Some(sink);
    }

    pub async fn sink(&self) -> Option<Arc<dyn TranscriptSink>> {
        self.sink.read().await.clone()
    }
}
