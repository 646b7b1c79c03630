mod commands;
mod dto;
mod error;
mod state;

pub use error::{Result, VoiceCommandError};
pub use state::VoiceState;

use std::sync::Arc;

use tauri::{
    plugin::{Builder, TauriPlugin},
    Manager, Runtime,
};
use voice_domain::VoiceConfig;
use voice_storage::SqliteTranscriptStore;

/// Builds the plugin with a realtime service base URL and starting
/// configuration. The desktop app supplies both at startup; the plugin
/// itself never reads environment variables or config files directly.
pub fn init<R: Runtime>(base_url: impl Into<String>, config: VoiceConfig) -> TauriPlugin<R> {
    let base_url = base_url.into();
    Builder::new("voice-controller")
        .setup(move |app, _api| {
            let state = Arc::new(VoiceState::new(base_url.clone(), config.clone()));
            app.manage(Arc::clone(&state));

            // Resolve the app data directory and open the local transcript
            // store off the setup path, the same way the dictation plugin
            // defers its database init until the app handle is available.
            let app_handle = app.clone();
            tauri::async_runtime::spawn(async move {
                match app_handle.path().app_data_dir() {
                    Ok(dir) => {
                        if let Err(e) = std::fs::create_dir_all(&dir) {
                            tracing::error!("failed to create app data dir: {e}");
                            return;
                        }
                        match SqliteTranscriptStore::open(&dir.join("voice-transcripts.db")) {
                            Ok(store) => state.set_sink(Arc::new(store)).await,
                            Err(e) => tracing::error!("failed to open transcript store: {e}"),
                        }
                    }
                    Err(e) => tracing::error!("failed to resolve app data dir: {e}"),
                }
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::start_encounter,
            commands::stop_encounter,
            commands::pause_voice,
            commands::resume_voice,
            commands::send_text,
            commands::update_encounter_state,
            commands::refresh_instructions,
            commands::voice_snapshot,
            commands::set_voice_config,
        ])
        .build()
}
