#[cfg(debug_assertions)]
use tauri::Manager;
use tracing_subscriber::EnvFilter;
use voice_domain::VoiceConfig;

const DEFAULT_VOICE_SERVICE_URL: &str = "http://127.0.0.1:8787";

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,voice_session=debug"))
        )
        .init();

    tracing::info!("Starting standardized-patient voice desktop app");

    let base_url =
        std::env::var("VOICE_SERVICE_URL").unwrap_or_else(|_| DEFAULT_VOICE_SERVICE_URL.to_string());

    tauri::Builder::default()
        .plugin(tauri_plugin_voice_controller::init(base_url, VoiceConfig::default()))
        .setup(|_app| {
            #[cfg(debug_assertions)]
            {
                let window = _app.get_webview_window("main").unwrap();
                window.open_devtools();
            }
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
