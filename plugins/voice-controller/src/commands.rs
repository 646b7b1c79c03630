use std::sync::Arc;

use tauri::{AppHandle, Emitter, Runtime, State};

use voice_domain::{GateFlags, VoiceConfig};
use voice_events::event_names;
use voice_session::{ControllerSnapshot, EncounterIdentity, VoiceController};

use crate::dto::StartEncounterRequest;
use crate::error::Result;
use crate::state::VoiceState;

fn bridge_events<R: Runtime>(app: &AppHandle<R>, controller: &Arc<VoiceController>) {
    let app_for_conversation = app.clone();
    controller.add_conversation_listener(Box::new(move |event| {
        let _ = app_for_conversation.emit(event_names::CONVERSATION, event);
    }));

    let app_for_debug = app.clone();
    controller.add_event_listener(Box::new(move |event| {
        let _ = app_for_debug.emit(event_names::DEBUG, event);
    }));
}

#[tauri::command]
pub async fn start_encounter<R: Runtime>(
    app: AppHandle<R>,
    state: State<'_, Arc<VoiceState>>,
    request: StartEncounterRequest,
) -> Result<()> {
    let base_url = state.base_url().await;
    let config = state.config().await;

    let identity = EncounterIdentity {
        persona_id: request.persona_id,
        scenario_id: request.scenario_id,
        audience: request.audience,
    };

    let controller = VoiceController::new(config, &base_url, identity)?;
    bridge_events(&app, &controller);
    if let Some(sink) = state.sink().await {
        controller.set_transcript_sink(sink);
    }
    state.set_controller(Arc::clone(&controller)).await;

    controller.start().await?;
    Ok(())
}

#[tauri::command]
pub async fn stop_encounter(state: State<'_, Arc<VoiceState>>) -> Result<()> {
    if let Some(controller) = state.controller().await {
        controller.stop().await;
    }
    state.clear_controller().await;
    Ok(())
}

#[tauri::command]
pub async fn pause_voice(state: State<'_, Arc<VoiceState>>) -> Result<()> {
    state.require_controller().await?.pause().await;
    Ok(())
}

#[tauri::command]
pub async fn resume_voice(state: State<'_, Arc<VoiceState>>) -> Result<()> {
    state.require_controller().await?.resume().await;
    Ok(())
}

#[tauri::command]
pub async fn send_text(state: State<'_, Arc<VoiceState>>, text: String) -> Result<()> {
    state.require_controller().await?.send_text(text).await;
    Ok(())
}

#[tauri::command]
pub async fn update_encounter_state(
    state: State<'_, Arc<VoiceState>>,
    phase: Option<String>,
    gate: Option<GateFlags>,
) -> Result<()> {
    state.require_controller().await?.update_encounter_state(phase, gate);
    Ok(())
}

#[tauri::command]
pub async fn refresh_instructions(state: State<'_, Arc<VoiceState>>, reason: Option<String>) -> Result<()> {
    state.require_controller().await?.refresh_instructions(reason.as_deref()).await;
    Ok(())
}

#[tauri::command]
pub async fn voice_snapshot(state: State<'_, Arc<VoiceState>>) -> Result<ControllerSnapshot> {
    Ok(state.require_controller().await?.snapshot())
}

#[tauri::command]
pub async fn set_voice_config(state: State<'_, Arc<VoiceState>>, config: VoiceConfig) -> Result<()> {
    state.set_config(config).await;
    Ok(())
}
