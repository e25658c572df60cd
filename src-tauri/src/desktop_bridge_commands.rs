use desktop_core::{BackendProcessHandle, ConfigMap, ExitSource, LifecycleEvent};
use tauri::{AppHandle, Manager};

use crate::{AppState, BridgeResult};

#[tauri::command]
pub(crate) fn desktop_bridge_is_desktop_runtime() -> bool {
    true
}

#[tauri::command]
pub(crate) fn desktop_bridge_exit(app_handle: AppHandle, relaunch: Option<bool>) -> BridgeResult {
    let state = app_handle.state::<AppState>();
    BridgeResult::from_dispatch(
        state
            .lifecycle
            .exit(relaunch.unwrap_or(false), ExitSource::Ui),
    )
}

#[tauri::command]
pub(crate) fn desktop_bridge_shutdown(
    app_handle: AppHandle,
    relaunch: Option<bool>,
) -> BridgeResult {
    let state = app_handle.state::<AppState>();
    BridgeResult::from_dispatch(
        state
            .lifecycle
            .exit(relaunch.unwrap_or(false), ExitSource::UiShutdown),
    )
}

/// The UI confirmed a downloaded update: always relaunch into it.
#[tauri::command]
pub(crate) fn desktop_bridge_update_confirm(app_handle: AppHandle) -> BridgeResult {
    let state = app_handle.state::<AppState>();
    BridgeResult::from_dispatch(state.lifecycle.exit(true, ExitSource::UpdateConfirm))
}

#[tauri::command]
pub(crate) async fn desktop_bridge_get_config(app_handle: AppHandle) -> Result<ConfigMap, String> {
    let lifecycle = app_handle.state::<AppState>().lifecycle.clone();
    lifecycle
        .get_config()
        .await
        .map_err(|error| error.to_string())
}

#[tauri::command]
pub(crate) async fn desktop_bridge_set_config(
    app_handle: AppHandle,
    patch: ConfigMap,
) -> Result<ConfigMap, String> {
    let lifecycle = app_handle.state::<AppState>().lifecycle.clone();
    lifecycle
        .set_config(patch)
        .await
        .map_err(|error| error.to_string())
}

#[tauri::command]
pub(crate) fn desktop_bridge_set_channel(app_handle: AppHandle, channel: String) -> BridgeResult {
    let channel = channel.trim();
    if channel.is_empty() {
        return BridgeResult {
            ok: false,
            reason: Some("Missing update channel.".to_string()),
        };
    }

    let state = app_handle.state::<AppState>();
    BridgeResult::from_dispatch(
        state
            .lifecycle
            .dispatch(LifecycleEvent::SetChannel(channel.to_string())),
    )
}

#[tauri::command]
pub(crate) fn desktop_bridge_get_backend_state(app_handle: AppHandle) -> BackendProcessHandle {
    app_handle.state::<AppState>().supervisor.handle()
}
