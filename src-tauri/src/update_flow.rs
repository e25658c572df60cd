use std::time::Instant;

use desktop_core::{
    app_constants::CONFIG_CHANNEL_KEY, update_coordinator::default_channel_for, LifecycleEvent,
    LifecycleHandle,
};
use tauri::AppHandle;
use tauri_plugin_updater::UpdaterExt;
use tracing::{info, warn};

const UPDATE_CHANNEL_HEADER: &str = "X-Update-Channel";

/// Silent startup check. A found update is downloaded and installed in the
/// background; the UI is told with `update-ready` and decides when to
/// relaunch via `desktop_bridge_update_confirm`.
pub(crate) fn spawn_startup_update_check(app_handle: AppHandle, lifecycle: LifecycleHandle) {
    tauri::async_runtime::spawn(async move {
        let current_version = app_handle.package_info().version.to_string();
        let channel = match lifecycle.get_config().await {
            Ok(config) => config
                .get(CONFIG_CHANNEL_KEY)
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| default_channel_for(&current_version)),
            Err(error) => {
                warn!(%error, "skipping update check");
                return;
            }
        };

        let updater = match app_handle
            .updater_builder()
            .header(UPDATE_CHANNEL_HEADER, channel.as_str())
            .and_then(|builder| builder.build())
        {
            Ok(updater) => updater,
            Err(error) => {
                warn!(%error, "failed to initialize updater");
                return;
            }
        };

        info!(%current_version, %channel, "checking for updates");
        let check_started = Instant::now();
        let update = match updater.check().await {
            Ok(Some(update)) => update,
            Ok(None) => {
                info!(
                    %current_version,
                    elapsed_ms = check_started.elapsed().as_millis() as u64,
                    "no update available"
                );
                return;
            }
            Err(error) => {
                // First installs have no manifest to compare against.
                info!(
                    %current_version,
                    elapsed_ms = check_started.elapsed().as_millis() as u64,
                    %error,
                    "update check failed"
                );
                return;
            }
        };

        let new_version = update.version.to_string();
        info!(%current_version, %new_version, "update found; downloading");
        lifecycle.dispatch(LifecycleEvent::UpdateStarted);

        let installed_version = match update.download_and_install(|_, _| {}, || {}).await {
            Ok(()) => {
                info!(%new_version, "update installed");
                Some(new_version)
            }
            Err(error) => {
                warn!(%new_version, %error, "failed to install update");
                None
            }
        };
        lifecycle.dispatch(LifecycleEvent::UpdateFinished { installed_version });
    });
}
