use std::{env, process::Command};

use desktop_core::{AppSurface, ExitSource, ShellError, ShellResult};
use tauri::{AppHandle, Manager, RunEvent};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};
use tracing::{info, warn};

use crate::AppState;

/// Process-level operations backed by the Tauri app handle.
pub(crate) struct TauriApp {
    app_handle: AppHandle,
}

impl TauriApp {
    pub(crate) fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

impl AppSurface for TauriApp {
    fn show_fatal_error(&mut self, title: &str, message: &str) {
        self.app_handle
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .blocking_show();
    }

    fn terminate(&mut self, code: i32) {
        self.app_handle.exit(code);
    }

    fn relaunch(&mut self) -> ShellResult<()> {
        let executable = env::current_exe()
            .map_err(|error| ShellError::Relaunch(format!("cannot locate executable: {error}")))?;
        Command::new(&executable)
            .spawn()
            .map(|child| info!(pid = child.id(), "spawned relaunched instance"))
            .map_err(|error| {
                ShellError::Relaunch(format!("failed to spawn {}: {error}", executable.display()))
            })
    }
}

pub(crate) fn handle_run_event(app_handle: &AppHandle, event: RunEvent) {
    match event {
        RunEvent::ExitRequested { code, api, .. } => {
            let Some(state) = app_handle.try_state::<AppState>() else {
                return;
            };
            // Explicit exit codes come from our own terminate().
            if code.is_some() || state.lifecycle.is_quitting() {
                return;
            }

            api.prevent_exit();
            if !state.lifecycle.exit(false, ExitSource::OsQuit) {
                warn!("exit requested after lifecycle controller stopped");
            }
        }
        RunEvent::Exit => {
            if let Some(state) = app_handle.try_state::<AppState>() {
                tauri::async_runtime::block_on(state.supervisor.stop());
            }
        }
        #[cfg(target_os = "macos")]
        RunEvent::Reopen { .. } => {
            if let Some(state) = app_handle.try_state::<AppState>() {
                state
                    .lifecycle
                    .dispatch(desktop_core::LifecycleEvent::Activate);
            }
        }
        _ => {}
    }
}
