use std::sync::Arc;

use desktop_core::{BackendSupervisor, LifecycleHandle};

/// Managed state shared by commands and toolkit callbacks.
pub(crate) struct AppState {
    pub(crate) lifecycle: LifecycleHandle,
    pub(crate) supervisor: Arc<BackendSupervisor>,
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct BridgeResult {
    pub(crate) ok: bool,
    pub(crate) reason: Option<String>,
}

impl BridgeResult {
    pub(crate) fn from_dispatch(accepted: bool) -> Self {
        if accepted {
            Self {
                ok: true,
                reason: None,
            }
        } else {
            Self {
                ok: false,
                reason: Some("Desktop shell is shutting down.".to_string()),
            }
        }
    }
}
