use serde_json::{json, Value};

use crate::{ConfigMap, Route};

/// Messages pushed from the shell to the UI. Fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub enum UiNotification {
    ShutdownStart,
    Route(Route),
    Config(ConfigMap),
    NativeTheme { dark: bool },
    UpdateReady { version: String },
}

impl UiNotification {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ShutdownStart => "shutdownStart",
            Self::Route(_) => "route",
            Self::Config(_) => "config",
            Self::NativeTheme { .. } => "native-theme",
            Self::UpdateReady { .. } => "update-ready",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::ShutdownStart => Value::Null,
            Self::Route(route) => json!({
                "path": route.path(),
                "target": route.target,
                "params": route.params,
                "url": route.raw,
            }),
            Self::Config(config) => Value::Object(config.clone()),
            Self::NativeTheme { dark } => json!({ "isDark": dark }),
            Self::UpdateReady { version } => json!({ "version": version }),
        }
    }
}
