use std::time::Duration;

pub const APP_ID: &str = "io.anytype.desktop";
pub const APP_NAME: &str = "Anytype";
pub const DEEP_LINK_SCHEME: &str = "anytype";
pub const MAIN_WINDOW_LABEL: &str = "main";

pub const BACKEND_OVERRIDE_ENV: &str = "BACKEND_OVERRIDE_ADDRESS";
pub const LEGACY_BACKEND_OVERRIDE_ENV: &str = "ANYTYPE_USE_SIDE_SERVER";
pub const SERVER_PORT_ENV: &str = "SERVER_PORT";
pub const BACKEND_CMD_ENV: &str = "ANYTYPE_BACKEND_CMD";
pub const BACKEND_TIMEOUT_ENV: &str = "ANYTYPE_BACKEND_TIMEOUT_MS";
pub const BACKEND_HEALTH_ADDRESS_ENV: &str = "ANYTYPE_BACKEND_HEALTH_ADDRESS";
pub const LOG_FILTER_ENV: &str = "ANYTYPE_DESKTOP_LOG";

pub const BACKEND_EXECUTABLE_NAME: &str = "anytypeHelper";
pub const BACKEND_ANNOUNCEMENT_MARKER: &str = "gRPC server started at:";
pub const DEFAULT_BACKEND_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const BACKEND_GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub const BACKEND_READY_POLL_INTERVAL: Duration = Duration::from_millis(600);
pub const BACKEND_PING_TIMEOUT: Duration = Duration::from_millis(800);

pub const INSTANCE_RELEASE_WAIT: Duration = Duration::from_secs(15);
pub const INSTANCE_POLL_INTERVAL: Duration = Duration::from_millis(150);

pub const CONFIG_FILE: &str = "config.json";
pub const DESKTOP_LOG_FILE: &str = "desktop.log";
pub const CONFIG_CHANNEL_KEY: &str = "channel";
pub const DEFAULT_UPDATE_CHANNEL: &str = "latest";

#[cfg(target_os = "windows")]
pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;
