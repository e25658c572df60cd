use std::{env, time::Duration};

use tracing::warn;

use crate::{
    app_constants::{
        BACKEND_CMD_ENV, BACKEND_HEALTH_ADDRESS_ENV, BACKEND_OVERRIDE_ENV, BACKEND_TIMEOUT_ENV,
        DEFAULT_BACKEND_READY_TIMEOUT, LEGACY_BACKEND_OVERRIDE_ENV, SERVER_PORT_ENV,
    },
    BackendAddress, ReadinessProbe, ShellError, ShellResult,
};

/// Process environment as read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellEnv {
    pub development: bool,
    /// Address of an externally started backend; when present nothing is spawned.
    pub backend_override: Option<String>,
    /// Dev server port for the UI bundle. Required in development builds.
    pub server_port: Option<u16>,
    /// Shell-quoted replacement for the bundled backend command line.
    pub backend_command: Option<String>,
    /// Known listen address of a backend that does not announce itself.
    pub backend_health_address: Option<String>,
    pub backend_ready_timeout: Duration,
}

impl Default for ShellEnv {
    fn default() -> Self {
        Self {
            development: false,
            backend_override: None,
            server_port: None,
            backend_command: None,
            backend_health_address: None,
            backend_ready_timeout: DEFAULT_BACKEND_READY_TIMEOUT,
        }
    }
}

impl ShellEnv {
    pub fn from_process(development: bool) -> Self {
        Self::from_lookup(development, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(development: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let backend_ready_timeout = non_empty(BACKEND_TIMEOUT_ENV)
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BACKEND_READY_TIMEOUT);

        Self {
            development,
            backend_override: non_empty(BACKEND_OVERRIDE_ENV)
                .or_else(|| non_empty(LEGACY_BACKEND_OVERRIDE_ENV)),
            server_port: non_empty(SERVER_PORT_ENV).and_then(|value| value.parse::<u16>().ok()),
            backend_command: non_empty(BACKEND_CMD_ENV),
            backend_health_address: non_empty(BACKEND_HEALTH_ADDRESS_ENV),
            backend_ready_timeout,
        }
    }

    /// Fails when a development build has no UI dev server to load.
    pub fn check_startup_requirements(&self) -> ShellResult<()> {
        if self.development && self.server_port.is_none() {
            return Err(ShellError::MissingServerPort(SERVER_PORT_ENV));
        }
        Ok(())
    }

    /// Poll the configured address when one is set, otherwise wait for the
    /// backend to announce where it listens.
    pub fn readiness_probe(&self) -> ReadinessProbe {
        let Some(raw) = self.backend_health_address.as_deref() else {
            return ReadinessProbe::default();
        };
        match raw.parse::<BackendAddress>() {
            Ok(address) => ReadinessProbe::health_check(address),
            Err(error) => {
                warn!(address = raw, %error, "ignoring invalid backend health address");
                ReadinessProbe::default()
            }
        }
    }
}
