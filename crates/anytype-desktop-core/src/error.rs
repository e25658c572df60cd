//! Error taxonomy shared by every lifecycle component.
//!
//! Startup failures ([`ShellError::BackendLaunch`], [`ShellError::BackendTimeout`],
//! [`ShellError::MissingServerPort`], [`ShellError::InstanceLock`]) are fatal and end
//! the process with a non-zero code. Steady-state failures such as
//! [`ShellError::ConfigPersist`] are returned to the caller and the lifecycle carries
//! on. [`ShellError::BackendStop`] is only ever logged.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to launch backend {executable}: {reason}")]
    BackendLaunch { executable: String, reason: String },

    #[error("backend did not become ready within {}ms", .0.as_millis())]
    BackendTimeout(Duration),

    #[error("failed to persist config {}: {reason}", .path.display())]
    ConfigPersist { path: PathBuf, reason: String },

    #[error("failed to stop backend: {0}")]
    BackendStop(String),

    #[error("{0} must be set when running a development build")]
    MissingServerPort(&'static str),

    #[error("single-instance lock unavailable: {0}")]
    InstanceLock(String),

    #[error("invalid backend launch plan: {0}")]
    InvalidLaunchPlan(String),

    #[error("main window error: {0}")]
    Window(String),

    #[error("failed to relaunch: {0}")]
    Relaunch(String),

    #[error("lifecycle controller is no longer running")]
    ControllerGone,
}

impl ShellError {
    pub(crate) fn launch(executable: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendLaunch {
            executable: executable.into(),
            reason: reason.into(),
        }
    }
}

/// Reasons a deep link is dropped. Never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeepLinkError {
    #[error("url does not use the {0}:// scheme")]
    ForeignScheme(String),

    #[error("malformed deep link: {0}")]
    Malformed(String),
}

pub type ShellResult<T> = Result<T, ShellError>;
