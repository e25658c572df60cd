use std::path::{Path, PathBuf};

use crate::{app_constants::BACKEND_EXECUTABLE_NAME, ShellEnv, ShellError, ShellResult};

/// Everything needed to spawn the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub cmd: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl LaunchPlan {
    /// The bundled backend: receives the working directory both as its only
    /// argument and as its cwd.
    pub fn for_executable(executable: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        let cwd = work_dir.into();
        Self {
            cmd: executable.into(),
            args: vec![cwd.to_string_lossy().to_string()],
            cwd,
        }
    }

    pub fn from_custom_command(
        custom_cmd: &str,
        work_dir: impl Into<PathBuf>,
    ) -> ShellResult<Self> {
        let mut pieces = shlex::split(custom_cmd).ok_or_else(|| {
            ShellError::InvalidLaunchPlan(format!("cannot parse backend command: {custom_cmd}"))
        })?;
        if pieces.is_empty() {
            return Err(ShellError::InvalidLaunchPlan("backend command is empty".to_string()));
        }

        let cmd = pieces.remove(0);
        Ok(Self {
            cmd: PathBuf::from(cmd),
            args: pieces,
            cwd: work_dir.into(),
        })
    }

    /// Custom command from the environment wins over the bundled executable.
    pub fn resolve(
        env: &ShellEnv,
        bundled_executable: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> ShellResult<Self> {
        match env.backend_command.as_deref() {
            Some(custom_cmd) => Self::from_custom_command(custom_cmd, work_dir),
            None => Ok(Self::for_executable(bundled_executable, work_dir)),
        }
    }

    pub fn debug_command(&self) -> Vec<String> {
        let mut parts = vec![self.cmd.to_string_lossy().to_string()];
        parts.extend(self.args.iter().cloned());
        parts
    }
}

/// Location of the backend binary inside the bundled resources.
pub fn bundled_backend_path(resource_dir: &Path) -> PathBuf {
    let file_name = if cfg!(target_os = "windows") {
        format!("{BACKEND_EXECUTABLE_NAME}.exe")
    } else {
        BACKEND_EXECUTABLE_NAME.to_string()
    };
    resource_dir.join("dist").join(file_name)
}
