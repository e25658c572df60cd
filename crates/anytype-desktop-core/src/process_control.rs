/// Ask the process to shut down cleanly. The caller still has to wait for
/// the exit and escalate if it does not happen.
#[cfg(unix)]
pub(crate) fn request_graceful_exit(pid: u32) -> Result<(), String> {
    use nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    };

    let raw_pid = i32::try_from(pid).map_err(|_| format!("pid {pid} out of range"))?;
    kill(Pid::from_raw(raw_pid), Signal::SIGTERM)
        .map_err(|error| format!("failed to send SIGTERM to {pid}: {error}"))
}

#[cfg(target_os = "windows")]
pub(crate) fn request_graceful_exit(pid: u32) -> Result<(), String> {
    use std::{
        os::windows::process::CommandExt,
        process::{Command, Stdio},
    };

    use crate::app_constants::CREATE_NO_WINDOW;

    let status = Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/t"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()
        .map_err(|error| format!("failed to run taskkill for {pid}: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("taskkill for {pid} exited with {status}"))
    }
}

#[cfg(not(any(unix, target_os = "windows")))]
pub(crate) fn request_graceful_exit(pid: u32) -> Result<(), String> {
    Err(format!(
        "graceful termination of {pid} is not supported on this platform"
    ))
}
