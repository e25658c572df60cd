//! Spawns the backend server (or attaches to an external one), waits until it
//! announces its address, and tears it down again.
//!
//! `start()` and `stop()` are never run concurrently for the same supervisor;
//! the lifecycle controller only stops after start has settled. `stop()` may be
//! called any number of times from anywhere: concurrent calls share a single
//! termination sequence.

use std::{
    io,
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, OnceLock, PoisonError,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::{oneshot, OnceCell},
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    app_constants::{
        BACKEND_GRACEFUL_STOP_TIMEOUT, BACKEND_PING_TIMEOUT, DEFAULT_BACKEND_READY_TIMEOUT,
    },
    backend_readiness::{ping_backend, ReadinessProbe},
    process_control, BackendAddress, LaunchPlan, ShellError, ShellResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendStatus {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

/// Point-in-time view of the supervised backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendProcessHandle {
    pub executable_path: PathBuf,
    pub working_dir: PathBuf,
    pub pid: Option<u32>,
    pub address: Option<BackendAddress>,
    pub status: BackendStatus,
}

#[derive(Debug)]
struct ProcessSlot {
    status: BackendStatus,
    pid: Option<u32>,
    child: Option<Child>,
}

type ReadySender = oneshot::Sender<Result<BackendAddress, String>>;

#[derive(Debug)]
pub struct BackendSupervisor {
    plan: LaunchPlan,
    override_address: Option<String>,
    probe: ReadinessProbe,
    ready_timeout: Duration,
    grace_period: Duration,
    slot: Mutex<ProcessSlot>,
    address: OnceLock<BackendAddress>,
    stop_once: OnceCell<()>,
    terminations: AtomicUsize,
}

impl BackendSupervisor {
    pub fn new(plan: LaunchPlan) -> Self {
        Self {
            plan,
            override_address: None,
            probe: ReadinessProbe::default(),
            ready_timeout: DEFAULT_BACKEND_READY_TIMEOUT,
            grace_period: BACKEND_GRACEFUL_STOP_TIMEOUT,
            slot: Mutex::new(ProcessSlot {
                status: BackendStatus::NotStarted,
                pid: None,
                child: None,
            }),
            address: OnceLock::new(),
            stop_once: OnceCell::new(),
            terminations: AtomicUsize::new(0),
        }
    }

    pub fn with_override_address(mut self, address: Option<String>) -> Self {
        self.override_address = address;
        self
    }

    pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn status(&self) -> BackendStatus {
        self.slot().status
    }

    /// Only `Some` once the backend is `Ready`; callers must await `start()`.
    pub fn address(&self) -> Option<BackendAddress> {
        self.address.get().cloned()
    }

    pub fn handle(&self) -> BackendProcessHandle {
        let slot = self.slot();
        BackendProcessHandle {
            executable_path: self.plan.cmd.clone(),
            working_dir: self.plan.cwd.clone(),
            pid: slot.pid,
            address: self.address(),
            status: slot.status,
        }
    }

    pub async fn start(&self) -> ShellResult<BackendAddress> {
        if let Some(raw) = self.override_address.as_deref() {
            return self.attach(raw);
        }

        {
            let mut slot = self.slot();
            if slot.status != BackendStatus::NotStarted {
                return Err(ShellError::launch(
                    self.executable(),
                    format!("backend already started (status {:?})", slot.status),
                ));
            }
            slot.status = BackendStatus::Starting;
        }

        let mut command = Command::new(&self.plan.cmd);
        command
            .args(&self.plan.args)
            .current_dir(&self.plan.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(target_os = "windows")]
        command.creation_flags(crate::app_constants::CREATE_NO_WINDOW);

        info!(
            command = ?self.plan.debug_command(),
            cwd = %self.plan.cwd.display(),
            "spawning backend"
        );
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                self.set_status(BackendStatus::Failed);
                return Err(ShellError::launch(self.executable(), error.to_string()));
            }
        };

        let pid = child.id();
        let (ready_tx, ready_rx) = oneshot::channel();
        let announce_to = self.probe.reads_announcement().then_some(ready_tx);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, self.probe.clone(), announce_to));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, self.probe.clone(), None));
        }

        {
            let mut slot = self.slot();
            slot.pid = pid;
            slot.child = Some(child);
        }

        let readiness = async {
            match &self.probe {
                ReadinessProbe::Announcement { .. } => ready_rx.await.unwrap_or_else(|_| {
                    Err("backend closed its output before announcing an address".to_string())
                }),
                ReadinessProbe::HealthCheck { address, interval } => {
                    self.poll_until_reachable(address, *interval).await
                }
            }
        };

        match timeout(self.ready_timeout, readiness).await {
            Ok(Ok(address)) => {
                let _ = self.address.set(address.clone());
                self.set_status(BackendStatus::Ready);
                info!(%address, ?pid, "backend ready");
                Ok(address)
            }
            Ok(Err(reason)) => {
                self.abandon_child().await;
                self.set_status(BackendStatus::Failed);
                Err(ShellError::launch(self.executable(), reason))
            }
            Err(_) => {
                self.abandon_child().await;
                self.set_status(BackendStatus::Failed);
                Err(ShellError::BackendTimeout(self.ready_timeout))
            }
        }
    }

    /// Gracefully stop the backend. Never fails; problems are logged.
    pub async fn stop(&self) {
        match self.status() {
            BackendStatus::NotStarted | BackendStatus::Stopped => {
                debug!("backend stop skipped: nothing running");
            }
            _ => {
                self.stop_once.get_or_init(|| self.terminate()).await;
            }
        }
    }

    #[cfg(test)]
    fn termination_count(&self) -> usize {
        self.terminations.load(Ordering::Acquire)
    }

    fn attach(&self, raw: &str) -> ShellResult<BackendAddress> {
        let address = raw.parse::<BackendAddress>().map_err(|error| {
            self.set_status(BackendStatus::Failed);
            ShellError::launch(raw, error.to_string())
        })?;
        let _ = self.address.set(address.clone());
        self.set_status(BackendStatus::Ready);
        info!(%address, "using externally started backend");
        Ok(address)
    }

    async fn poll_until_reachable(
        &self,
        address: &BackendAddress,
        interval: Duration,
    ) -> Result<BackendAddress, String> {
        loop {
            if ping_backend(address, BACKEND_PING_TIMEOUT).await {
                return Ok(address.clone());
            }

            {
                let mut slot = self.slot();
                let Some(child) = slot.child.as_mut() else {
                    return Err("backend process is not running".to_string());
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        return Err(format!(
                            "backend exited before becoming reachable: {status}"
                        ));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        return Err(format!("failed to poll backend process status: {error}"));
                    }
                }
            }

            sleep(interval).await;
        }
    }

    async fn abandon_child(&self) {
        let child = self.slot().child.take();
        if let Some(mut child) = child {
            if let Err(error) = child.kill().await {
                debug!(%error, "failed to kill backend after failed start");
            }
        }
    }

    async fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::AcqRel);
        let child = {
            let mut slot = self.slot();
            slot.status = BackendStatus::Stopping;
            slot.child.take()
        };

        match child {
            Some(child) => self.shutdown_child(child).await,
            None => debug!("no backend child to stop"),
        }

        self.set_status(BackendStatus::Stopped);
        info!("backend stopped");
    }

    async fn shutdown_child(&self, mut child: Child) {
        let Some(pid) = child.id() else {
            debug!("backend already exited before shutdown");
            return;
        };

        info!(pid, "requesting graceful backend shutdown");
        if let Err(reason) = process_control::request_graceful_exit(pid) {
            let error = ShellError::BackendStop(reason);
            warn!(pid, %error, "graceful stop request failed");
        }

        match timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => info!(pid, %status, "backend exited"),
            Ok(Err(error)) => {
                let error = ShellError::BackendStop(error.to_string());
                warn!(pid, %error, "failed to wait for backend exit");
            }
            Err(_) => {
                warn!(
                    pid,
                    grace_ms = self.grace_period.as_millis() as u64,
                    "backend ignored graceful shutdown; forcing termination"
                );
                if let Err(error) = child.kill().await {
                    let error = ShellError::BackendStop(error.to_string());
                    warn!(pid, %error, "failed to kill backend");
                }
            }
        }
    }

    fn executable(&self) -> String {
        self.plan.cmd.to_string_lossy().to_string()
    }

    fn set_status(&self, status: BackendStatus) {
        self.slot().status = status;
    }

    fn slot(&self) -> MutexGuard<'_, ProcessSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Re-log backend output and, for stdout, report the announced address.
/// Drains the stream until EOF so the backend never blocks on a full pipe.
async fn forward_output<R>(
    stream: R,
    probe: ReadinessProbe,
    mut announce_to: Option<ReadySender>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                info!(target: "backend", "{line}");
                if announce_to.is_some() {
                    if let Some(address) = probe.address_from_line(line) {
                        if let Some(sender) = announce_to.take() {
                            let _ = sender.send(Ok(address));
                        }
                    }
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                debug!(%error, "backend output stream failed");
                break;
            }
        }
    }

    if let Some(sender) = announce_to.take() {
        let _ = sender.send(Err("backend exited before announcing an address".to_string()));
    }
}
