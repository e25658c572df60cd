//! One running shell per user.
//!
//! The first process binds a local socket keyed by the application id. Later
//! processes connect to it, forward their command line as one JSON line and
//! read back `ok` (handled, exit now) or `busy` (the holder is shutting down;
//! wait for it to let go and take over).

use std::{
    env, fs,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use interprocess::local_socket::{
    traits::{Listener as _, Stream as _},
    GenericFilePath, GenericNamespaced, Listener, ListenerNonblockingMode, ListenerOptions, Name,
    Stream, ToFsName, ToNsName,
};
use tracing::{debug, info, warn};

use crate::{
    app_constants::{INSTANCE_POLL_INTERVAL, INSTANCE_RELEASE_WAIT},
    ShellError, ShellResult,
};

const REPLY_OK: &str = "ok";
const REPLY_BUSY: &str = "busy";

type ForwardHandler = Arc<dyn Fn(Vec<String>) -> bool + Send + Sync>;

#[derive(Debug)]
pub enum InstanceRole {
    /// This process holds the lock until the guard is released.
    Primary(InstanceGuard),
    /// Another instance took the invocation; exit without starting anything.
    Secondary,
}

enum ForwardAttempt {
    Accepted,
    Busy,
    NoHolder,
}

#[derive(Debug, Clone)]
pub struct InstanceGate {
    key: String,
    socket_file: Option<PathBuf>,
}

impl InstanceGate {
    pub fn new(app_id: &str) -> Self {
        Self::with_key(format!("{app_id}.instance.sock"))
    }

    /// Abstract namespace on Linux and named pipes on Windows vanish with the
    /// process. Elsewhere the socket is a file in the temp dir that a crash
    /// leaves behind, so it is tracked and cleared before binding.
    pub fn with_key(key: impl Into<String>) -> Self {
        let key = key.into();
        if cfg!(any(target_os = "linux", target_os = "android", windows)) {
            Self {
                key,
                socket_file: None,
            }
        } else {
            let path = env::temp_dir().join(&key);
            Self::at_path(path)
        }
    }

    /// Gate on an explicit socket file.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            key: path.display().to_string(),
            socket_file: Some(path),
        }
    }

    pub fn acquire<F>(&self, args: &[String], on_forward: F) -> ShellResult<InstanceRole>
    where
        F: Fn(Vec<String>) -> bool + Send + Sync + 'static,
    {
        let on_forward: ForwardHandler = Arc::new(on_forward);
        let deadline = Instant::now() + INSTANCE_RELEASE_WAIT;
        let mut announced_wait = false;

        loop {
            match self.forward(args) {
                ForwardAttempt::Accepted => {
                    info!("another instance is running; forwarded invocation");
                    return Ok(InstanceRole::Secondary);
                }
                ForwardAttempt::Busy => {
                    if !announced_wait {
                        info!("running instance is shutting down; waiting for it to exit");
                        announced_wait = true;
                    }
                }
                ForwardAttempt::NoHolder => match self.bind(on_forward.clone()) {
                    Ok(guard) => return Ok(InstanceRole::Primary(guard)),
                    Err(error) if error.kind() == io::ErrorKind::AddrInUse => {
                        debug!("instance socket taken concurrently; retrying");
                    }
                    Err(error) => {
                        return Err(ShellError::InstanceLock(format!(
                            "failed to bind {}: {error}",
                            self.key
                        )));
                    }
                },
            }

            if Instant::now() >= deadline {
                return Err(ShellError::InstanceLock(format!(
                    "running instance did not release {} within {}s",
                    self.key,
                    INSTANCE_RELEASE_WAIT.as_secs()
                )));
            }
            thread::sleep(INSTANCE_POLL_INTERVAL);
        }
    }

    fn name(&self) -> io::Result<Name<'_>> {
        match &self.socket_file {
            Some(path) => path.as_path().to_fs_name::<GenericFilePath>(),
            None => self.key.as_str().to_ns_name::<GenericNamespaced>(),
        }
    }

    fn forward(&self, args: &[String]) -> ForwardAttempt {
        let stream = match self.name().and_then(Stream::connect) {
            Ok(stream) => stream,
            Err(error) => {
                debug!(%error, "no running instance answered");
                return ForwardAttempt::NoHolder;
            }
        };

        match exchange(stream, args) {
            Ok(reply) if reply == REPLY_OK => ForwardAttempt::Accepted,
            Ok(reply) if reply == REPLY_BUSY => ForwardAttempt::Busy,
            Ok(reply) => {
                warn!(%reply, "unexpected reply from running instance");
                ForwardAttempt::Busy
            }
            Err(error) => {
                debug!(%error, "running instance dropped the connection");
                ForwardAttempt::Busy
            }
        }
    }

    /// Only called after a connect attempt found nobody listening, so an
    /// existing socket file belongs to a holder that died without cleanup.
    fn bind(&self, on_forward: ForwardHandler) -> io::Result<InstanceGuard> {
        if let Some(path) = &self.socket_file {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed stale instance socket"),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(error),
            }
        }

        let listener = ListenerOptions::new()
            .name(self.name()?)
            .nonblocking(ListenerNonblockingMode::Accept)
            .create_sync()?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("instance-listener".to_string())
                .spawn(move || accept_loop(listener, stop, on_forward))?
        };

        info!(key = %self.key, "acquired single-instance lock");
        Ok(InstanceGuard {
            stop,
            worker: Some(worker),
            socket_file: self.socket_file.clone(),
        })
    }
}

fn exchange(stream: Stream, args: &[String]) -> io::Result<String> {
    let mut payload = serde_json::to_string(args)?;
    payload.push('\n');

    let mut reader = BufReader::new(stream);
    reader.get_mut().write_all(payload.as_bytes())?;
    reader.get_mut().flush()?;

    let mut reply = String::new();
    reader.read_line(&mut reply)?;
    Ok(reply.trim().to_string())
}

fn accept_loop(listener: Listener, stop: Arc<AtomicBool>, on_forward: ForwardHandler) {
    while !stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok(stream) => {
                let on_forward = on_forward.clone();
                thread::spawn(move || {
                    if let Err(error) = answer(stream, &on_forward) {
                        debug!(%error, "failed to answer forwarded invocation");
                    }
                });
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(INSTANCE_POLL_INTERVAL);
            }
            Err(error) => {
                warn!(%error, "instance listener accept failed");
                thread::sleep(INSTANCE_POLL_INTERVAL);
            }
        }
    }
    debug!("instance listener stopped");
}

fn answer(stream: Stream, on_forward: &ForwardHandler) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let args: Vec<String> = serde_json::from_str(line.trim()).unwrap_or_else(|error| {
        debug!(%error, "forwarded invocation is not a JSON array");
        Vec::new()
    });
    let reply = if on_forward(args) { REPLY_OK } else { REPLY_BUSY };

    let stream = reader.get_mut();
    stream.write_all(reply.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()
}

/// Held by the primary instance. Releasing is idempotent; dropping releases.
pub struct InstanceGuard {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    socket_file: Option<PathBuf>,
}

impl InstanceGuard {
    pub fn release(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        if worker.join().is_err() {
            warn!("instance listener thread panicked");
        }
        if let Some(path) = &self.socket_file {
            if let Err(error) = fs::remove_file(path) {
                if error.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %error, "failed to remove instance socket");
                }
            }
        }
        info!("released single-instance lock");
    }

    pub fn is_released(&self) -> bool {
        self.worker.is_none()
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for InstanceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceGuard")
            .field("released", &self.is_released())
            .field("socket_file", &self.socket_file)
            .finish()
    }
}
