//! The lifecycle controller: one task that owns every component and reacts to
//! [`LifecycleEvent`]s in arrival order.
//!
//! Toolkit callbacks, IPC commands, the single-instance listener and the
//! updater never touch components directly. They hold a [`LifecycleHandle`]
//! and post events. Anything that suspends (backend start, backend stop) runs
//! in its own task and reports back with another event, so the controller
//! keeps sequencing while it waits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    app_constants::CONFIG_CHANNEL_KEY,
    exit_state::{ExitDecision, ExitStateMachine, ReadyDecision},
    main_window::{WindowController, WindowOptions, WindowSurface},
    ActivateAction, AppLifecycleState, BackendAddress, BackendSupervisor, ChannelRequest,
    CloseAction, ConfigMap, ConfigStore, DeepLinkRouter, ExitIntent, ExitSource, InstanceGuard,
    PlatformPolicy, RouteOutcome, ShellEnv, ShellError, ShellResult, UiNotification,
    UpdateCoordinator,
};

const BACKEND_FAILED_TITLE: &str = "Error: failed to run server";
const WINDOW_FAILED_TITLE: &str = "Error: failed to open window";

/// Process-level operations the controller needs from the toolkit.
pub trait AppSurface: Send + 'static {
    /// Blocking error dialog shown before a fatal exit.
    fn show_fatal_error(&mut self, title: &str, message: &str);
    fn terminate(&mut self, code: i32);
    /// Start a fresh copy of the app. The caller terminates right after.
    fn relaunch(&mut self) -> ShellResult<()>;
}

#[derive(Debug)]
pub enum LifecycleEvent {
    BackendReady(BackendAddress),
    BackendFailed(ShellError),
    ExitRequested {
        relaunch: bool,
        source: ExitSource,
    },
    CloseRequested,
    WindowDestroyed,
    AllWindowsClosed,
    /// Dock icon click or equivalent.
    Activate,
    SecondInstance(Vec<String>),
    OpenUrl(String),
    ThemeChanged {
        dark: bool,
    },
    SetConfig {
        patch: ConfigMap,
        reply: Option<oneshot::Sender<ShellResult<ConfigMap>>>,
    },
    QueryConfig {
        reply: oneshot::Sender<ConfigMap>,
    },
    SetChannel(String),
    UpdateStarted,
    UpdateFinished {
        installed_version: Option<String>,
    },
    StopCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Relaunched,
}

/// Cloneable sender side of the controller.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
    quitting: Arc<AtomicBool>,
}

pub struct LifecycleEvents {
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

pub fn channel() -> (LifecycleHandle, LifecycleEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LifecycleHandle {
            tx,
            quitting: Arc::new(AtomicBool::new(false)),
        },
        LifecycleEvents { rx },
    )
}

impl LifecycleHandle {
    /// Returns `false` once the controller has finished.
    pub fn dispatch(&self, event: LifecycleEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!(?event, "lifecycle controller gone; dropping event");
                false
            }
        }
    }

    /// Set as soon as shutdown begins. Synchronous callbacks use it to decide
    /// whether to veto a close or exit.
    pub fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::Acquire)
    }

    pub fn exit(&self, relaunch: bool, source: ExitSource) -> bool {
        self.dispatch(LifecycleEvent::ExitRequested { relaunch, source })
    }

    pub async fn set_config(&self, patch: ConfigMap) -> ShellResult<ConfigMap> {
        let (reply, response) = oneshot::channel();
        if !self.dispatch(LifecycleEvent::SetConfig {
            patch,
            reply: Some(reply),
        }) {
            return Err(ShellError::ControllerGone);
        }
        response.await.map_err(|_| ShellError::ControllerGone)?
    }

    pub async fn get_config(&self) -> ShellResult<ConfigMap> {
        let (reply, response) = oneshot::channel();
        if !self.dispatch(LifecycleEvent::QueryConfig { reply }) {
            return Err(ShellError::ControllerGone);
        }
        response.await.map_err(|_| ShellError::ControllerGone)
    }

    /// Handler for invocations forwarded by a second process. A holder that
    /// is shutting down answers busy so the newcomer waits and takes over.
    pub fn accept_second_instance(&self, args: Vec<String>) -> bool {
        if self.is_quitting() {
            return false;
        }
        self.dispatch(LifecycleEvent::SecondInstance(args))
    }

    fn mark_quitting(&self) {
        self.quitting.store(true, Ordering::Release);
    }
}

/// Fatal error found before the controller could be built: dialog, then exit
/// with code 1. The dialog blocks, so callers run this off the UI thread.
pub fn fail_before_start<A: AppSurface>(app: &mut A, error: &ShellError) {
    error!(%error, "startup aborted before the backend was launched");
    app.show_fatal_error(BACKEND_FAILED_TITLE, &error.to_string());
    app.terminate(1);
}

/// Every component the controller owns.
pub struct LifecycleContext<W, A> {
    pub env: ShellEnv,
    pub config: ConfigStore,
    pub supervisor: Arc<BackendSupervisor>,
    pub window: WindowController<W>,
    pub deep_links: DeepLinkRouter,
    pub updates: UpdateCoordinator,
    pub policy: PlatformPolicy,
    pub app: A,
    pub instance: Option<InstanceGuard>,
}

pub struct LifecycleController<W, A> {
    ctx: LifecycleContext<W, A>,
    handle: LifecycleHandle,
    machine: ExitStateMachine,
    exit_code: i32,
    outcome: Option<ExitOutcome>,
}

impl<W: WindowSurface, A: AppSurface> LifecycleController<W, A> {
    pub fn new(ctx: LifecycleContext<W, A>, handle: LifecycleHandle) -> Self {
        Self {
            ctx,
            handle,
            machine: ExitStateMachine::default(),
            exit_code: 0,
            outcome: None,
        }
    }

    pub fn state(&self) -> AppLifecycleState {
        self.machine.state()
    }

    /// Start the backend and process events until the app has terminated or
    /// relaunched.
    pub async fn run(mut self, mut events: LifecycleEvents) -> ExitOutcome {
        self.start();
        while self.outcome.is_none() {
            let Some(event) = events.rx.recv().await else {
                break;
            };
            self.handle_event(event);
        }
        self.outcome.unwrap_or(ExitOutcome::Exited(self.exit_code))
    }

    fn start(&mut self) {
        if let Err(error) = self.ctx.env.check_startup_requirements() {
            error!(%error, "startup requirements not met");
            self.machine.backend_failed();
            self.ctx
                .app
                .show_fatal_error("Error: missing configuration", &error.to_string());
            self.terminate(1);
            return;
        }

        self.machine.begin_startup();
        info!(development = self.ctx.env.development, "starting backend");

        let supervisor = self.ctx.supervisor.clone();
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let event = match supervisor.start().await {
                Ok(address) => LifecycleEvent::BackendReady(address),
                Err(error) => LifecycleEvent::BackendFailed(error),
            };
            handle.dispatch(event);
        });
    }

    pub fn handle_event(&mut self, event: LifecycleEvent) {
        debug!(state = ?self.machine.state(), ?event, "lifecycle event");
        match event {
            LifecycleEvent::BackendReady(address) => self.on_backend_ready(address),
            LifecycleEvent::BackendFailed(error) => self.on_backend_failed(error),
            LifecycleEvent::ExitRequested { relaunch, source } => {
                self.request_exit(ExitIntent { relaunch, source })
            }
            LifecycleEvent::CloseRequested => self.on_close_requested(),
            LifecycleEvent::WindowDestroyed => {
                self.ctx.window.mark_destroyed();
                self.on_all_windows_closed();
            }
            LifecycleEvent::AllWindowsClosed => self.on_all_windows_closed(),
            LifecycleEvent::Activate => self.activate(),
            LifecycleEvent::SecondInstance(args) => self.on_second_instance(args),
            LifecycleEvent::OpenUrl(url) => self.open_url(&url),
            LifecycleEvent::ThemeChanged { dark } => {
                self.notify(UiNotification::NativeTheme { dark })
            }
            LifecycleEvent::SetConfig { patch, reply } => {
                let result = self.set_config(patch);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                } else if let Err(error) = result {
                    warn!(%error, "config update failed");
                }
            }
            LifecycleEvent::QueryConfig { reply } => {
                let _ = reply.send(self.ctx.config.values().clone());
            }
            LifecycleEvent::SetChannel(channel) => self.on_set_channel(channel),
            LifecycleEvent::UpdateStarted => {
                info!("update download started");
                self.ctx.updates.begin_update();
            }
            LifecycleEvent::UpdateFinished { installed_version } => {
                self.on_update_finished(installed_version)
            }
            LifecycleEvent::StopCompleted => self.on_stop_completed(),
        }
    }

    fn on_backend_ready(&mut self, address: BackendAddress) {
        match self.machine.backend_ready() {
            ReadyDecision::Ignored => {}
            ReadyDecision::Running => {
                info!(%address, "backend ready; opening main window");
                self.open_main_window(Some(address));
            }
            ReadyDecision::RunningWithPendingExit(intent) => {
                info!(?intent, "backend ready; running deferred exit");
                self.request_exit(intent);
            }
        }
    }

    fn on_backend_failed(&mut self, error: ShellError) {
        if !self.machine.backend_failed() {
            warn!(%error, "backend failure reported outside startup");
            return;
        }
        error!(%error, "backend failed to start");
        self.handle.mark_quitting();
        self.ctx
            .app
            .show_fatal_error(BACKEND_FAILED_TITLE, &error.to_string());
        self.terminate(1);
    }

    fn open_main_window(&mut self, address: Option<BackendAddress>) {
        let options = WindowOptions {
            route: self.ctx.deep_links.take_pending(),
            server_address: address,
            dev_server_port: self
                .ctx
                .env
                .development
                .then_some(self.ctx.env.server_port)
                .flatten(),
        };

        if let Err(error) = self.ctx.window.create_main(options) {
            error!(%error, "failed to open main window");
            self.exit_code = 1;
            self.ctx
                .app
                .show_fatal_error(WINDOW_FAILED_TITLE, &error.to_string());
            self.request_exit(ExitIntent {
                relaunch: false,
                source: ExitSource::StartupFailure,
            });
        }
    }

    fn on_close_requested(&mut self) {
        match self
            .ctx
            .policy
            .on_close_requested(self.machine.is_quitting())
        {
            CloseAction::Allow => {}
            CloseAction::HideWindow => {
                if let Err(error) = self.ctx.window.hide_for_close() {
                    warn!(%error, "failed to hide main window");
                }
            }
            CloseAction::QuitApp => self.request_exit(ExitIntent {
                relaunch: false,
                source: ExitSource::WindowClosed,
            }),
        }
    }

    fn on_all_windows_closed(&mut self) {
        if self.ctx.policy.on_all_windows_closed() {
            self.request_exit(ExitIntent {
                relaunch: false,
                source: ExitSource::AllWindowsClosed,
            });
        }
    }

    fn activate(&mut self) {
        if self.machine.state() != AppLifecycleState::Running {
            debug!(state = ?self.machine.state(), "activation ignored");
            return;
        }
        match self.ctx.policy.on_activate(&self.ctx.window.state()) {
            ActivateAction::CreateWindow => {
                let address = self.ctx.supervisor.address();
                self.open_main_window(address);
            }
            ActivateAction::ShowWindow => {
                if let Err(error) = self.ctx.window.bring_to_front() {
                    warn!(%error, "failed to bring main window to front");
                }
            }
        }
    }

    fn on_second_instance(&mut self, args: Vec<String>) {
        info!(args = ?args, "second instance forwarded its invocation");
        if self.ctx.policy.deep_links_in_argv() {
            if let Some(url) = self.ctx.deep_links.find_in_args(&args) {
                self.open_url(&url);
            }
        }
        self.activate();
    }

    fn open_url(&mut self, url: &str) {
        match self.ctx.deep_links.route(self.ctx.window.exists(), url) {
            RouteOutcome::Deliver(route) => {
                if let Err(error) = self.ctx.window.deliver_route(route) {
                    warn!(%error, "failed to deliver deep link");
                }
            }
            RouteOutcome::Buffered => {
                debug!(url, "buffered deep link until the main window exists");
                if self.machine.state() == AppLifecycleState::Running {
                    self.activate();
                }
            }
            RouteOutcome::Ignored => {}
        }
    }

    fn set_config(&mut self, patch: ConfigMap) -> ShellResult<ConfigMap> {
        let values = self.ctx.config.set(patch)?.clone();
        self.notify(UiNotification::Config(values.clone()));
        Ok(values)
    }

    fn on_set_channel(&mut self, channel: String) {
        match self.ctx.updates.request_channel(channel) {
            ChannelRequest::Apply(channel) => self.apply_channel(channel),
            ChannelRequest::Queued => info!("update in progress; channel change queued"),
        }
    }

    fn apply_channel(&mut self, channel: String) {
        let mut patch = ConfigMap::new();
        patch.insert(
            CONFIG_CHANNEL_KEY.to_string(),
            Value::String(channel.clone()),
        );
        match self.set_config(patch) {
            Ok(_) => self.ctx.updates.channel_applied(channel),
            Err(error) => warn!(%error, %channel, "failed to persist update channel"),
        }
    }

    fn on_update_finished(&mut self, installed_version: Option<String>) {
        if let Some(channel) = self.ctx.updates.finish_update() {
            self.apply_channel(channel);
        }
        if let Some(version) = installed_version {
            info!(%version, "update installed; waiting for confirmation");
            self.notify(UiNotification::UpdateReady { version });
        }
    }

    fn request_exit(&mut self, intent: ExitIntent) {
        match self.machine.request_exit(intent) {
            ExitDecision::Deferred | ExitDecision::AlreadyExiting => {}
            ExitDecision::BeginShutdown(intent) => self.begin_shutdown(intent),
        }
    }

    fn begin_shutdown(&mut self, intent: ExitIntent) {
        info!(relaunch = intent.relaunch, source = ?intent.source, "shutting down");
        self.handle.mark_quitting();
        self.notify(UiNotification::ShutdownStart);

        let supervisor = self.ctx.supervisor.clone();
        let handle = self.handle.clone();
        tokio::spawn(async move {
            supervisor.stop().await;
            handle.dispatch(LifecycleEvent::StopCompleted);
        });
    }

    fn on_stop_completed(&mut self) {
        let Some(intent) = self.machine.stop_completed() else {
            return;
        };

        if intent.relaunch {
            self.release_instance();
            match self.ctx.app.relaunch() {
                Ok(()) => {
                    info!("relaunched; exiting");
                    self.ctx.app.terminate(0);
                    self.outcome = Some(ExitOutcome::Relaunched);
                    return;
                }
                Err(error) => error!(%error, "failed to relaunch"),
            }
        }
        self.terminate(self.exit_code);
    }

    fn terminate(&mut self, code: i32) {
        self.handle.mark_quitting();
        self.release_instance();
        info!(code, "terminating");
        self.ctx.app.terminate(code);
        self.outcome = Some(ExitOutcome::Exited(code));
    }

    fn release_instance(&mut self) {
        if let Some(mut guard) = self.ctx.instance.take() {
            guard.release();
        }
    }

    fn notify(&mut self, notification: UiNotification) {
        if let Err(error) = self.ctx.window.notify(&notification) {
            warn!(%error, "failed to notify window");
        }
    }
}
