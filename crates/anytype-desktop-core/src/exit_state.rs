use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AppLifecycleState {
    #[default]
    Starting,
    AwaitingBackend,
    Running,
    ShuttingDown,
    Terminated,
}

/// Who asked the app to exit. Only used for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitSource {
    Ui,
    UiShutdown,
    UpdateConfirm,
    OsQuit,
    WindowClosed,
    AllWindowsClosed,
    /// The main window could not be opened after the backend came up.
    StartupFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitIntent {
    pub relaunch: bool,
    pub source: ExitSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Backend start still in flight; the intent runs once it settles.
    Deferred,
    BeginShutdown(ExitIntent),
    AlreadyExiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyDecision {
    Running,
    /// An exit was requested while waiting for the backend.
    RunningWithPendingExit(ExitIntent),
    Ignored,
}

/// Forward-only lifecycle transitions. Owned by the lifecycle controller.
#[derive(Debug, Default)]
pub struct ExitStateMachine {
    state: AppLifecycleState,
    deferred: Option<ExitIntent>,
    active: Option<ExitIntent>,
}

impl ExitStateMachine {
    pub fn state(&self) -> AppLifecycleState {
        self.state
    }

    pub fn is_quitting(&self) -> bool {
        matches!(
            self.state,
            AppLifecycleState::ShuttingDown | AppLifecycleState::Terminated
        )
    }

    pub fn begin_startup(&mut self) -> bool {
        self.transition(AppLifecycleState::Starting, AppLifecycleState::AwaitingBackend)
    }

    pub fn backend_ready(&mut self) -> ReadyDecision {
        if !self.transition(AppLifecycleState::AwaitingBackend, AppLifecycleState::Running) {
            return ReadyDecision::Ignored;
        }
        match self.deferred.take() {
            Some(intent) => ReadyDecision::RunningWithPendingExit(intent),
            None => ReadyDecision::Running,
        }
    }

    /// Startup failed; the fatal path replaces any deferred exit.
    pub fn backend_failed(&mut self) -> bool {
        if !matches!(
            self.state,
            AppLifecycleState::Starting | AppLifecycleState::AwaitingBackend
        ) {
            return false;
        }
        if let Some(intent) = self.deferred.take() {
            debug!(?intent, "dropping deferred exit after startup failure");
        }
        self.state = AppLifecycleState::Terminated;
        true
    }

    pub fn request_exit(&mut self, intent: ExitIntent) -> ExitDecision {
        match self.state {
            AppLifecycleState::Starting | AppLifecycleState::AwaitingBackend => {
                if self.deferred.is_none() {
                    info!(?intent, "deferring exit until backend start settles");
                    self.deferred = Some(intent);
                }
                ExitDecision::Deferred
            }
            AppLifecycleState::Running => {
                self.state = AppLifecycleState::ShuttingDown;
                self.active = Some(intent);
                ExitDecision::BeginShutdown(intent)
            }
            AppLifecycleState::ShuttingDown | AppLifecycleState::Terminated => {
                debug!(?intent, "exit already in progress");
                ExitDecision::AlreadyExiting
            }
        }
    }

    /// Backend teardown finished; returns the intent to carry out.
    pub fn stop_completed(&mut self) -> Option<ExitIntent> {
        if self.state != AppLifecycleState::ShuttingDown {
            return None;
        }
        self.state = AppLifecycleState::Terminated;
        self.active.take()
    }

    fn transition(&mut self, from: AppLifecycleState, to: AppLifecycleState) -> bool {
        if self.state != from {
            debug!(current = ?self.state, ?from, ?to, "ignoring lifecycle transition");
            return false;
        }
        self.state = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(relaunch: bool, source: ExitSource) -> ExitIntent {
        ExitIntent { relaunch, source }
    }

    fn running() -> ExitStateMachine {
        let mut machine = ExitStateMachine::default();
        assert!(machine.begin_startup());
        assert_eq!(machine.backend_ready(), ReadyDecision::Running);
        machine
    }

    #[test]
    fn states_move_forward_only() {
        let mut machine = running();
        assert!(!machine.begin_startup());
        assert_eq!(machine.backend_ready(), ReadyDecision::Ignored);
        assert_eq!(machine.state(), AppLifecycleState::Running);
    }

    #[test]
    fn repeated_exit_requests_begin_one_shutdown() {
        let mut machine = running();
        let first = intent(false, ExitSource::Ui);
        assert_eq!(machine.request_exit(first), ExitDecision::BeginShutdown(first));
        assert!(machine.is_quitting());
        assert_eq!(
            machine.request_exit(intent(true, ExitSource::UpdateConfirm)),
            ExitDecision::AlreadyExiting
        );

        assert_eq!(machine.stop_completed(), Some(first));
        assert_eq!(machine.stop_completed(), None);
        assert_eq!(
            machine.request_exit(intent(false, ExitSource::OsQuit)),
            ExitDecision::AlreadyExiting
        );
    }

    #[test]
    fn exit_during_startup_waits_for_backend() {
        let mut machine = ExitStateMachine::default();
        machine.begin_startup();
        let first = intent(false, ExitSource::OsQuit);
        assert_eq!(machine.request_exit(first), ExitDecision::Deferred);
        assert_eq!(
            machine.request_exit(intent(true, ExitSource::Ui)),
            ExitDecision::Deferred
        );
        assert!(!machine.is_quitting());

        assert_eq!(
            machine.backend_ready(),
            ReadyDecision::RunningWithPendingExit(first)
        );
    }

    #[test]
    fn startup_failure_drops_deferred_exit() {
        let mut machine = ExitStateMachine::default();
        machine.begin_startup();
        machine.request_exit(intent(false, ExitSource::Ui));

        assert!(machine.backend_failed());
        assert_eq!(machine.state(), AppLifecycleState::Terminated);
        assert_eq!(machine.backend_ready(), ReadyDecision::Ignored);
        assert!(!machine.backend_failed());
    }
}
