//! Lifecycle core of the Anytype desktop shell.
//!
//! Everything that decides *when* the backend runs, *when* the main window
//! exists and *how* the process exits lives here, behind the
//! [`WindowSurface`] and [`AppSurface`] traits, so the toolkit layer only
//! translates its callbacks into [`LifecycleEvent`]s.

pub mod app_constants;
pub mod backend_address;
pub mod backend_readiness;
pub mod backend_supervisor;
pub mod config_store;
pub mod deep_link;
pub mod error;
pub mod exit_state;
pub mod launch_plan;
pub mod lifecycle;
pub mod logging;
pub mod main_window;
pub mod platform_policy;
mod process_control;
pub mod runtime_paths;
pub mod shell_env;
pub mod single_instance;
pub mod ui_events;
pub mod update_coordinator;

pub use backend_address::BackendAddress;
pub use backend_readiness::ReadinessProbe;
pub use backend_supervisor::{BackendProcessHandle, BackendStatus, BackendSupervisor};
pub use config_store::{ConfigMap, ConfigStore};
pub use deep_link::{DeepLinkRouter, Route, RouteOutcome};
pub use error::{DeepLinkError, ShellError, ShellResult};
pub use exit_state::{AppLifecycleState, ExitIntent, ExitSource};
pub use launch_plan::LaunchPlan;
pub use lifecycle::{
    AppSurface, ExitOutcome, LifecycleContext, LifecycleController, LifecycleEvent,
    LifecycleEvents, LifecycleHandle,
};
pub use main_window::{CreateOutcome, WindowController, WindowOptions, WindowState, WindowSurface};
pub use platform_policy::{ActivateAction, CloseAction, PlatformPolicy};
pub use shell_env::ShellEnv;
pub use single_instance::{InstanceGate, InstanceGuard, InstanceRole};
pub use ui_events::UiNotification;
pub use update_coordinator::{ChannelRequest, UpdateCoordinator, UpdateState};
