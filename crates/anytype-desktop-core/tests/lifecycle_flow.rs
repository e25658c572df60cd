use std::{
    process,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use desktop_core::{
    lifecycle, AppSurface, BackendStatus, BackendSupervisor, ConfigStore, DeepLinkRouter,
    ExitOutcome, ExitSource, InstanceGate, InstanceGuard, InstanceRole, LaunchPlan,
    LifecycleContext, LifecycleController, LifecycleEvent, LifecycleHandle, PlatformPolicy,
    ShellEnv, ShellError, ShellResult, UiNotification, UpdateCoordinator, WindowController,
    WindowOptions, WindowSurface,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::{task::JoinHandle, time::timeout};

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("recorder lock").push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().expect("recorder lock").clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    async fn wait_for(&self, prefix: &str) {
        let found = timeout(Duration::from_secs(5), async {
            while self.count(prefix) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(found.is_ok(), "never saw {prefix}: {:?}", self.entries());
    }
}

struct FakeWindow {
    log: Recorder,
    visible: bool,
}

impl WindowSurface for FakeWindow {
    fn create(&mut self, options: &WindowOptions) -> ShellResult<()> {
        self.visible = true;
        self.log.push(format!(
            "create route={} server={} dev={}",
            options
                .route
                .as_ref()
                .map(|route| route.path())
                .unwrap_or_else(|| "-".to_string()),
            options
                .server_address
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            options
                .dev_server_port
                .map(|port| port.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ));
        Ok(())
    }

    fn show(&mut self) -> ShellResult<()> {
        self.visible = true;
        self.log.push("show");
        Ok(())
    }

    fn hide(&mut self) -> ShellResult<()> {
        self.visible = false;
        self.log.push("hide");
        Ok(())
    }

    fn focus(&mut self) -> ShellResult<()> {
        self.log.push("focus");
        Ok(())
    }

    fn restore(&mut self) -> ShellResult<()> {
        self.log.push("restore");
        Ok(())
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn is_minimized(&self) -> bool {
        false
    }

    fn is_full_screen(&self) -> bool {
        false
    }

    fn set_full_screen(&mut self, full_screen: bool) -> ShellResult<()> {
        self.log.push(format!("full_screen:{full_screen}"));
        Ok(())
    }

    fn send(&mut self, notification: &UiNotification) -> ShellResult<()> {
        let detail = match notification {
            UiNotification::Route(route) => format!(" {}", route.raw),
            UiNotification::UpdateReady { version } => format!(" {version}"),
            _ => String::new(),
        };
        self.log
            .push(format!("send:{}{detail}", notification.event_name()));
        Ok(())
    }
}

struct FakeApp {
    log: Recorder,
    /// When set, relaunch tries the lock the way the new process would.
    gate: Option<InstanceGate>,
}

impl AppSurface for FakeApp {
    fn show_fatal_error(&mut self, title: &str, _message: &str) {
        self.log.push(format!("fatal:{title}"));
    }

    fn terminate(&mut self, code: i32) {
        self.log.push(format!("terminate:{code}"));
    }

    fn relaunch(&mut self) -> ShellResult<()> {
        let lock = match &self.gate {
            Some(gate) => match gate.acquire(&[], |_| true) {
                Ok(InstanceRole::Primary(_)) => " lock=free",
                Ok(InstanceRole::Secondary) => " lock=held",
                Err(_) => " lock=error",
            },
            None => "",
        };
        self.log.push(format!("relaunch{lock}"));
        Ok(())
    }
}

struct Harness {
    log: Recorder,
    handle: LifecycleHandle,
    supervisor: Arc<BackendSupervisor>,
    task: JoinHandle<ExitOutcome>,
    _data_dir: TempDir,
}

impl Harness {
    async fn outcome(self) -> ExitOutcome {
        timeout(Duration::from_secs(10), self.task)
            .await
            .expect("controller finished in time")
            .expect("controller task did not panic")
    }
}

struct Setup {
    env: ShellEnv,
    plan: LaunchPlan,
    policy: PlatformPolicy,
    before_run: Vec<LifecycleEvent>,
    instance: Option<(InstanceGate, InstanceGuard)>,
}

impl Setup {
    fn attached() -> Self {
        Self {
            env: ShellEnv {
                backend_override: Some("127.0.0.1:31999".to_string()),
                ..ShellEnv::default()
            },
            plan: missing_backend(),
            policy: PlatformPolicy::macos(),
            before_run: Vec::new(),
            instance: None,
        }
    }

    fn spawning(plan: LaunchPlan) -> Self {
        Self {
            env: ShellEnv::default(),
            plan,
            policy: PlatformPolicy::macos(),
            before_run: Vec::new(),
            instance: None,
        }
    }

    fn policy(mut self, policy: PlatformPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn holding(mut self, gate: InstanceGate, guard: InstanceGuard) -> Self {
        self.instance = Some((gate, guard));
        self
    }

    fn queue(mut self, event: LifecycleEvent) -> Self {
        self.before_run.push(event);
        self
    }

    fn launch(self) -> Harness {
        let data_dir = tempfile::tempdir().expect("tempdir");
        let log = Recorder::default();
        let supervisor = Arc::new(
            BackendSupervisor::new(self.plan)
                .with_override_address(self.env.backend_override.clone())
                .with_ready_timeout(Duration::from_secs(5)),
        );

        let (handle, events) = lifecycle::channel();
        for event in self.before_run {
            handle.dispatch(event);
        }

        let (gate, instance) = match self.instance {
            Some((gate, guard)) => (Some(gate), Some(guard)),
            None => (None, None),
        };
        let ctx = LifecycleContext {
            env: self.env,
            config: ConfigStore::load(data_dir.path()),
            supervisor: supervisor.clone(),
            window: WindowController::new(FakeWindow {
                log: log.clone(),
                visible: false,
            }),
            deep_links: DeepLinkRouter::default(),
            updates: UpdateCoordinator::new("latest"),
            policy: self.policy,
            app: FakeApp {
                log: log.clone(),
                gate,
            },
            instance,
        };
        let controller = LifecycleController::new(ctx, handle.clone());
        let task = tokio::spawn(controller.run(events));

        Harness {
            log,
            handle,
            supervisor,
            task,
            _data_dir: data_dir,
        }
    }
}

fn missing_backend() -> LaunchPlan {
    LaunchPlan::for_executable("/nonexistent/anytypeHelper", std::env::temp_dir())
}

fn unique_gate(label: &str) -> InstanceGate {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    InstanceGate::with_key(format!(
        "anytype-desktop-flow-{label}-{}-{nanos}.sock",
        process::id()
    ))
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn override_address_runs_without_child_process() {
    let harness = Setup::attached().launch();
    harness.log.wait_for("create").await;

    assert_eq!(
        harness.log.entries()[0],
        "create route=- server=127.0.0.1:31999 dev=-"
    );
    let backend = harness.supervisor.handle();
    assert_eq!(backend.status, BackendStatus::Ready);
    assert_eq!(backend.pid, None);

    harness.handle.exit(false, ExitSource::Ui);
    assert_eq!(harness.outcome().await, ExitOutcome::Exited(0));
}

#[tokio::test]
async fn rapid_exit_requests_shut_down_once() {
    let harness = Setup::attached().launch();
    harness.log.wait_for("create").await;

    harness.handle.exit(false, ExitSource::Ui);
    harness.handle.exit(false, ExitSource::UiShutdown);
    harness.handle.exit(true, ExitSource::UpdateConfirm);
    harness.handle.exit(false, ExitSource::OsQuit);

    let log = harness.log.clone();
    let supervisor = harness.supervisor.clone();
    assert_eq!(harness.outcome().await, ExitOutcome::Exited(0));

    assert_eq!(log.count("send:shutdownStart"), 1);
    assert_eq!(log.count("terminate:"), 1);
    assert_eq!(log.count("relaunch"), 0);
    assert_eq!(supervisor.status(), BackendStatus::Stopped);
}

#[tokio::test]
async fn missing_backend_is_fatal_and_opens_no_window() {
    let harness = Setup::spawning(missing_backend()).launch();
    let log = harness.log.clone();
    let supervisor = harness.supervisor.clone();

    assert_eq!(harness.outcome().await, ExitOutcome::Exited(1));
    assert_eq!(
        log.entries(),
        ["fatal:Error: failed to run server", "terminate:1"]
    );
    assert_eq!(supervisor.status(), BackendStatus::Failed);
}

#[tokio::test]
async fn development_build_without_server_port_is_fatal() {
    let mut setup = Setup::attached();
    setup.env.development = true;
    let harness = setup.launch();
    let log = harness.log.clone();
    let supervisor = harness.supervisor.clone();

    assert_eq!(harness.outcome().await, ExitOutcome::Exited(1));
    assert_eq!(log.count("fatal:"), 1);
    assert_eq!(log.count("create"), 0);
    assert_eq!(supervisor.status(), BackendStatus::NotStarted);
}

#[tokio::test]
async fn development_build_loads_dev_server() {
    let mut setup = Setup::attached();
    setup.env.development = true;
    setup.env.server_port = Some(8080);
    let harness = setup.launch();
    harness.log.wait_for("create").await;

    assert_eq!(
        harness
            .log
            .count("create route=- server=127.0.0.1:31999 dev=8080"),
        1
    );
    harness.handle.exit(false, ExitSource::Ui);
    assert_eq!(harness.outcome().await, ExitOutcome::Exited(0));
}

#[tokio::test]
async fn update_confirm_relaunches_even_while_updating() {
    let harness = Setup::attached().launch();
    harness.log.wait_for("create").await;

    harness.handle.dispatch(LifecycleEvent::UpdateStarted);
    harness.handle.exit(true, ExitSource::UpdateConfirm);

    let log = harness.log.clone();
    assert_eq!(harness.outcome().await, ExitOutcome::Relaunched);
    assert_eq!(log.count("relaunch"), 1);
    assert_eq!(log.count("terminate:0"), 1);
}

#[tokio::test]
async fn relaunch_happens_after_the_instance_lock_is_released() {
    let gate = unique_gate("relaunch");
    let InstanceRole::Primary(guard) = gate.acquire(&[], |_| true).expect("acquire") else {
        panic!("test process must hold the lock");
    };
    let harness = Setup::attached().holding(gate, guard).launch();
    harness.log.wait_for("create").await;

    harness.handle.exit(true, ExitSource::Ui);
    let log = harness.log.clone();
    assert_eq!(harness.outcome().await, ExitOutcome::Relaunched);
    assert_eq!(log.count("relaunch lock=free"), 1);
    assert_eq!(log.count("relaunch lock=held"), 0);
}

#[tokio::test]
async fn activate_shows_a_hidden_window() {
    let harness = Setup::attached().launch();
    harness.log.wait_for("create").await;
    harness.handle.dispatch(LifecycleEvent::CloseRequested);
    harness.log.wait_for("hide").await;

    harness.handle.dispatch(LifecycleEvent::Activate);
    harness.log.wait_for("focus").await;
    assert_eq!(&harness.log.entries()[1..], ["hide", "show", "focus"]);
    assert_eq!(harness.log.count("create"), 1);

    harness.handle.exit(false, ExitSource::Ui);
    harness.outcome().await;
}

#[tokio::test]
async fn activate_recreates_a_destroyed_window_on_macos() {
    let harness = Setup::attached().policy(PlatformPolicy::macos()).launch();
    harness.log.wait_for("create").await;

    harness.handle.dispatch(LifecycleEvent::WindowDestroyed);
    harness.handle.dispatch(LifecycleEvent::Activate);
    let recreated = timeout(Duration::from_secs(5), async {
        while harness.log.count("create") < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        recreated.is_ok(),
        "window not recreated: {:?}",
        harness.log.entries()
    );
    assert!(!harness.handle.is_quitting());
    assert_eq!(
        harness.log.entries()[1],
        "create route=- server=127.0.0.1:31999 dev=-"
    );

    harness.handle.exit(false, ExitSource::Ui);
    harness.outcome().await;
}

#[tokio::test]
async fn startup_failure_before_launch_shows_dialog_then_exits() {
    let log = Recorder::default();
    let mut app = FakeApp {
        log: log.clone(),
        gate: None,
    };
    let error = ShellError::InvalidLaunchPlan("unbalanced quotes".to_string());

    tokio::task::spawn_blocking(move || lifecycle::fail_before_start(&mut app, &error))
        .await
        .expect("blocking task");
    assert_eq!(
        log.entries(),
        ["fatal:Error: failed to run server", "terminate:1"]
    );
}

#[tokio::test]
async fn links_before_window_reach_first_window_and_latest_wins() {
    let harness = Setup::attached()
        .queue(LifecycleEvent::OpenUrl("anytype://first".to_string()))
        .queue(LifecycleEvent::OpenUrl("https://elsewhere.example".to_string()))
        .queue(LifecycleEvent::OpenUrl("anytype://object?objectId=2".to_string()))
        .launch();
    harness.log.wait_for("create").await;

    assert_eq!(
        harness.log.entries()[0],
        "create route=/object server=127.0.0.1:31999 dev=-"
    );

    harness
        .handle
        .dispatch(LifecycleEvent::OpenUrl("anytype://invite".to_string()));
    harness.log.wait_for("send:route").await;
    assert_eq!(harness.log.count("send:route anytype://invite"), 1);

    harness.handle.exit(false, ExitSource::Ui);
    harness.outcome().await;
}

#[tokio::test]
async fn exit_during_startup_waits_for_backend_then_shuts_down() {
    let harness = Setup::attached()
        .queue(LifecycleEvent::ExitRequested {
            relaunch: false,
            source: ExitSource::OsQuit,
        })
        .launch();
    let log = harness.log.clone();
    let supervisor = harness.supervisor.clone();

    assert_eq!(harness.outcome().await, ExitOutcome::Exited(0));
    assert_eq!(log.count("create"), 0);
    assert_eq!(log.entries(), ["terminate:0"]);
    assert_eq!(supervisor.status(), BackendStatus::Stopped);
}

#[tokio::test]
async fn close_hides_on_macos_and_quits_on_linux() {
    let mac = Setup::attached().launch();
    mac.log.wait_for("create").await;
    mac.handle.dispatch(LifecycleEvent::CloseRequested);
    mac.log.wait_for("hide").await;
    assert!(!mac.handle.is_quitting());
    mac.handle.exit(false, ExitSource::OsQuit);
    assert_eq!(mac.outcome().await, ExitOutcome::Exited(0));

    let linux = Setup::attached().policy(PlatformPolicy::linux()).launch();
    linux.log.wait_for("create").await;
    linux.handle.dispatch(LifecycleEvent::CloseRequested);
    let log = linux.log.clone();
    assert_eq!(linux.outcome().await, ExitOutcome::Exited(0));
    assert_eq!(log.count("hide"), 0);
    assert_eq!(log.count("send:shutdownStart"), 1);
}

#[tokio::test]
async fn second_instance_link_is_routed_and_window_raised() {
    let harness = Setup::attached().policy(PlatformPolicy::linux()).launch();
    harness.log.wait_for("create").await;

    assert!(harness.handle.accept_second_instance(vec![
        "/usr/bin/anytype".to_string(),
        "anytype://object?objectId=7".to_string(),
    ]));
    harness.log.wait_for("send:route").await;
    assert_eq!(harness.log.count("send:route anytype://object?objectId=7"), 1);
    assert!(harness.log.count("focus") >= 1);

    harness.handle.exit(false, ExitSource::Ui);
    harness.log.wait_for("terminate").await;
    assert!(!harness.handle.accept_second_instance(Vec::new()));
    harness.outcome().await;
}

#[tokio::test]
async fn config_changes_persist_and_channel_waits_for_update() {
    let harness = Setup::attached().launch();
    harness.log.wait_for("create").await;

    let values = harness
        .handle
        .set_config(object(json!({ "debug": { "ui": true } })))
        .await
        .expect("config persisted");
    assert_eq!(values.get("debug"), Some(&json!({ "ui": true })));
    assert_eq!(harness.log.count("send:config"), 1);

    harness.handle.dispatch(LifecycleEvent::UpdateStarted);
    harness
        .handle
        .dispatch(LifecycleEvent::SetChannel("beta".to_string()));
    let during = harness.handle.get_config().await.expect("config");
    assert_eq!(during.get("channel"), None);

    harness.handle.dispatch(LifecycleEvent::UpdateFinished {
        installed_version: Some("0.41.0".to_string()),
    });
    let after = harness.handle.get_config().await.expect("config");
    assert_eq!(after.get("channel"), Some(&json!("beta")));
    assert_eq!(harness.log.count("send:update-ready 0.41.0"), 1);

    harness.handle.exit(false, ExitSource::Ui);
    harness.outcome().await;
}

#[tokio::test]
async fn theme_changes_are_forwarded() {
    let harness = Setup::attached().launch();
    harness.log.wait_for("create").await;

    harness
        .handle
        .dispatch(LifecycleEvent::ThemeChanged { dark: true });
    harness.log.wait_for("send:native-theme").await;

    harness.handle.exit(false, ExitSource::Ui);
    harness.outcome().await;
}

#[cfg(unix)]
#[tokio::test]
async fn spawned_backend_is_stopped_before_termination() {
    let plan = LaunchPlan {
        cmd: "sh".into(),
        args: vec![
            "-c".to_string(),
            "echo 'gRPC server started at: 127.0.0.1:31888'; exec sleep 30".to_string(),
        ],
        cwd: std::env::temp_dir(),
    };
    let harness = Setup::spawning(plan).launch();
    harness.log.wait_for("create").await;
    assert!(harness.supervisor.handle().pid.is_some());

    harness.handle.exit(false, ExitSource::Ui);
    let log = harness.log.clone();
    let supervisor = harness.supervisor.clone();
    assert_eq!(harness.outcome().await, ExitOutcome::Exited(0));
    assert_eq!(supervisor.status(), BackendStatus::Stopped);
    assert_eq!(
        log.entries().last().map(String::as_str),
        Some("terminate:0")
    );
}
