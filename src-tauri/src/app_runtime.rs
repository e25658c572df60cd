use std::{env, fs, path::PathBuf, sync::Arc};

use desktop_core::{
    app_constants::{APP_ID, MAIN_WINDOW_LABEL},
    launch_plan::bundled_backend_path,
    lifecycle, logging, runtime_paths,
    update_coordinator::default_channel_for,
    BackendSupervisor, ConfigStore, DeepLinkRouter, InstanceGate, InstanceRole,
    LaunchPlan, LifecycleContext, LifecycleController, LifecycleEvent, PlatformPolicy, ShellEnv,
    UpdateCoordinator, WindowController,
};
use tauri::{Manager, Theme, WindowEvent};
use tauri_plugin_deep_link::DeepLinkExt;
use tracing::{error, info, warn};

use crate::{
    desktop_bridge_commands, exit_events, exit_events::TauriApp, main_window::TauriWindow,
    update_flow, AppState,
};

fn resolve_data_dir() -> PathBuf {
    runtime_paths::default_data_dir(APP_ID).unwrap_or_else(|| env::temp_dir().join(APP_ID))
}

/// Builds and runs the shell. Only returns for exits that happen before the
/// Tauri event loop starts; afterwards the process ends through `AppHandle::exit`.
pub(crate) fn run() -> i32 {
    let data_dir = resolve_data_dir();
    match logging::init_logging(Some(&runtime_paths::log_dir(&data_dir))) {
        Ok(Some(path)) => info!(path = %path.display(), "desktop log initialized"),
        Ok(None) => {}
        Err(error) => eprintln!("failed to initialize logging: {error}"),
    }
    if let Err(error) = fs::create_dir_all(runtime_paths::tmp_dir(&data_dir)) {
        warn!(%error, "failed to create tmp directory");
    }

    let development = cfg!(debug_assertions);
    let env = ShellEnv::from_process(development);
    let args: Vec<String> = env::args().collect();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        development,
        data_dir = %data_dir.display(),
        "desktop process starting"
    );

    let (lifecycle, events) = lifecycle::channel();
    let forward_to = lifecycle.clone();
    let instance = match InstanceGate::new(APP_ID)
        .acquire(&args, move |forwarded| forward_to.accept_second_instance(forwarded))
    {
        Ok(InstanceRole::Primary(guard)) => guard,
        Ok(InstanceRole::Secondary) => return 0,
        Err(error) => {
            error!(%error, "failed to acquire single-instance lock");
            return 1;
        }
    };

    let config = ConfigStore::load(&data_dir);
    let channel = config
        .channel()
        .map(str::to_string)
        .unwrap_or_else(|| default_channel_for(env!("CARGO_PKG_VERSION")));
    let policy = PlatformPolicy::current();
    let mut deep_links = DeepLinkRouter::default();
    if policy.deep_links_in_argv() {
        if let Some(url) = deep_links.find_in_args(args.get(1..).unwrap_or_default()) {
            deep_links.route(false, &url);
        }
    }

    let setup_lifecycle = lifecycle.clone();
    let built = tauri::Builder::default()
        .plugin(tauri_plugin_deep_link::init())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_process::init())
        .plugin(tauri_plugin_updater::Builder::new().build())
        .invoke_handler(tauri::generate_handler![
            desktop_bridge_commands::desktop_bridge_is_desktop_runtime,
            desktop_bridge_commands::desktop_bridge_exit,
            desktop_bridge_commands::desktop_bridge_shutdown,
            desktop_bridge_commands::desktop_bridge_update_confirm,
            desktop_bridge_commands::desktop_bridge_get_config,
            desktop_bridge_commands::desktop_bridge_set_config,
            desktop_bridge_commands::desktop_bridge_set_channel,
            desktop_bridge_commands::desktop_bridge_get_backend_state,
        ])
        .on_window_event(|window, event| {
            if window.label() != MAIN_WINDOW_LABEL {
                return;
            }
            let Some(state) = window.app_handle().try_state::<AppState>() else {
                return;
            };

            match event {
                WindowEvent::CloseRequested { api, .. } => {
                    if state.lifecycle.is_quitting() {
                        return;
                    }
                    api.prevent_close();
                    state.lifecycle.dispatch(LifecycleEvent::CloseRequested);
                }
                WindowEvent::Destroyed => {
                    state.lifecycle.dispatch(LifecycleEvent::WindowDestroyed);
                }
                WindowEvent::ThemeChanged(theme) => {
                    state.lifecycle.dispatch(LifecycleEvent::ThemeChanged {
                        dark: *theme == Theme::Dark,
                    });
                }
                _ => {}
            }
        })
        .setup(move |app| {
            let app_handle = app.handle().clone();
            let lifecycle = setup_lifecycle;

            let bundled = bundled_backend_path(&app_handle.path().resource_dir()?);
            let plan = match LaunchPlan::resolve(&env, bundled, &data_dir) {
                Ok(plan) => plan,
                Err(error) => {
                    // The dialog blocks until dismissed; the main thread must keep
                    // running its event loop to show it.
                    let mut shell = TauriApp::new(app_handle.clone());
                    tauri::async_runtime::spawn_blocking(move || {
                        lifecycle::fail_before_start(&mut shell, &error)
                    });
                    return Ok(());
                }
            };
            let supervisor = Arc::new(
                BackendSupervisor::new(plan)
                    .with_override_address(env.backend_override.clone())
                    .with_probe(env.readiness_probe())
                    .with_ready_timeout(env.backend_ready_timeout),
            );
            app.manage(AppState {
                lifecycle: lifecycle.clone(),
                supervisor: supervisor.clone(),
            });

            #[cfg(any(target_os = "linux", all(debug_assertions, windows)))]
            if let Err(error) = app.deep_link().register_all() {
                warn!(%error, "failed to register deep link scheme");
            }
            if !policy.deep_links_in_argv() {
                if let Ok(Some(urls)) = app.deep_link().get_current() {
                    for url in urls {
                        lifecycle.dispatch(LifecycleEvent::OpenUrl(url.to_string()));
                    }
                }
            }
            let open_url_lifecycle = lifecycle.clone();
            app.deep_link().on_open_url(move |event| {
                for url in event.urls() {
                    open_url_lifecycle.dispatch(LifecycleEvent::OpenUrl(url.to_string()));
                }
            });

            let ctx = LifecycleContext {
                env,
                config,
                supervisor,
                window: WindowController::new(TauriWindow::new(app_handle.clone())),
                deep_links,
                updates: UpdateCoordinator::new(channel),
                policy,
                app: TauriApp::new(app_handle.clone()),
                instance: Some(instance),
            };
            let controller = LifecycleController::new(ctx, lifecycle.clone());
            tauri::async_runtime::spawn(async move {
                let outcome = controller.run(events).await;
                info!(?outcome, "lifecycle controller finished");
            });

            update_flow::spawn_startup_update_check(app_handle, lifecycle);
            Ok(())
        })
        .build(tauri::generate_context!());

    let app = match built {
        Ok(app) => app,
        Err(error) => {
            error!(%error, "failed to build tauri application");
            return 1;
        }
    };
    app.run(|app_handle, event| exit_events::handle_run_event(app_handle, event));
    0
}
