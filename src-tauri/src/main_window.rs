use desktop_core::{
    app_constants::{APP_NAME, MAIN_WINDOW_LABEL},
    ShellError, ShellResult, UiNotification, WindowOptions, WindowSurface,
};
use serde_json::json;
use tauri::{AppHandle, Emitter, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use url::Url;

/// The primary Tauri webview window.
pub(crate) struct TauriWindow {
    app_handle: AppHandle,
}

impl TauriWindow {
    pub(crate) fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }

    fn window(&self) -> ShellResult<WebviewWindow> {
        self.app_handle
            .get_webview_window(MAIN_WINDOW_LABEL)
            .ok_or_else(|| ShellError::Window("main window not found".to_string()))
    }

    fn with_window<F>(&self, action: &str, operation: F) -> ShellResult<()>
    where
        F: FnOnce(&WebviewWindow) -> tauri::Result<()>,
    {
        let window = self.window()?;
        operation(&window).map_err(|error| ShellError::Window(format!("{action}: {error}")))
    }
}

fn window_url(options: &WindowOptions) -> ShellResult<WebviewUrl> {
    match options.dev_server_port {
        Some(port) => Url::parse(&format!("http://localhost:{port}"))
            .map(WebviewUrl::External)
            .map_err(|error| ShellError::Window(format!("invalid dev server url: {error}"))),
        None => Ok(WebviewUrl::App("index.html".into())),
    }
}

/// Runs before the UI bundle so it can read where the backend listens and
/// which route to open first.
fn bootstrap_script(options: &WindowOptions) -> String {
    let bootstrap = json!({
        "serverAddress": options.server_address.as_ref().map(ToString::to_string),
        "route": options.route.as_ref().map(|route| json!({
            "path": route.path(),
            "params": route.params,
            "url": route.raw,
        })),
    });
    format!("window.__ANYTYPE_SHELL__ = Object.freeze({bootstrap});")
}

impl WindowSurface for TauriWindow {
    fn create(&mut self, options: &WindowOptions) -> ShellResult<()> {
        WebviewWindowBuilder::new(&self.app_handle, MAIN_WINDOW_LABEL, window_url(options)?)
            .title(APP_NAME)
            .inner_size(1280.0, 800.0)
            .min_inner_size(640.0, 480.0)
            .initialization_script(&bootstrap_script(options))
            .build()
            .map(|_| ())
            .map_err(|error| ShellError::Window(format!("failed to build main window: {error}")))
    }

    fn show(&mut self) -> ShellResult<()> {
        self.with_window("show", |window| window.show())
    }

    fn hide(&mut self) -> ShellResult<()> {
        self.with_window("hide", |window| window.hide())
    }

    fn focus(&mut self) -> ShellResult<()> {
        self.with_window("focus", |window| window.set_focus())
    }

    fn restore(&mut self) -> ShellResult<()> {
        self.with_window("unminimize", |window| window.unminimize())
    }

    fn is_visible(&self) -> bool {
        self.window()
            .ok()
            .and_then(|window| window.is_visible().ok())
            .unwrap_or(false)
    }

    fn is_minimized(&self) -> bool {
        self.window()
            .ok()
            .and_then(|window| window.is_minimized().ok())
            .unwrap_or(false)
    }

    fn is_full_screen(&self) -> bool {
        self.window()
            .ok()
            .and_then(|window| window.is_fullscreen().ok())
            .unwrap_or(false)
    }

    fn set_full_screen(&mut self, full_screen: bool) -> ShellResult<()> {
        self.with_window("set_fullscreen", |window| window.set_fullscreen(full_screen))
    }

    fn send(&mut self, notification: &UiNotification) -> ShellResult<()> {
        let event = notification.event_name();
        self.with_window(event, |window| window.emit(event, notification.payload()))
    }
}
