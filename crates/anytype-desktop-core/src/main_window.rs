//! The single primary window, independent of the toolkit that draws it.

use tracing::{debug, info, warn};

use crate::{BackendAddress, Route, ShellResult, UiNotification};

/// Toolkit-side operations on the primary window.
///
/// Implementations only talk to the native window; deciding *whether* to
/// create, show or hide is [`WindowController`]'s job.
pub trait WindowSurface: Send + 'static {
    fn create(&mut self, options: &WindowOptions) -> ShellResult<()>;
    fn show(&mut self) -> ShellResult<()>;
    fn hide(&mut self) -> ShellResult<()>;
    fn focus(&mut self) -> ShellResult<()>;
    fn restore(&mut self) -> ShellResult<()>;
    fn is_visible(&self) -> bool;
    fn is_minimized(&self) -> bool;
    fn is_full_screen(&self) -> bool;
    fn set_full_screen(&mut self, full_screen: bool) -> ShellResult<()>;
    fn send(&mut self, notification: &UiNotification) -> ShellResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowOptions {
    /// Route to open instead of the UI's default start page.
    pub route: Option<Route>,
    pub server_address: Option<BackendAddress>,
    /// Load the UI from `http://localhost:<port>` instead of bundled assets.
    pub dev_server_port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowState {
    pub exists: bool,
    pub is_visible: bool,
    pub is_full_screen: bool,
    pub is_minimized: bool,
    pub pending_route: Option<Route>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Reused,
}

pub struct WindowController<W> {
    surface: W,
    exists: bool,
    pending_route: Option<Route>,
}

impl<W: WindowSurface> WindowController<W> {
    pub fn new(surface: W) -> Self {
        Self {
            surface,
            exists: false,
            pending_route: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn surface(&self) -> &W {
        &self.surface
    }

    pub fn state(&self) -> WindowState {
        if !self.exists {
            return WindowState::default();
        }
        WindowState {
            exists: true,
            is_visible: self.surface.is_visible(),
            is_full_screen: self.surface.is_full_screen(),
            is_minimized: self.surface.is_minimized(),
            pending_route: self.pending_route.clone(),
        }
    }

    pub fn create_main(&mut self, options: WindowOptions) -> ShellResult<CreateOutcome> {
        if self.exists {
            debug!("main window already exists; bringing it to front");
            self.bring_to_front()?;
            return Ok(CreateOutcome::Reused);
        }

        self.surface.create(&options)?;
        self.exists = true;
        self.pending_route = options.route;
        info!(
            route = ?self.pending_route.as_ref().map(|route| route.raw.as_str()),
            "main window created"
        );
        Ok(CreateOutcome::Created)
    }

    pub fn show(&mut self) -> ShellResult<()> {
        if self.exists {
            self.surface.show()?;
        }
        Ok(())
    }

    pub fn focus(&mut self) -> ShellResult<()> {
        if self.exists {
            self.surface.focus()?;
        }
        Ok(())
    }

    pub fn restore(&mut self) -> ShellResult<()> {
        if self.exists {
            self.surface.restore()?;
        }
        Ok(())
    }

    pub fn hide(&mut self) -> ShellResult<()> {
        if self.exists {
            self.surface.hide()?;
        }
        Ok(())
    }

    /// Hide in response to the close button, leaving full-screen first.
    pub fn hide_for_close(&mut self) -> ShellResult<()> {
        if !self.exists {
            return Ok(());
        }
        if self.surface.is_full_screen() {
            self.surface.set_full_screen(false)?;
        }
        self.surface.hide()
    }

    pub fn bring_to_front(&mut self) -> ShellResult<()> {
        if !self.exists {
            return Ok(());
        }
        if self.surface.is_minimized() {
            self.surface.restore()?;
        }
        self.surface.show()?;
        self.surface.focus()
    }

    pub fn deliver_route(&mut self, route: Route) -> ShellResult<()> {
        self.bring_to_front()?;
        self.notify(&UiNotification::Route(route))
    }

    /// Best effort: a missing window or a failed send is only logged.
    pub fn notify(&mut self, notification: &UiNotification) -> ShellResult<()> {
        if !self.exists {
            debug!(event = notification.event_name(), "no window to notify");
            return Ok(());
        }
        if let Err(error) = self.surface.send(notification) {
            warn!(event = notification.event_name(), %error, "failed to notify window");
        }
        Ok(())
    }

    pub fn mark_destroyed(&mut self) {
        if self.exists {
            debug!("main window destroyed");
        }
        self.exists = false;
        self.pending_route = None;
    }
}
