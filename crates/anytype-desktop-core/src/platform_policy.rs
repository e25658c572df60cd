use crate::WindowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    HideWindow,
    QuitApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Let the toolkit close the window.
    Allow,
    HideWindow,
    QuitApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateAction {
    CreateWindow,
    ShowWindow,
}

/// Window semantics of the host OS, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformPolicy {
    pub close_behavior: CloseBehavior,
    pub deep_links_in_argv: bool,
}

impl PlatformPolicy {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::macos()
        } else if cfg!(target_os = "windows") {
            Self::windows()
        } else {
            Self::linux()
        }
    }

    /// Closing hides; the app lives on in the dock and links arrive as
    /// open-url events.
    pub fn macos() -> Self {
        Self {
            close_behavior: CloseBehavior::HideWindow,
            deep_links_in_argv: false,
        }
    }

    pub fn windows() -> Self {
        Self {
            close_behavior: CloseBehavior::HideWindow,
            deep_links_in_argv: true,
        }
    }

    pub fn linux() -> Self {
        Self {
            close_behavior: CloseBehavior::QuitApp,
            deep_links_in_argv: true,
        }
    }

    pub fn on_close_requested(&self, shutting_down: bool) -> CloseAction {
        if shutting_down {
            return CloseAction::Allow;
        }
        match self.close_behavior {
            CloseBehavior::HideWindow => CloseAction::HideWindow,
            CloseBehavior::QuitApp => CloseAction::QuitApp,
        }
    }

    pub fn on_all_windows_closed(&self) -> bool {
        self.close_behavior == CloseBehavior::QuitApp
    }

    pub fn on_activate(&self, window: &WindowState) -> ActivateAction {
        if window.exists {
            ActivateAction::ShowWindow
        } else {
            ActivateAction::CreateWindow
        }
    }

    pub fn deep_links_in_argv(&self) -> bool {
        self.deep_links_in_argv
    }
}
