use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::{app_constants::DEEP_LINK_SCHEME, DeepLinkError};

/// A parsed `anytype://` invocation, ready for the UI router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub target: String,
    pub params: BTreeMap<String, String>,
    pub raw: String,
}

impl Route {
    pub fn parse(raw: &str, scheme: &str) -> Result<Self, DeepLinkError> {
        let trimmed = raw.trim();
        let prefix = format!("{scheme}://");
        let has_scheme = trimmed
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&prefix));
        if !has_scheme {
            return Err(DeepLinkError::ForeignScheme(scheme.to_string()));
        }

        let parsed =
            Url::parse(trimmed).map_err(|error| DeepLinkError::Malformed(error.to_string()))?;

        let host = parsed.host_str().unwrap_or_default();
        let target = format!("{host}{}", parsed.path())
            .trim_matches('/')
            .to_string();
        let params = parsed
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Ok(Self {
            target,
            params,
            raw: trimmed.to_string(),
        })
    }

    pub fn path(&self) -> String {
        format!("/{}", self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Deliver(Route),
    Buffered,
    Ignored,
}

/// Holds at most one link that arrived before the main window existed.
#[derive(Debug, Clone)]
pub struct DeepLinkRouter {
    scheme: String,
    pending: Option<String>,
}

impl Default for DeepLinkRouter {
    fn default() -> Self {
        Self::new(DEEP_LINK_SCHEME)
    }
}

impl DeepLinkRouter {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            pending: None,
        }
    }

    pub fn parse(&self, url: &str) -> Option<Route> {
        match Route::parse(url, &self.scheme) {
            Ok(route) => Some(route),
            Err(error) => {
                debug!(url, %error, "dropping deep link");
                None
            }
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        Route::parse(url, &self.scheme).is_ok()
    }

    /// First argument that is one of our links. Used for argv forwarded by a
    /// second instance and for the initial launch arguments.
    pub fn find_in_args<S: AsRef<str>>(&self, args: &[S]) -> Option<String> {
        args.iter()
            .map(AsRef::as_ref)
            .find(|arg| self.matches(arg))
            .map(|arg| arg.trim().to_string())
    }

    pub fn route(&mut self, window_exists: bool, url: &str) -> RouteOutcome {
        let Some(route) = self.parse(url) else {
            return RouteOutcome::Ignored;
        };

        if window_exists {
            return RouteOutcome::Deliver(route);
        }

        if let Some(previous) = self.pending.replace(route.raw) {
            debug!(%previous, "replacing buffered deep link");
        }
        RouteOutcome::Buffered
    }

    pub fn take_pending(&mut self) -> Option<Route> {
        let raw = self.pending.take()?;
        self.parse(&raw)
    }
}
