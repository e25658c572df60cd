use semver::Version;
use serde::Serialize;
use tracing::{debug, info};

use crate::app_constants::DEFAULT_UPDATE_CHANNEL;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    pub is_updating: bool,
    pub pending_channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequest {
    /// Not updating: persist and use the channel right away.
    Apply(String),
    /// An update is in flight; the channel is applied once it finishes.
    Queued,
}

/// Tracks the update channel and whether an update is being downloaded.
#[derive(Debug, Clone)]
pub struct UpdateCoordinator {
    channel: String,
    state: UpdateState,
}

impl UpdateCoordinator {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            state: UpdateState::default(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn is_updating(&self) -> bool {
        self.state.is_updating
    }

    pub fn request_channel(&mut self, channel: impl Into<String>) -> ChannelRequest {
        let channel = channel.into();
        if self.state.is_updating {
            if let Some(previous) = self.state.pending_channel.replace(channel) {
                debug!(%previous, "replacing queued update channel");
            }
            return ChannelRequest::Queued;
        }
        ChannelRequest::Apply(channel)
    }

    /// Record a channel that has been persisted.
    pub fn channel_applied(&mut self, channel: impl Into<String>) {
        self.channel = channel.into();
        info!(channel = %self.channel, "update channel set");
    }

    pub fn begin_update(&mut self) {
        self.state.is_updating = true;
    }

    /// Ends the update and hands back the channel queued meanwhile, if any.
    pub fn finish_update(&mut self) -> Option<String> {
        self.state.is_updating = false;
        self.state.pending_channel.take()
    }
}

/// Channel a fresh install follows: pre-release builds stay on their track.
pub fn default_channel_for(version: &str) -> String {
    let Ok(version) = Version::parse(version.trim_start_matches('v')) else {
        return DEFAULT_UPDATE_CHANNEL.to_string();
    };
    let pre = version.pre.as_str();
    ["alpha", "beta"]
        .into_iter()
        .find(|track| pre.starts_with(track))
        .unwrap_or(DEFAULT_UPDATE_CHANNEL)
        .to_string()
}
