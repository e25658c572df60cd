use std::time::Duration;

use tokio::time::timeout;

use crate::{
    app_constants::{BACKEND_ANNOUNCEMENT_MARKER, BACKEND_READY_POLL_INTERVAL},
    BackendAddress,
};

/// How the supervisor learns that the backend is ready and where it listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// The backend prints `<marker> <address>` on stdout once it is bound.
    Announcement { marker: String },
    /// The address is known up front; ready once it accepts connections.
    HealthCheck {
        address: BackendAddress,
        interval: Duration,
    },
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::Announcement {
            marker: BACKEND_ANNOUNCEMENT_MARKER.to_string(),
        }
    }
}

impl ReadinessProbe {
    pub fn health_check(address: BackendAddress) -> Self {
        Self::HealthCheck {
            address,
            interval: BACKEND_READY_POLL_INTERVAL,
        }
    }

    pub fn reads_announcement(&self) -> bool {
        matches!(self, Self::Announcement { .. })
    }

    /// Address announced on `line`, if it is the readiness line.
    pub fn address_from_line(&self, line: &str) -> Option<BackendAddress> {
        let Self::Announcement { marker } = self else {
            return None;
        };
        let (_, rest) = line.split_once(marker.as_str())?;
        rest.split_whitespace().next()?.parse().ok()
    }
}

/// Whether something accepts connections at `address` within `limit`.
pub async fn ping_backend(address: &BackendAddress, limit: Duration) -> bool {
    let limit = limit.max(Duration::from_millis(50));
    match address {
        BackendAddress::Tcp { host, port } => matches!(
            timeout(limit, tokio::net::TcpStream::connect((host.as_str(), *port))).await,
            Ok(Ok(_))
        ),
        #[cfg(unix)]
        BackendAddress::Socket(path) => matches!(
            timeout(limit, tokio::net::UnixStream::connect(path)).await,
            Ok(Ok(_))
        ),
        #[cfg(not(unix))]
        BackendAddress::Socket(_) => false,
    }
}
