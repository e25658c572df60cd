use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Where the backend can be reached once it is ready.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendAddress {
    Tcp { host: String, port: u16 },
    Socket(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid backend address '{raw}': {reason}")]
pub struct AddressParseError {
    raw: String,
    reason: &'static str,
}

impl AddressParseError {
    fn new(raw: &str, reason: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }
}

impl FromStr for BackendAddress {
    type Err = AddressParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressParseError::new(raw, "address is empty"));
        }

        if let Some(path) = trimmed.strip_prefix("unix://") {
            return socket_path(raw, path);
        }
        if trimmed.contains("://") {
            return from_url(raw, trimmed);
        }
        if trimmed.starts_with('/') || trimmed.starts_with(r"\\.\pipe\") {
            return socket_path(raw, trimmed);
        }

        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::new(raw, "expected host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressParseError::new(raw, "host is empty"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressParseError::new(raw, "port is not a number between 0 and 65535"))?;

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

fn socket_path(raw: &str, path: &str) -> Result<BackendAddress, AddressParseError> {
    if path.is_empty() {
        return Err(AddressParseError::new(raw, "socket path is empty"));
    }
    Ok(BackendAddress::Socket(PathBuf::from(path)))
}

fn from_url(raw: &str, trimmed: &str) -> Result<BackendAddress, AddressParseError> {
    let parsed = Url::parse(trimmed).map_err(|_| AddressParseError::new(raw, "malformed url"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AddressParseError::new(raw, "url has no host"))?;
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| AddressParseError::new(raw, "url has no port"))?;

    Ok(BackendAddress::Tcp {
        host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
        port,
    })
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Socket(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Serialize for BackendAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
