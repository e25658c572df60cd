use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{app_constants::CONFIG_CHANNEL_KEY, runtime_paths, ShellError, ShellResult};

/// Option name → value, in insertion order.
pub type ConfigMap = Map<String, Value>;

/// Small JSON key/value blob persisted under the data directory.
///
/// Loaded once at startup. Mutations go through [`ConfigStore::set`], which
/// only updates the in-memory copy after the file has been written.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: ConfigMap,
}

impl ConfigStore {
    pub fn load(data_dir: &Path) -> Self {
        Self::load_from(runtime_paths::config_path(data_dir))
    }

    pub fn load_from(path: PathBuf) -> Self {
        let values = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    warn!(path = %path.display(), "config has non-object root; starting empty");
                    ConfigMap::new()
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to parse config; starting empty");
                    ConfigMap::new()
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file yet");
                ConfigMap::new()
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to read config; starting empty");
                ConfigMap::new()
            }
        };

        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> &ConfigMap {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn channel(&self) -> Option<&str> {
        self.get(CONFIG_CHANNEL_KEY).and_then(Value::as_str)
    }

    /// Merge `patch` into the config and persist it. A `null` value removes
    /// the key. On failure the in-memory config is left untouched.
    pub fn set(&mut self, patch: ConfigMap) -> ShellResult<&ConfigMap> {
        let mut next = self.values.clone();
        for (key, value) in patch {
            if value.is_null() {
                next.remove(&key);
            } else {
                next.insert(key, value);
            }
        }

        self.persist(&next)?;
        self.values = next;
        Ok(&self.values)
    }

    fn persist(&self, values: &ConfigMap) -> ShellResult<()> {
        let persist_error = |reason: String| ShellError::ConfigPersist {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                persist_error(format!(
                    "failed to create config directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let serialized = serde_json::to_string_pretty(values)
            .map_err(|error| persist_error(format!("failed to serialize config: {error}")))?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized)
            .map_err(|error| persist_error(format!("failed to write staging file: {error}")))?;
        fs::rename(&staging, &self.path).map_err(|error| {
            let _ = fs::remove_file(&staging);
            persist_error(format!("failed to replace config file: {error}"))
        })?;

        Ok(())
    }
}
