use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigError;

pub const DEFAULT_PORT: u16 = 8545;

/// Settings for the supervised node, read from `~/.crybro/config.json`.
///
/// Every field is optional in the file; anything missing falls back to the
/// values Foundry's `anvil` expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub node_binary: String,
    /// Arguments placed before `--version` / `--port`.
    pub node_args: Vec<String>,
    pub default_port: u16,
    pub capture_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    /// Where node output is written; `~/.crybro` when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_binary: "anvil".to_string(),
            node_args: Vec::new(),
            default_port: DEFAULT_PORT,
            capture_timeout_secs: 10,
            stop_timeout_secs: 5,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the default location if there is
    /// one. A missing default file just means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Merged stdout/stderr of the node listening on `port`.
    pub fn node_log(&self, port: u16) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(crybro_dir)
            .join(format!("anvil-{}.log", port))
    }
}

/// `~/.crybro`, falling back to the working directory when there is no home.
pub fn crybro_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".crybro")
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".crybro").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "default_port": 9545, "node_binary": "/opt/foundry/anvil" }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.default_port, 9545);
        assert_eq!(config.node_binary, "/opt/foundry/anvil");
        assert_eq!(config.capture_timeout(), Duration::from_secs(10));
        assert_eq!(config.stop_timeout(), Duration::from_secs(5));
        assert!(config.node_args.is_empty());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_node_log_is_per_port() {
        let config = Config {
            log_dir: Some(PathBuf::from("/tmp/crybro-logs")),
            ..Config::default()
        };

        assert_eq!(config.node_log(8545), PathBuf::from("/tmp/crybro-logs/anvil-8545.log"));
        assert_ne!(config.node_log(8545), config.node_log(9545));
        assert!(Config::default().node_log(8545).ends_with(".crybro/anvil-8545.log"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");

        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Read { .. })));
    }
}
