use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const PLACEHOLDER_API_KEY: &str = "steam api key";

const DEBUG_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Daemon configuration, read from `config.json`. Keys stay camelCase so
/// config files from earlier deployments keep working; keys we no longer
/// use (old chat-bot credentials) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_key: String,
    pub interval_minutes: u64,
    pub webhook_url: String,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            interval_minutes: 60,
            webhook_url: String::new(),
            debug: false,
        }
    }
}

impl Config {
    /// Debug mode polls every minute and raises log verbosity; it never
    /// changes what a cycle does.
    pub fn poll_interval(&self) -> Duration {
        if self.debug {
            DEBUG_POLL_INTERVAL
        } else {
            Duration::from_secs(self.interval_minutes.max(1) * 60)
        }
    }

    pub fn is_unconfigured(&self) -> bool {
        self.api_key.trim().is_empty() || self.api_key == PLACEHOLDER_API_KEY
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("config serialize error: {0}")]
    Serialize(serde_json::Error),
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadedConfig {
    Ready(Config),
    /// No config existed; a default one was written for the operator to
    /// fill in.
    Initialized(PathBuf),
}

pub fn load_or_init(path: &Path) -> Result<LoadedConfig, ConfigError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload =
            serde_json::to_string_pretty(&Config::default()).map_err(ConfigError::Serialize)?;
        fs::write(path, payload)?;
        return Ok(LoadedConfig::Initialized(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LoadedConfig::Ready(config))
}
