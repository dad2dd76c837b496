use anyhow::Result;
use common::{ApiConfig, PollingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::notifier::NotificationChannel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Main log file; the system path, then the per-user fallback, when unset
    pub output: Option<PathBuf>,
    /// Job and health transitions
    pub events_output: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
            events_output: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus text file rewritten after every overview tick
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifications: Vec<NotificationChannel>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load a `.yaml`, `.yml` or `.toml` file; the environment overrides the `api` section.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config: Config = common::config::load_file(path)?;
        config.api.apply_env();
        Ok(config)
    }

    /// Explicit path, else the system file, else the per-user file, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for candidate in [
            PathBuf::from(common::DEFAULT_CONFIG_PATH),
            common::expand_home(common::USER_CONFIG_PATH),
        ] {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }
        let mut config = Config::default();
        config.api.apply_env();
        Ok(config)
    }

    /// Effective configuration with the token masked.
    pub fn to_yaml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.api.token.is_some() {
            shown.api.token = Some("********".to_string());
        }
        Ok(serde_yaml::to_string(&shown)?)
    }
}
