use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_base_url() -> String { crate::DEFAULT_API_URL.to_string() }
fn default_timeout() -> u64 { 30 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            token: None,
            token_file: None,
        }
    }
}

impl ApiConfig {
    /// Defaults overlaid with the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Environment wins over file values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(crate::API_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        if let Ok(token) = std::env::var(crate::TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.token = Some(token.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var(crate::TOKEN_FILE_ENV) {
            if !path.trim().is_empty() {
                self.token_file = Some(crate::expand_home(path.trim()));
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_training_jobs_secs")]
    pub training_jobs_secs: u64,
    #[serde(default = "default_pending_secs")]
    pub pending_secs: u64,
    #[serde(default = "default_health_secs")]
    pub health_secs: u64,
    #[serde(default = "default_refresh_delay_ms")]
    pub refresh_delay_ms: u64,
}

fn default_training_jobs_secs() -> u64 { 10 }
fn default_pending_secs() -> u64 { 30 }
fn default_health_secs() -> u64 { 30 }
fn default_refresh_delay_ms() -> u64 { 500 }

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            training_jobs_secs: default_training_jobs_secs(),
            pending_secs: default_pending_secs(),
            health_secs: default_health_secs(),
            refresh_delay_ms: default_refresh_delay_ms(),
        }
    }
}

impl PollingConfig {
    pub fn training_jobs_interval(&self) -> Duration {
        Duration::from_secs(self.training_jobs_secs.max(1))
    }

    pub fn pending_interval(&self) -> Duration {
        Duration::from_secs(self.pending_secs.max(1))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_secs.max(1))
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }
}

/// Load a YAML or TOML file, picked by extension.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path)),
        "toml" => toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path)),
        _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(default)]
        api: ApiConfig,
        #[serde(default)]
        polling: PollingConfig,
    }

    #[test]
    fn test_yaml_and_toml_share_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("c.yaml");
        fs::write(
            &yaml,
            "api:\n  base_url: http://backend:9000/api/v1\npolling:\n  training_jobs_secs: 5\n",
        )
        .unwrap();
        let cfg: Wrapper = load_file(&yaml).unwrap();
        assert_eq!(cfg.api.base_url, "http://backend:9000/api/v1");
        assert_eq!(cfg.api.timeout_secs, 30);
        assert_eq!(cfg.polling.training_jobs_interval(), Duration::from_secs(5));
        assert_eq!(cfg.polling.pending_interval(), Duration::from_secs(30));

        let toml_path = dir.path().join("c.toml");
        fs::write(&toml_path, "[polling]\nrefresh_delay_ms = 250\n").unwrap();
        let cfg: Wrapper = load_file(&toml_path).unwrap();
        assert_eq!(cfg.api.base_url, crate::DEFAULT_API_URL);
        assert_eq!(cfg.polling.refresh_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.ini");
        fs::write(&path, "x=1").unwrap();
        assert!(load_file::<Wrapper>(&path).is_err());
    }
}
