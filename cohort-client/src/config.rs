//! Configuration loading for the COHORT client.
//!
//! Connection settings are required. The `[cache]` and `[alerts]` tables
//! may be omitted and fall back to the defaults below.

use cohort_core::{CachePolicy, ConfigError, DEFAULT_PRECOMPUTE_DELAY, DEFAULT_VALIDITY_WINDOW};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "COHORT_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub validity_window_secs: u64,
    pub precompute_delay_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            validity_window_secs: DEFAULT_VALIDITY_WINDOW.as_secs(),
            precompute_delay_ms: DEFAULT_PRECOMPUTE_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertSettings {
    pub poll_interval_ms: u64,
    pub min_consecutive: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            min_consecutive: 2,
        }
    }
}

fn default_page_size() -> u32 {
    20
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args(std::env::args().skip(1))
            .or_else(config_path_from_env)
            .ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.cache.validity_window_secs == 0 {
            return Err(invalid("cache.validity_window_secs", "must be > 0"));
        }
        if self.alerts.poll_interval_ms == 0 {
            return Err(invalid("alerts.poll_interval_ms", "must be > 0"));
        }
        if self.alerts.min_consecutive == 0 {
            return Err(invalid("alerts.min_consecutive", "must be >= 1"));
        }
        if !(1..=100).contains(&self.page_size) {
            return Err(invalid("page_size", "must be between 1 and 100"));
        }
        self.cache_policy().validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn alert_poll_interval(&self) -> Duration {
        Duration::from_millis(self.alerts.poll_interval_ms)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::new()
            .with_validity_window(Duration::from_secs(self.cache.validity_window_secs))
            .with_precompute_delay(Duration::from_millis(self.cache.precompute_delay_ms))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args(mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_config_path_from_args() {
        assert_eq!(
            config_path_from_args(args(&["--config", "a.toml"])),
            Some(PathBuf::from("a.toml"))
        );
        assert_eq!(
            config_path_from_args(args(&["-v", "--config=b.toml"])),
            Some(PathBuf::from("b.toml"))
        );
        assert_eq!(config_path_from_args(args(&["--config"])), None);
        assert_eq!(config_path_from_args(args(&[])), None);
    }

    #[test]
    fn test_minimal_config_uses_default_policy() {
        let config = ClientConfig::from_toml(
            r#"
            api_base_url = "http://localhost:8000"
            request_timeout_ms = 5000
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.cache_policy(), CachePolicy::default());
        assert_eq!(config.page_size, 20);
        assert_eq!(config.alerts.min_consecutive, 2);
    }
}
