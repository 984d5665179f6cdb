use cohort_client::config::{AlertSettings, CacheSettings, ClientConfig};
use cohort_core::ConfigError;
use proptest::prelude::*;
use std::io::Write;
use std::time::Duration;

fn base_config() -> ClientConfig {
    ClientConfig {
        api_base_url: "http://localhost:8000".to_string(),
        request_timeout_ms: 5_000,
        cache: CacheSettings {
            validity_window_secs: 300,
            precompute_delay_ms: 2_000,
        },
        alerts: AlertSettings {
            poll_interval_ms: 30_000,
            min_consecutive: 2,
        },
        page_size: 20,
    }
}

fn invalid_field(config: &ClientConfig) -> Option<String> {
    match config.validate() {
        Err(ConfigError::InvalidValue { field, .. }) => Some(field),
        _ => None,
    }
}

#[test]
fn config_base_is_valid() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn config_requires_api_base_url() {
    let mut config = base_config();
    config.api_base_url = "  ".to_string();
    assert_eq!(invalid_field(&config).as_deref(), Some("api_base_url"));

    config.api_base_url = "localhost:8000".to_string();
    assert_eq!(invalid_field(&config).as_deref(), Some("api_base_url"));
}

#[test]
fn config_requires_positive_timeouts() {
    let mut config = base_config();
    config.request_timeout_ms = 0;
    assert_eq!(invalid_field(&config).as_deref(), Some("request_timeout_ms"));

    let mut config = base_config();
    config.alerts.poll_interval_ms = 0;
    assert_eq!(invalid_field(&config).as_deref(), Some("alerts.poll_interval_ms"));
}

#[test]
fn config_rejects_zero_validity_window() {
    let mut config = base_config();
    config.cache.validity_window_secs = 0;
    assert_eq!(
        invalid_field(&config).as_deref(),
        Some("cache.validity_window_secs")
    );
}

#[test]
fn config_allows_zero_precompute_delay() {
    let mut config = base_config();
    config.cache.precompute_delay_ms = 0;
    assert!(config.validate().is_ok());
    assert_eq!(config.cache_policy().precompute_delay, Duration::ZERO);
}

#[test]
fn config_cache_policy_from_settings() {
    let mut config = base_config();
    config.cache.validity_window_secs = 60;
    config.cache.precompute_delay_ms = 500;
    let policy = config.cache_policy();
    assert_eq!(policy.validity_window, Duration::from_secs(60));
    assert_eq!(policy.precompute_delay, Duration::from_millis(500));
}

#[test]
fn config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
api_base_url = "https://analytics.example.edu/"
request_timeout_ms = 10000
page_size = 50

[cache]
validity_window_secs = 120
precompute_delay_ms = 1500

[alerts]
poll_interval_ms = 60000
min_consecutive = 3
"#
    )
    .unwrap();

    let config = ClientConfig::from_path(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.page_size, 50);
    assert_eq!(config.alerts.min_consecutive, 3);
    assert_eq!(config.cache_policy().validity_window, Duration::from_secs(120));
    assert_eq!(config.alert_poll_interval(), Duration::from_secs(60));
}

#[test]
fn config_rejects_unknown_fields() {
    let result = ClientConfig::from_toml(
        r#"
api_base_url = "http://localhost:8000"
request_timeout_ms = 5000
theme = "dark"
"#,
    );
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
}

#[test]
fn config_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ClientConfig::from_path(&dir.path().join("missing.toml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

proptest! {
    #[test]
    fn prop_page_size_bounds(page_size in 0u32..200) {
        let mut config = base_config();
        config.page_size = page_size;
        prop_assert_eq!(config.validate().is_ok(), (1..=100).contains(&page_size));
    }

    #[test]
    fn prop_positive_window_is_valid(secs in 1u64..86_400) {
        let mut config = base_config();
        config.cache.validity_window_secs = secs;
        prop_assert!(config.validate().is_ok());
    }
}
