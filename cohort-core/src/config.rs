//! Cache policy configuration

use crate::ConfigError;
use std::time::Duration;

/// How long a fetched aggregate stays valid.
pub const DEFAULT_VALIDITY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How long a view waits after activation before warming a cache.
pub const DEFAULT_PRECOMPUTE_DELAY: Duration = Duration::from_secs(2);

/// Staleness and warm-up policy for one shared aggregate cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Entries older than this are stale and refetched on the next read.
    pub validity_window: Duration,
    /// Delay before an opportunistic background precompute fires.
    pub precompute_delay: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            validity_window: DEFAULT_VALIDITY_WINDOW,
            precompute_delay: DEFAULT_PRECOMPUTE_DELAY,
        }
    }
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the validity window.
    pub fn with_validity_window(mut self, window: Duration) -> Self {
        self.validity_window = window;
        self
    }

    /// Set the precompute delay.
    pub fn with_precompute_delay(mut self, delay: Duration) -> Self {
        self.precompute_delay = delay;
        self
    }

    /// A zero window would make every read a fetch, which defeats the cache.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validity_window.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "validity_window".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_constants() {
        let policy = CachePolicy::default();
        assert_eq!(policy.validity_window, Duration::from_secs(300));
        assert_eq!(policy.precompute_delay, Duration::from_secs(2));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_builder() {
        let policy = CachePolicy::new()
            .with_validity_window(Duration::from_secs(60))
            .with_precompute_delay(Duration::from_millis(500));
        assert_eq!(policy.validity_window, Duration::from_secs(60));
        assert_eq!(policy.precompute_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_zero_window_rejected() {
        let policy = CachePolicy::new().with_validity_window(Duration::ZERO);
        assert!(policy.validate().is_err());
    }
}
