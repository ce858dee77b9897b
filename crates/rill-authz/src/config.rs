use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Settings for the grants cache and its background workers.
///
/// ```
/// use rill_authz::GrantsCacheConfig;
///
/// let config = GrantsCacheConfig::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantsCacheConfig {
    /// Period between background refresh runs. Zero disables refresh.
    pub refresh_period_seconds: u32,
    /// Number of concurrent upstream fetches during a refresh run.
    pub refresh_pool_size: usize,
    /// A cache entry not consulted for this long is skipped by refresh and
    /// eligible for eviction.
    pub max_idle_seconds: u32,
    /// Additional fetch attempts after a retriable failure.
    pub http_retries: u32,
    /// Period between garbage-collection runs.
    pub gc_period_seconds: u32,
}

impl Default for GrantsCacheConfig {
    fn default() -> Self {
        Self {
            refresh_period_seconds: 60,
            refresh_pool_size: 5,
            max_idle_seconds: 300,
            http_retries: 0,
            gc_period_seconds: 300,
        }
    }
}

impl GrantsCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_pool_size < 1 {
            return Err(ConfigError("refresh_pool_size must be >= 1".to_string()));
        }
        if self.max_idle_seconds == 0 {
            return Err(ConfigError("max_idle_seconds must be > 0".to_string()));
        }
        if self.gc_period_seconds == 0 {
            return Err(ConfigError("gc_period_seconds must be > 0".to_string()));
        }
        Ok(())
    }
}
