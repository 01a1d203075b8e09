use std::time::Duration;

use crate::error::ConfigError;

/// Connection settings for the shared store.
///
/// Loaded once at process start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Whether the store is used at all. `StoreManager::initialize` refuses a disabled config.
    pub is_enabled: bool,
    /// Whether server/player presence is synchronized through the store.
    pub sync_bungee_data_using_redis: bool,
    pub host: String,
    pub port: u16,
    pub use_pass: bool,
    pub pass: String,
    /// Upper bound on in-flight operations across the pool.
    pub pool_max_total: usize,
    pub pool_max_idle: usize,
    /// Connections opened eagerly (at least one).
    pub pool_min_idle: usize,
    /// Whether the liveness check pings every pooled connection instead of one.
    pub pool_test_while_idle: bool,
    /// Bound on connection creation and on waiting for a pool slot.
    pub connect_timeout: Duration,
    /// Period of the liveness check, and the base of the reconnect backoff.
    pub liveness_interval: Duration,
    /// Cap of the reconnect backoff.
    pub backoff_max: Duration,
    /// Consecutive failed checks after which sync is reported as failed instead of degraded.
    pub failure_threshold: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            is_enabled: false,
            sync_bungee_data_using_redis: false,
            host: "localhost".to_string(),
            port: 6379,
            use_pass: false,
            pass: "password".to_string(),
            pool_max_total: 50,
            pool_max_idle: 50,
            pool_min_idle: 8,
            pool_test_while_idle: true,
            connect_timeout: Duration::from_millis(3000),
            liveness_interval: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
            failure_threshold: 5,
        }
    }
}

impl ConnectionConfig {
    /// Check the pool sizing and timeouts for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host cannot be empty".to_string()));
        }
        if self.pool_max_total == 0 {
            return Err(ConfigError::Invalid("pool max total must be at least 1".to_string()));
        }
        if self.pool_max_idle > self.pool_max_total {
            return Err(ConfigError::Invalid(format!(
                "pool max idle ({}) exceeds pool max total ({})",
                self.pool_max_idle, self.pool_max_total
            )));
        }
        if self.pool_min_idle > self.pool_max_idle {
            return Err(ConfigError::Invalid(format!(
                "pool min idle ({}) exceeds pool max idle ({})",
                self.pool_min_idle, self.pool_max_idle
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid("connect timeout cannot be zero".to_string()));
        }
        if self.liveness_interval.is_zero() {
            return Err(ConfigError::Invalid("liveness interval cannot be zero".to_string()));
        }
        if self.backoff_max < self.liveness_interval {
            return Err(ConfigError::Invalid(
                "backoff cap cannot be shorter than the liveness interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of connections the pool keeps open.
    pub fn pool_size(&self) -> usize {
        self.pool_min_idle.max(1)
    }
}
