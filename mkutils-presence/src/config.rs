use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;
use mkutils_store::ConnectionConfig;

use crate::keyspace::DEFAULT_NAMESPACE;
use crate::models::HostRole;

/// Sidecar configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Which side of the network the host process is
    /// Env: MKUTILS_ROLE (default: "server", or "proxy")
    pub role: HostRole,

    /// Name of the game server this sidecar announces
    /// Env: MKUTILS_SERVER_NAME (default: "lobby-1")
    pub server_name: String,

    /// Prefix of every store key and relay channel
    /// Env: MKUTILS_NAMESPACE (default: "mkUtils")
    pub namespace: String,

    /// Log game servers powering on and off (proxy only)
    /// Env: MKUTILS_LOG_POWER_ACTIONS (default: false)
    pub log_power_actions: bool,

    /// Server port
    /// Env: PORT (default: 3710)
    pub port: u16,

    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 1048576 = 1MB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Relay actions kept for the host before the oldest is dropped
    /// Env: OUTBOX_CAPACITY (default: 1024)
    pub outbox_capacity: usize,

    /// Store connection settings (REDIS_* variables)
    pub redis: ConnectionConfig,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv();
        let defaults = Self::default();
        Self {
            role: env_or_default("MKUTILS_ROLE", defaults.role),
            server_name: env_or_default_string("MKUTILS_SERVER_NAME", &defaults.server_name),
            namespace: env_or_default_string("MKUTILS_NAMESPACE", &defaults.namespace),
            log_power_actions: env_or_default("MKUTILS_LOG_POWER_ACTIONS", defaults.log_power_actions),
            port: env_or_default("PORT", defaults.port),
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", defaults.request_body_limit),
            request_timeout: Duration::from_secs(env_or_default(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            outbox_capacity: env_or_default("OUTBOX_CAPACITY", defaults.outbox_capacity),
            redis: redis_from_env(defaults.redis),
        }
    }

    /// Whether this process owns a presence entry in the store.
    pub fn owns_presence(&self) -> bool {
        self.role == HostRole::GameServer && self.redis.sync_bungee_data_using_redis
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: HostRole::GameServer,
            server_name: "lobby-1".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            log_power_actions: false,
            port: 3710,
            request_body_limit: 1024 * 1024, // 1 MB
            request_timeout: Duration::from_secs(30),
            outbox_capacity: 1024,
            redis: ConnectionConfig::default(),
        }
    }
}

fn redis_from_env(defaults: ConnectionConfig) -> ConnectionConfig {
    ConnectionConfig {
        is_enabled: env_or_default("REDIS_ENABLED", defaults.is_enabled),
        sync_bungee_data_using_redis: env_or_default(
            "REDIS_SYNC_BUNGEE_DATA",
            defaults.sync_bungee_data_using_redis,
        ),
        host: env_or_default_string("REDIS_HOST", &defaults.host),
        port: env_or_default("REDIS_PORT", defaults.port),
        use_pass: env_or_default("REDIS_USE_PASS", defaults.use_pass),
        pass: env_or_default_string("REDIS_PASS", &defaults.pass),
        pool_max_total: env_or_default("REDIS_POOL_MAX_CLIENTS", defaults.pool_max_total),
        pool_max_idle: env_or_default("REDIS_POOL_MAX_IDLE", defaults.pool_max_idle),
        pool_min_idle: env_or_default("REDIS_POOL_MIN_IDLE", defaults.pool_min_idle),
        pool_test_while_idle: env_or_default(
            "REDIS_POOL_TEST_WHILE_IDLE",
            defaults.pool_test_while_idle,
        ),
        connect_timeout: Duration::from_millis(env_or_default(
            "REDIS_TIMEOUT_MS",
            defaults.connect_timeout.as_millis() as u64,
        )),
        liveness_interval: Duration::from_secs(env_or_default(
            "REDIS_LIVENESS_INTERVAL_SECS",
            defaults.liveness_interval.as_secs(),
        )),
        backoff_max: Duration::from_secs(env_or_default(
            "REDIS_BACKOFF_MAX_SECS",
            defaults.backoff_max.as_secs(),
        )),
        failure_threshold: env_or_default("REDIS_FAILURE_THRESHOLD", defaults.failure_threshold),
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
