//! Connection lifecycle: initialization, reconnects, liveness and health status.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{ConfigError, Result, StoreError};
use crate::memory::MemoryStore;
use crate::pool::RedisPool;
use crate::{Backend, Store};

/// Health of the presence sync connection, for the host's health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Connected,
    /// Liveness checks are failing; reconnects are being retried.
    Degraded { consecutive_failures: u32 },
    /// Failures reached the configured threshold. Retries continue at the backoff cap.
    Failed { consecutive_failures: u32 },
    Shutdown,
}

impl SyncStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SyncStatus::Connected)
    }

    fn after_failures(consecutive_failures: u32, threshold: u32) -> Self {
        if consecutive_failures >= threshold {
            SyncStatus::Failed {
                consecutive_failures,
            }
        } else {
            SyncStatus::Degraded {
                consecutive_failures,
            }
        }
    }
}

/// Delay before the next liveness check: `base * 2^failures`, capped at `cap`.
pub fn backoff_delay(base: Duration, cap: Duration, failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

enum Connector {
    Redis,
    Memory(MemoryStore),
}

impl Connector {
    /// Build a backend and verify it answers a ping.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Backend> {
        match self {
            Connector::Redis => {
                let pool = RedisPool::connect(config).await?;
                if !pool.ping().await? {
                    return Err(StoreError::Unavailable);
                }
                Ok(Backend::Redis(pool))
            }
            Connector::Memory(memory) => {
                if !memory.is_available() {
                    return Err(StoreError::Unavailable);
                }
                Ok(Backend::Memory(memory.clone()))
            }
        }
    }
}

/// Owns the connection config and the store's backend for the life of the process.
pub struct StoreManager {
    config: ConnectionConfig,
    connector: Connector,
    store: Store,
    status: watch::Sender<SyncStatus>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

impl StoreManager {
    /// Connect to Redis. Fails with `ConfigError::Disabled` when the config is disabled.
    pub async fn initialize(config: ConnectionConfig) -> Result<Self> {
        Self::start(config, Connector::Redis).await
    }

    /// Same lifecycle over an in-memory backend.
    pub async fn with_memory(config: ConnectionConfig, memory: MemoryStore) -> Result<Self> {
        Self::start(config, Connector::Memory(memory)).await
    }

    async fn start(config: ConnectionConfig, connector: Connector) -> Result<Self> {
        if !config.is_enabled {
            return Err(ConfigError::Disabled.into());
        }
        config.validate()?;

        let backend = connector.connect(&config).await?;
        let store = Store::uninitialized();
        store.install(backend);
        let (status, _) = watch::channel(SyncStatus::Connected);

        info!(host = %config.host, port = config.port, "store initialized");
        Ok(Self {
            config,
            connector,
            store,
            status,
            cancel: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Handle to the managed store. Stays valid across reconnects.
    pub fn store(&self) -> Store {
        self.store.clone()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst) && self.store.is_connected()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Token cancelled on shutdown. Background tasks tied to the store should use a child of it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Rebuild the backend. Without `force`, nothing happens while the store answers.
    /// Returns whether a new backend was installed.
    pub async fn reconnect(&self, force: bool) -> Result<bool> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(StoreError::NotInitialized);
        }
        if !force && self.store.ping().await.unwrap_or(false) {
            return Ok(false);
        }
        let backend = self.connector.connect(&self.config).await?;
        self.store.install(backend);
        info!(host = %self.config.host, port = self.config.port, "store reconnected");
        Ok(true)
    }

    /// Release the backend and stop background tasks. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.store.take();
        self.status.send_replace(SyncStatus::Shutdown);
        info!("store connection closed");
    }

    /// Start the periodic liveness check. It ends when the manager shuts down.
    pub fn spawn_liveness(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move { manager.run_liveness(cancel).await })
    }

    async fn run_liveness(&self, cancel: CancellationToken) {
        let interval = self.config.liveness_interval;
        let mut failures: u32 = 0;
        loop {
            let delay = backoff_delay(interval, self.config.backoff_max, failures);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if self.check_liveness().await {
                if failures > 0 {
                    info!(failures, "store connection recovered");
                }
                failures = 0;
                self.status.send_replace(SyncStatus::Connected);
            } else {
                failures = failures.saturating_add(1);
                let status = SyncStatus::after_failures(failures, self.config.failure_threshold);
                if matches!(status, SyncStatus::Failed { .. }) {
                    warn!(failures, "presence sync failed, store unreachable");
                } else {
                    warn!(failures, "presence sync degraded");
                }
                self.status.send_replace(status);
            }
        }
        debug!("liveness task stopped");
    }

    /// One liveness probe: a ping bounded by the connect timeout, then a forced
    /// reconnect if the ping fails. `pool_test_while_idle` widens the ping to every
    /// pooled connection.
    async fn check_liveness(&self) -> bool {
        let ping = async {
            if self.config.pool_test_while_idle {
                self.store.ping_all().await
            } else {
                self.store.ping().await
            }
        };
        match tokio::time::timeout(self.config.connect_timeout, ping).await {
            Ok(Ok(true)) => return true,
            Ok(Ok(false)) => debug!("store did not answer ping"),
            Ok(Err(e)) => debug!(error = %e, "store ping failed"),
            Err(_) => debug!("store ping timed out"),
        }
        match tokio::time::timeout(self.config.connect_timeout, self.reconnect(true)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "reconnect attempt failed");
                false
            }
            Err(_) => {
                debug!("reconnect attempt timed out");
                false
            }
        }
    }
}
