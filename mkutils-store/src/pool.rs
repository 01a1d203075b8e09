//! Redis backend: a small round-robin pool of auto-reconnecting multiplexed
//! connections, with a semaphore bounding in-flight operations.
//!
//! Every command is bounded by the connect timeout, so a server that stops
//! answering surfaces as `StoreError::Timeout` instead of a hung caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionInfo, IntoConnectionInfo};
use tokio::sync::{Semaphore, SemaphorePermit, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Result, StoreError};
use crate::models::{StoreMessage, Subscription};

struct PoolInner {
    client: redis::Client,
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
    permits: Semaphore,
    acquire_timeout: Duration,
    command_timeout: Duration,
}

#[derive(Clone)]
pub(crate) struct RedisPool {
    inner: Arc<PoolInner>,
}

fn connection_info(config: &ConnectionConfig) -> Result<ConnectionInfo> {
    let mut info = format!("redis://{}:{}/", config.host, config.port).into_connection_info()?;
    if config.use_pass {
        info.redis.password = Some(config.pass.clone());
    }
    Ok(info)
}

impl RedisPool {
    /// Open `config.pool_size()` connections, each bounded by the connect timeout.
    pub(crate) async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let client = redis::Client::open(connection_info(config)?)?;
        let size = config.pool_size();
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let manager = timeout(config.connect_timeout, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| StoreError::Timeout)??;
            connections.push(manager);
        }

        info!(
            host = %config.host,
            port = config.port,
            connections = size,
            max_total = config.pool_max_total,
            "redis pool connected"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                client,
                connections,
                next: AtomicUsize::new(0),
                permits: Semaphore::new(config.pool_max_total),
                acquire_timeout: config.connect_timeout,
                command_timeout: config.connect_timeout,
            }),
        })
    }

    async fn conn(&self) -> Result<(SemaphorePermit<'_>, ConnectionManager)> {
        let permit = timeout(self.inner.acquire_timeout, self.inner.permits.acquire())
            .await
            .map_err(|_| StoreError::PoolExhausted)?
            .map_err(|_| StoreError::PoolExhausted)?;
        let index = self.inner.next.fetch_add(1, Ordering::Relaxed) % self.inner.connections.len();
        Ok((permit, self.inner.connections[index].clone()))
    }

    async fn bounded<T>(&self, command: impl Future<Output = redis::RedisResult<T>>) -> Result<T> {
        timeout(self.inner.command_timeout, command)
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(StoreError::from)
    }

    async fn ping_connection(&self, mut conn: ConnectionManager) -> bool {
        let pong: Result<String> = self.bounded(redis::cmd("PING").query_async(&mut conn)).await;
        match pong {
            Ok(reply) => reply == "PONG",
            Err(e) => {
                debug!(error = %e, "redis ping failed");
                false
            }
        }
    }

    pub(crate) async fn ping(&self) -> Result<bool> {
        let (_permit, conn) = self.conn().await?;
        Ok(self.ping_connection(conn).await)
    }

    /// Ping every pooled connection, not just the next one in rotation.
    pub(crate) async fn ping_all(&self) -> Result<bool> {
        for conn in &self.inner.connections {
            let _permit = timeout(self.inner.acquire_timeout, self.inner.permits.acquire())
                .await
                .map_err(|_| StoreError::PoolExhausted)?
                .map_err(|_| StoreError::PoolExhausted)?;
            if !self.ping_connection(conn.clone()).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>> {
        let (_permit, mut conn) = self.conn().await?;
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    pub(crate) async fn get_all(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let (_permit, mut conn) = self.conn().await?;
        let values: Vec<Option<String>> = self
            .bounded(redis::cmd("MGET").arg(keys).query_async(&mut conn))
            .await?;
        Ok(values)
    }

    pub(crate) async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (_permit, mut conn) = self.conn().await?;
        let _: () = self.bounded(conn.set(key, value)).await?;
        Ok(())
    }

    pub(crate) async fn exists(&self, keys: &[&str]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let (_permit, mut conn) = self.conn().await?;
        let found: usize = self
            .bounded(redis::cmd("EXISTS").arg(keys).query_async(&mut conn))
            .await?;
        Ok(found)
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<bool> {
        let (_permit, mut conn) = self.conn().await?;
        let removed: usize = self.bounded(conn.del(key)).await?;
        Ok(removed > 0)
    }

    pub(crate) async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let (_permit, mut conn) = self.conn().await?;
        let value: i64 = self.bounded(conn.incr(key, delta)).await?;
        Ok(value)
    }

    pub(crate) async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let (_permit, mut conn) = self.conn().await?;
        let map: HashMap<String, String> = self.bounded(conn.hgetall(key)).await?;
        Ok(map)
    }

    pub(crate) async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let (_permit, mut conn) = self.conn().await?;
        let value: Option<String> = self.bounded(conn.hget(key, field)).await?;
        Ok(value)
    }

    pub(crate) async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let (_permit, mut conn) = self.conn().await?;
        let _: () = self.bounded(conn.hset_multiple(key, fields)).await?;
        Ok(())
    }

    pub(crate) async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let (_permit, mut conn) = self.conn().await?;
        let set: bool = self.bounded(conn.hset_nx(key, field, value)).await?;
        Ok(set)
    }

    pub(crate) async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        let (_permit, mut conn) = self.conn().await?;
        let removed: usize = self.bounded(conn.hdel(key, field)).await?;
        Ok(removed > 0)
    }

    pub(crate) async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        let (_permit, mut conn) = self.conn().await?;
        let receivers: usize = self.bounded(conn.publish(channel, payload)).await?;
        Ok(receivers)
    }

    /// Subscribe on a dedicated connection. Messages are forwarded by a background
    /// task that ends when the connection drops or the subscription is dropped.
    pub(crate) async fn subscribe(&self, channels: &[&str]) -> Result<Subscription> {
        let mut pubsub = timeout(self.inner.acquire_timeout, self.inner.client.get_async_pubsub())
            .await
            .map_err(|_| StoreError::Timeout)??;
        for channel in channels {
            self.bounded(pubsub.subscribe(*channel)).await?;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let channel = msg.get_channel_name().to_string();
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        if sender.send(StoreMessage { channel, payload }).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(%channel, error = %e, "dropping non-text pub/sub payload"),
                }
            }
            debug!("redis subscription closed");
        });

        Ok(Subscription::new(
            channels.iter().map(|c| c.to_string()).collect(),
            receiver,
            Some(forwarder),
        ))
    }
}
