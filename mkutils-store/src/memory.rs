//! In-process store backend.
//!
//! Keeps strings and hashes in a lock-free map and delivers pub/sub messages to
//! subscribers living in the same process. Used by tests and by single-process
//! deployments that do not need a shared Redis server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::models::{StoreMessage, Subscription};

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Hash(HashMap<String, String>),
}

struct Subscriber {
    channels: HashSet<String>,
    sender: mpsc::UnboundedSender<StoreMessage>,
}

struct Inner {
    values: scc::HashMap<String, Value>,
    subscribers: scc::HashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    unavailable: AtomicBool,
    stalled: AtomicBool,
}

/// Shared in-memory store. Clones share the same data, so several "processes"
/// in one test can talk to each other through it.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                values: scc::HashMap::new(),
                subscribers: scc::HashMap::new(),
                next_subscriber: AtomicU64::new(0),
                unavailable: AtomicBool::new(false),
                stalled: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate the store going away (`false`) or coming back (`true`).
    /// While unavailable every operation fails with `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Simulate a server that accepts requests and never answers: while stalled,
    /// pings hang until the caller gives up.
    pub fn set_stalled(&self, stalled: bool) {
        self.inner.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        !self.inner.unavailable.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }

    pub(crate) async fn ping(&self) -> Result<bool> {
        if self.inner.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.is_available())
    }

    pub(crate) async fn ping_all(&self) -> Result<bool> {
        self.ping().await
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        match self.inner.values.read_async(key, |_, v| v.clone()).await {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Hash(_)) => Err(Self::wrong_type(key)),
        }
    }

    pub(crate) async fn get_all(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        self.check()?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            // MGET reports non-string values as missing
            let value = self
                .inner
                .values
                .read_async(*key, |_, v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Hash(_) => None,
                })
                .await
                .flatten();
            values.push(value);
        }
        Ok(values)
    }

    pub(crate) async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        let mut entry = self
            .inner
            .values
            .entry_async(key.to_string())
            .await
            .or_insert_with(|| Value::String(String::new()));
        *entry.get_mut() = Value::String(value.to_string());
        Ok(())
    }

    pub(crate) async fn exists(&self, keys: &[&str]) -> Result<usize> {
        self.check()?;
        let mut found = 0;
        for key in keys {
            if self.inner.values.read_async(*key, |_, _| ()).await.is_some() {
                found += 1;
            }
        }
        Ok(found)
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        Ok(self.inner.values.remove_async(key).await.is_some())
    }

    pub(crate) async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.check()?;
        let mut entry = self
            .inner
            .values
            .entry_async(key.to_string())
            .await
            .or_insert_with(|| Value::String("0".to_string()));
        let current = match entry.get() {
            Value::String(s) => s.parse::<i64>().map_err(|_| StoreError::Parse {
                key: key.to_string(),
                value: s.clone(),
            })?,
            Value::Hash(_) => return Err(Self::wrong_type(key)),
        };
        // Redis refuses increments that overflow a signed 64-bit integer
        let next = current.checked_add(delta).ok_or_else(|| StoreError::Overflow {
            key: key.to_string(),
        })?;
        *entry.get_mut() = Value::String(next.to_string());
        Ok(next)
    }

    pub(crate) async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check()?;
        match self.inner.values.read_async(key, |_, v| v.clone()).await {
            None => Ok(HashMap::new()),
            Some(Value::Hash(map)) => Ok(map),
            Some(Value::String(_)) => Err(Self::wrong_type(key)),
        }
    }

    pub(crate) async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        match self.inner.values.read_async(key, |_, v| v.clone()).await {
            None => Ok(None),
            Some(Value::Hash(map)) => Ok(map.get(field).cloned()),
            Some(Value::String(_)) => Err(Self::wrong_type(key)),
        }
    }

    pub(crate) async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.check()?;
        if fields.is_empty() {
            return Ok(());
        }
        let mut entry = self
            .inner
            .values
            .entry_async(key.to_string())
            .await
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry.get_mut() {
            Value::Hash(map) => {
                for (field, value) in fields {
                    map.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            Value::String(_) => Err(Self::wrong_type(key)),
        }
    }

    pub(crate) async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        self.check()?;
        let mut entry = self
            .inner
            .values
            .entry_async(key.to_string())
            .await
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry.get_mut() {
            Value::Hash(map) => {
                if map.contains_key(field) {
                    return Ok(false);
                }
                map.insert(field.to_string(), value.to_string());
                Ok(true)
            }
            Value::String(_) => Err(Self::wrong_type(key)),
        }
    }

    pub(crate) async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        self.check()?;
        let removed = self
            .inner
            .values
            .update_async(key, |_, v| match v {
                Value::Hash(map) => Ok(map.remove(field).is_some()),
                Value::String(_) => Err(Self::wrong_type(key)),
            })
            .await
            .unwrap_or(Ok(false))?;

        // Redis drops a hash once its last field is gone
        let _ = self
            .inner
            .values
            .remove_if_async(key, |v| matches!(v, Value::Hash(map) if map.is_empty()))
            .await;
        Ok(removed)
    }

    pub(crate) async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        self.check()?;
        let mut delivered = 0;
        self.inner
            .subscribers
            .retain_async(|_, subscriber| {
                if !subscriber.channels.contains(channel) {
                    return true;
                }
                let message = StoreMessage {
                    channel: channel.to_string(),
                    payload: payload.to_string(),
                };
                match subscriber.sender.send(message) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    // receiver dropped, unsubscribe
                    Err(_) => false,
                }
            })
            .await;
        Ok(delivered)
    }

    pub(crate) async fn subscribe(&self, channels: &[&str]) -> Result<Subscription> {
        self.check()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber {
            channels: channels.iter().map(|c| c.to_string()).collect(),
            sender,
        };
        let _ = self.inner.subscribers.insert_async(id, subscriber).await;
        debug!(id, channels = channels.len(), "memory subscription registered");
        Ok(Subscription::new(
            channels.iter().map(|c| c.to_string()).collect(),
            receiver,
            None,
        ))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
