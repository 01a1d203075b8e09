mod config;
mod error;
mod manager;
mod memory;
mod models;
mod pool;
mod scoped;

pub use config::ConnectionConfig;
pub use error::{ConfigError, Result, StoreError};
pub use manager::{StoreManager, SyncStatus, backoff_delay};
pub use memory::MemoryStore;
pub use models::{StoreMessage, Subscription};
pub use scoped::ScopedStore;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use pool::RedisPool;

#[derive(Clone)]
pub(crate) enum Backend {
  Redis(RedisPool),
  Memory(MemoryStore),
}

macro_rules! with_backend {
  ($store:expr, |$backend:ident| $body:expr) => {
    match $store.backend()? {
      Backend::Redis($backend) => $body,
      Backend::Memory($backend) => $body,
    }
  };
}

/// Handle to the shared key-value/pub-sub store.
///
/// Clones share the same backend slot, so a reconnect performed by the
/// `StoreManager` is seen by every holder. With no backend installed, every
/// operation fails with `StoreError::NotInitialized`.
#[derive(Clone, Default)]
pub struct Store {
  backend: Arc<RwLock<Option<Backend>>>,
}

impl Store {
  /// A store with no backend. Operations fail until a manager installs one.
  pub fn uninitialized() -> Self {
    Self::default()
  }

  /// A store over a fresh in-memory backend (useful for testing).
  pub fn in_memory() -> Self {
    Self::from_memory(MemoryStore::new())
  }

  /// A store over an existing in-memory backend, sharing its data.
  pub fn from_memory(memory: MemoryStore) -> Self {
    let store = Self::default();
    store.install(Backend::Memory(memory));
    store
  }

  pub(crate) fn install(&self, backend: Backend) {
    *self.backend.write().unwrap_or_else(PoisonError::into_inner) = Some(backend);
  }

  pub(crate) fn take(&self) -> Option<Backend> {
    self.backend.write().unwrap_or_else(PoisonError::into_inner).take()
  }

  /// Whether a backend is installed. Says nothing about reachability; use `ping`.
  pub fn is_connected(&self) -> bool {
    self.backend.read().unwrap_or_else(PoisonError::into_inner).is_some()
  }

  fn backend(&self) -> Result<Backend> {
    self
      .backend
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
      .ok_or(StoreError::NotInitialized)
  }

  /// Scoped helpers for keys under `"<plugin>:"`.
  pub fn scope(&self, plugin: impl Into<String>) -> ScopedStore {
    ScopedStore::new(self.clone(), plugin.into())
  }

  // ========================================================================
  // Liveness
  // ========================================================================

  /// True when the store answers. Transient faults read as `false`.
  pub async fn ping(&self) -> Result<bool> {
    with_backend!(self, |b| b.ping().await)
  }

  /// Like `ping`, but every pooled connection must answer.
  pub async fn ping_all(&self) -> Result<bool> {
    with_backend!(self, |b| b.ping_all().await)
  }

  // ========================================================================
  // Strings
  // ========================================================================

  /// Get a string value. Missing keys are `None`, never an error.
  pub async fn get(&self, key: &str) -> Result<Option<String>> {
    with_backend!(self, |b| b.get(key).await)
  }

  /// Get several values in one round trip; missing keys are `None` in place.
  pub async fn get_all(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
    with_backend!(self, |b| b.get_all(keys).await)
  }

  pub async fn set(&self, key: &str, value: &str) -> Result<()> {
    with_backend!(self, |b| b.set(key, value).await)
  }

  /// Get a value, storing `default` first if the key is missing.
  pub async fn get_or_put(&self, key: &str, default: &str) -> Result<String> {
    if let Some(value) = self.get(key).await? {
      return Ok(value);
    }
    self.set(key, default).await?;
    Ok(default.to_string())
  }

  pub async fn exists(&self, key: &str) -> Result<bool> {
    Ok(with_backend!(self, |b| b.exists(&[key]).await)? == 1)
  }

  /// True only if every key exists.
  pub async fn exists_all(&self, keys: &[&str]) -> Result<bool> {
    Ok(with_backend!(self, |b| b.exists(keys).await)? == keys.len())
  }

  /// Delete a key of any type. Returns whether something was removed.
  pub async fn delete(&self, key: &str) -> Result<bool> {
    with_backend!(self, |b| b.delete(key).await)
  }

  /// Atomically add `delta` to an integer value (missing keys start at 0).
  pub async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
    with_backend!(self, |b| b.increment(key, delta).await)
  }

  // ========================================================================
  // Hashes
  // ========================================================================

  /// All fields of a hash; empty when the key is missing.
  pub async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
    with_backend!(self, |b| b.hash_get_all(key).await)
  }

  pub async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
    with_backend!(self, |b| b.hash_get(key, field).await)
  }

  /// Set several fields at once. Fields not listed are left untouched.
  pub async fn hash_set(&self, key: &str, fields: &HashMap<String, String>) -> Result<()> {
    let fields: Vec<(String, String)> = fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    with_backend!(self, |b| b.hash_set(key, &fields).await)
  }

  /// Set a single field. Atomic on the store side.
  pub async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
    let fields = [(field.to_string(), value.to_string())];
    with_backend!(self, |b| b.hash_set(key, &fields).await)
  }

  /// Set a field only if it does not exist yet. Returns whether it was set.
  pub async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
    with_backend!(self, |b| b.hash_set_if_absent(key, field, value).await)
  }

  pub async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
    with_backend!(self, |b| b.hash_delete(key, field).await)
  }

  /// Delete the whole hash.
  pub async fn hash_delete_all(&self, key: &str) -> Result<bool> {
    self.delete(key).await
  }

  // ========================================================================
  // Pub/Sub
  // ========================================================================

  /// Publish a message. Returns how many subscribers received it.
  /// Delivery is at-most-once: subscribers that are not connected never see it.
  pub async fn publish(&self, channel: &str, message: &str) -> Result<usize> {
    with_backend!(self, |b| b.publish(channel, message).await)
  }

  pub async fn subscribe(&self, channels: &[&str]) -> Result<Subscription> {
    with_backend!(self, |b| b.subscribe(channels).await)
  }
}
