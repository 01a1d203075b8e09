//! Plugin-scoped helpers over `"<plugin>:<key>"` keys.
//!
//! Typed getters return `None` for missing keys and `StoreError::Parse` for values
//! that do not parse. String lists are stored as `;`-joined strings.

use std::fmt::Display;
use std::str::FromStr;

use crate::Store;
use crate::error::{Result, StoreError};

const LIST_SEPARATOR: char = ';';

#[derive(Clone)]
pub struct ScopedStore {
  store: Store,
  plugin: String,
}

impl ScopedStore {
  pub(crate) fn new(store: Store, plugin: String) -> Self {
    Self { store, plugin }
  }

  /// Full key for `key` within this scope.
  pub fn key(&self, key: &str) -> String {
    format!("{}:{}", self.plugin, key)
  }

  pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
    self.store.get(&self.key(key)).await
  }

  pub async fn set_string(&self, key: &str, value: impl Display) -> Result<()> {
    self.store.set(&self.key(key), &value.to_string()).await
  }

  pub async fn get_or_put(&self, key: &str, default: impl Display) -> Result<String> {
    self.store.get_or_put(&self.key(key), &default.to_string()).await
  }

  async fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
    let full_key = self.key(key);
    match self.store.get(&full_key).await? {
      None => Ok(None),
      Some(value) => value
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| StoreError::Parse { key: full_key, value }),
    }
  }

  pub async fn get_int(&self, key: &str) -> Result<Option<i32>> {
    self.get_parsed(key).await
  }

  pub async fn get_long(&self, key: &str) -> Result<Option<i64>> {
    self.get_parsed(key).await
  }

  pub async fn get_double(&self, key: &str) -> Result<Option<f64>> {
    self.get_parsed(key).await
  }

  /// Items of a `;`-joined list. Blank items are skipped; a missing key is an empty list.
  pub async fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
    Ok(
      self
        .get_string(key)
        .await?
        .map(|raw| {
          raw
            .split(LIST_SEPARATOR)
            .filter(|item| !item.trim().is_empty())
            .map(str::to_string)
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  /// Replace the list with `items`.
  pub async fn set_string_list(&self, key: &str, items: &[String]) -> Result<()> {
    if let Some(bad) = items.iter().find(|item| item.contains(LIST_SEPARATOR)) {
      return Err(StoreError::InvalidListItem(bad.clone()));
    }
    self.set_string(key, items.join(";")).await
  }

  /// Append `items` after the stored ones.
  ///
  /// Read-modify-write: concurrent writers to the same key can lose items.
  pub async fn append_string_list(&self, key: &str, items: &[String]) -> Result<()> {
    let mut list = self.get_string_list(key).await?;
    list.extend(items.iter().cloned());
    self.set_string_list(key, &list).await
  }

  /// Remove every occurrence of `items`. Returns false when the list was empty.
  ///
  /// Read-modify-write, like `append_string_list`.
  pub async fn remove_from_string_list(&self, key: &str, items: &[String]) -> Result<bool> {
    let mut list = self.get_string_list(key).await?;
    if list.is_empty() {
      return Ok(false);
    }
    list.retain(|item| !items.contains(item));
    self.set_string_list(key, &list).await?;
    Ok(true)
  }

  /// Atomically add `delta` to a counter and return the new value.
  pub async fn update_counter(&self, key: &str, delta: i64) -> Result<i64> {
    self.store.increment(&self.key(key), delta).await
  }

  pub async fn exists(&self, key: &str) -> Result<bool> {
    self.store.exists(&self.key(key)).await
  }

  pub async fn delete(&self, key: &str) -> Result<bool> {
    self.store.delete(&self.key(key)).await
  }
}
