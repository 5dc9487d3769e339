//! # Local Key-Value Storage
//!
//! Typed access over any [`KeyValueStore`] plugin. Non-string values are
//! JSON-encoded on write; reads try to decode and fall back to the raw
//! string when the stored text is not JSON.

use crate::error::Result;
use crate::traits::KeyValueStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Keys the core reads and writes.
pub mod keys {
    pub const FAVORITES: &str = "favorites";
    pub const SETTINGS: &str = "settings";
    /// Cache metadata lives under `image_cache_{image_id}`.
    pub const IMAGE_CACHE_PREFIX: &str = "image_cache_";
}

/// Cheaply clonable handle to the configured key-value plugin.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Non-persistent storage, used by tests and throwaway sessions.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub async fn set_str(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value).await
    }

    /// Writes `value`. Strings are stored as-is, anything else as JSON text.
    pub async fn set_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let encoded = match serde_json::to_value(value)? {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.inner.set(key, &encoded).await
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    /// Reads `key` as JSON, falling back to a JSON string holding the raw text.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .inner
            .get(key)
            .await?
            .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw))))
    }

    /// Reads and decodes `key`. A stored value of the wrong shape is a `Parse` error.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    /// A view that confines every operation to keys starting with `prefix`.
    pub fn scoped(&self, prefix: impl Into<String>) -> ScopedStorage {
        ScopedStorage {
            storage: self.clone(),
            prefix: prefix.into(),
        }
    }
}

/// Prefix-namespaced view over [`Storage`]. Callers use bare ids; the view
/// adds and strips the prefix.
#[derive(Clone)]
pub struct ScopedStorage {
    storage: Storage,
    prefix: String,
}

impl ScopedStorage {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key_for(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        self.storage.get_json(&self.key_for(id)).await
    }

    pub async fn set_json<T>(&self, id: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.storage.set_json(&self.key_for(id), value).await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.storage.remove(&self.key_for(id)).await
    }

    /// Ids stored in this scope, prefix stripped.
    pub async fn ids(&self) -> Result<Vec<String>> {
        Ok(self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_owned))
            .collect())
    }

    /// Removes every key of this scope and leaves the rest of the store alone.
    pub async fn clear(&self) -> Result<()> {
        for id in self.ids().await? {
            self.remove(&id).await?;
        }
        Ok(())
    }
}

/// In-process `KeyValueStore` backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }
}
