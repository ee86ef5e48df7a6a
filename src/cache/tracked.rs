//! Blob cache with key enumeration.
//!
//! Platform caches cannot list their keys, so a [`TrackedStore`] keeps a JSON
//! side list of every key written through it in a companion cache named
//! `<name>:keys`. The list only grows: deletes do not prune it, and concurrent
//! writers may drop each other's appends (read-modify-write, last write wins).

use std::sync::Arc;

use tracing::trace;

use super::blob::{BlobCache, CacheStorage, StoredBlob};
use super::error::CacheError;
use super::header::{CacheHeader, ONE_YEAR};
use super::keys::KeySpace;

/// A named blob cache that remembers which keys were written to it.
#[derive(Clone)]
pub struct TrackedStore {
    cache: Arc<dyn BlobCache>,
    keys_cache: Arc<dyn BlobCache>,
    sentinel: String,
}

impl TrackedStore {
    pub async fn open(
        storage: &dyn CacheStorage,
        name: &str,
        space: &KeySpace,
    ) -> Result<Self, CacheError> {
        let keys_cache = storage.open(&format!("{name}:keys")).await?;
        let cache = storage.open(name).await?;
        Ok(Self {
            cache,
            keys_cache,
            sentinel: space.keys_sentinel(),
        })
    }

    /// Look up `key` in the underlying cache.
    pub async fn lookup(&self, key: &str) -> Result<Option<StoredBlob>, CacheError> {
        self.cache.get(key).await
    }

    /// Store `blob` under `key`, recording the key first if it is new.
    pub async fn put(&self, key: &str, blob: StoredBlob) -> Result<(), CacheError> {
        let mut keys = self.keys().await?;
        if !keys.iter().any(|known| known == key) {
            keys.push(key.to_string());
            trace!(key, tracked = keys.len(), "tracking new key");
            self.write_keys(&keys).await?;
        }
        self.cache.put(key, blob).await
    }

    /// Remove `key` from the underlying cache. The key stays listed.
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.cache.delete(key).await
    }

    /// Every key ever written through this store, in insertion order.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let Some(blob) = self.keys_cache.get(&self.sentinel).await? else {
            return Ok(Vec::new());
        };
        // Anything other than a list of strings is treated as an empty list.
        Ok(blob.decode_json::<Vec<String>>().unwrap_or_default())
    }

    async fn write_keys(&self, keys: &[String]) -> Result<(), CacheError> {
        let blob = StoredBlob::json(&keys, &CacheHeader::new().max_age(ONE_YEAR))?;
        self.keys_cache.put(&self.sentinel, blob).await
    }
}
