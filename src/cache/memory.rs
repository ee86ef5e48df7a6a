//! In-process platform cache.
//!
//! Every named cache is a bounded LRU. Entries expire according to the
//! `max-age` of their stored `Cache-Control`, and `no-store` blobs are never
//! kept.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;
use tracing::trace;

use super::blob::{BlobCache, CacheStorage, StoredBlob};
use super::config::CacheConfig;
use super::error::CacheError;
use super::header::CacheHeader;
use super::lock::{lock_or_recover, read_or_recover, write_or_recover};

/// Named in-memory caches sharing one capacity setting.
pub struct MemoryStorage {
    capacity: NonZeroUsize,
    caches: RwLock<HashMap<String, Arc<MemoryCache>>>,
}

impl MemoryStorage {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity(config.memory_capacity_non_zero())
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            caches: RwLock::new(HashMap::new()),
        }
    }

    /// Names of every cache opened so far.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_or_recover(&self.caches, "cache_names")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn open_sync(&self, name: &str) -> Arc<MemoryCache> {
        if let Some(cache) = read_or_recover(&self.caches, "open.read").get(name) {
            return cache.clone();
        }
        write_or_recover(&self.caches, "open.write")
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(self.capacity)))
            .clone()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn BlobCache>, CacheError> {
        Ok(self.open_sync(name))
    }
}

struct Slot {
    blob: StoredBlob,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// One named LRU cache.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Slot>>,
}

impl MemoryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, CacheError> {
        let mut entries = lock_or_recover(&self.entries, "get");
        match entries.get(key) {
            None => return Ok(None),
            Some(slot) if !slot.is_expired(Instant::now()) => return Ok(Some(slot.blob.clone())),
            Some(_) => {}
        }
        trace!(key, "expired blob dropped on read");
        entries.pop(key);
        Ok(None)
    }

    async fn put(&self, key: &str, blob: StoredBlob) -> Result<(), CacheError> {
        let cache_control = blob.headers.cache_control.as_str();
        if CacheHeader::forbids_store(cache_control) {
            trace!(key, "no-store blob not kept");
            return Ok(());
        }
        let expires_at = CacheHeader::parse_max_age(cache_control)
            .and_then(|age| Instant::now().checked_add(age));
        lock_or_recover(&self.entries, "put").put(key.to_string(), Slot { blob, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(lock_or_recover(&self.entries, "delete").pop(key).is_some())
    }
}
