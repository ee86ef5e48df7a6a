//! Memoized fetchers.
//!
//! A [`CachedFn`] is produced by [`CacheEngine::cached`]. Each call derives a
//! cache key from the key parts, the call arguments and the current request
//! path, consults both invalidators, and either serves the stored value or
//! runs the fetcher and stores its result in the background.
//!
//! Registration of the key under its tags and path is spawned on every call,
//! hit or miss. Storing a fresh value and clearing its pending flags are
//! chained after that registration so a flag is never cleared for a key that
//! is not registered yet.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::blob::{JSON_CONTENT_TYPE, StoredBlob};
use super::engine::CacheEngine;
use super::error::{CacheError, CallError};
use super::header::CacheHeader;
use super::keys::{KeySpace, key_parts_from_args};
use super::options::Tags;
use super::transformer::Transformer;
use crate::context;

pub(crate) type Fetcher<A, T, E> = dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync;

/// What is persisted for one memoized call.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<V> {
    pathname: String,
    value: V,
    tags: Vec<String>,
}

/// A fetcher wrapped by the cache engine.
pub struct CachedFn<A, T, E> {
    engine: CacheEngine,
    fetcher: Arc<Fetcher<A, T, E>>,
    key_parts: Vec<String>,
    transformer: Arc<dyn Transformer>,
    cache_control: CacheHeader,
    tags: Tags<A>,
}

impl<A, T, E> Clone for CachedFn<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            fetcher: self.fetcher.clone(),
            key_parts: self.key_parts.clone(),
            transformer: self.transformer.clone(),
            cache_control: self.cache_control.clone(),
            tags: self.tags.clone(),
        }
    }
}

impl<A, T, E> CachedFn<A, T, E> {
    pub(crate) fn new(
        engine: CacheEngine,
        fetcher: Arc<Fetcher<A, T, E>>,
        key_parts: Vec<String>,
        transformer: Arc<dyn Transformer>,
        cache_control: CacheHeader,
        tags: Tags<A>,
    ) -> Self {
        Self {
            engine,
            fetcher,
            key_parts,
            transformer,
            cache_control,
            tags,
        }
    }

    /// `Cache-Control` written with every stored entry.
    pub fn cache_control(&self) -> &CacheHeader {
        &self.cache_control
    }
}

impl<A, T, E> CachedFn<A, T, E>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
{
    /// Return the stored value for `args`, or fetch, return and store a fresh one.
    ///
    /// Must run inside a request scope. Fetcher errors are returned untouched
    /// as [`CallError::Fetch`] and nothing is stored for them.
    pub async fn call(&self, args: A) -> Result<T, CallError<E>> {
        let ctx = context::current()?;
        let background = ctx.background().clone();
        let space = self.engine.key_space(&ctx);
        let pathname = ctx.pathname().to_string();

        let mut parts = self.key_parts.clone();
        parts.extend(key_parts_from_args(&args)?);
        let cache_key = space.cache_key(&pathname, &parts)?;
        let tags = self.tags.resolve(&args).await?;
        let paths = vec![pathname.clone()];

        let invalidated = self
            .engine
            .was_invalidated(&space, &cache_key, &tags, &paths)
            .await;

        let registration = tokio::spawn(self.engine.clone().register(
            space.clone(),
            cache_key.clone(),
            tags.clone(),
            paths.clone(),
        ));

        if let Some(value) = self.lookup(&space, &cache_key, invalidated).await {
            counter!("stashkit_cache_hit_total").increment(1);
            debug!(cache_key = %cache_key, "cache hit");
            background.wait_until("cache.register", settle(registration));
            return Ok(value);
        }

        counter!("stashkit_cache_miss_total").increment(1);
        if invalidated {
            counter!("stashkit_cache_invalidated_total").increment(1);
            debug!(cache_key = %cache_key, "cache entry invalidated; refetching");
        } else {
            debug!(cache_key = %cache_key, "cache miss");
        }

        let started = Instant::now();
        let fresh = (self.fetcher)(args).await;
        histogram!("stashkit_cache_fetch_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        let fresh = match fresh {
            Ok(fresh) => fresh,
            Err(err) => {
                background.wait_until("cache.register", settle(registration));
                return Err(CallError::Fetch(err));
            }
        };

        let blob = match self.encode(&pathname, &fresh, &tags) {
            Ok(blob) => blob,
            Err(err) => {
                background.wait_until("cache.register", settle(registration));
                return Err(err.into());
            }
        };

        let engine = self.engine.clone();
        background.wait_until("cache.store", async move {
            settle(registration).await?;
            let store = engine.entries(&space).await?;
            futures::try_join!(
                engine.mark_as_revalidated(&space, &cache_key, &tags, &paths),
                store.put(&cache_key, blob),
            )?;
            debug!(cache_key = %cache_key, "stored fresh value");
            Ok(())
        });

        Ok(fresh)
    }

    /// Stored value for `cache_key`, if it exists, decodes and is still valid.
    ///
    /// Lookup failures read as a miss. Invalidated or unreadable entries are
    /// deleted before the caller refetches.
    async fn lookup(&self, space: &KeySpace, cache_key: &str, invalidated: bool) -> Option<T> {
        let store = match self.engine.entries(space).await {
            Ok(store) => store,
            Err(err) => {
                warn!(cache_key, error = %err, "entry store unavailable; treating as miss");
                return None;
            }
        };
        let blob = match store.lookup(cache_key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(err) => {
                warn!(cache_key, error = %err, "cache lookup failed; treating as miss");
                return None;
            }
        };

        if !invalidated {
            match self.decode(&blob) {
                Ok(entry) => return Some(entry.value),
                Err(err) => warn!(cache_key, error = %err, "discarding unreadable cache entry"),
            }
        }

        if let Err(err) = store.delete(cache_key).await {
            warn!(cache_key, error = %err, "failed to delete stale cache entry");
        }
        None
    }

    fn decode(&self, blob: &StoredBlob) -> Result<CacheEntry<T>, CacheError> {
        let document = self.transformer.deserialise(blob.as_text()?)?;
        serde_json::from_value(document).map_err(CacheError::deserialize)
    }

    fn encode(&self, pathname: &str, value: &T, tags: &[String]) -> Result<StoredBlob, CacheError> {
        let entry = CacheEntry {
            pathname: pathname.to_string(),
            value,
            tags: tags.to_vec(),
        };
        let document = serde_json::to_value(&entry).map_err(CacheError::serialize)?;
        let text = self.transformer.serialise(&document)?;
        Ok(StoredBlob::text(text, JSON_CONTENT_TYPE, &self.cache_control))
    }
}

async fn settle(registration: JoinHandle<Result<(), CacheError>>) -> Result<(), CacheError> {
    registration
        .await
        .map_err(|err| CacheError::Task(err.to_string()))?
}
