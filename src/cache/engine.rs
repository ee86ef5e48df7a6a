//! Process-wide cache engine.
//!
//! A [`CacheEngine`] owns the platform storage handle and the tag and path
//! [`Invalidator`]s. It is created once at startup and cloned into whatever
//! needs it; every clone shares the same state.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use super::blob::CacheStorage;
use super::config::CacheConfig;
use super::error::CacheError;
use super::header::CacheHeader;
use super::invalidator::Invalidator;
use super::keys::{InvalidatorKind, KeySpace};
use super::memo::CachedFn;
use super::options::CacheOptions;
use super::tracked::TrackedStore;
use super::transformer::JsonTransformer;
use crate::context::{self, RequestContext};

#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    storage: Arc<dyn CacheStorage>,
    config: CacheConfig,
    tags: Invalidator,
    paths: Invalidator,
}

impl CacheEngine {
    pub fn new(storage: Arc<dyn CacheStorage>, config: CacheConfig) -> Self {
        let tags = Invalidator::new(InvalidatorKind::Tag, storage.clone());
        let paths = Invalidator::new(InvalidatorKind::Path, storage.clone());
        Self {
            inner: Arc::new(EngineInner {
                storage,
                config,
                tags,
                paths,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn tag_invalidator(&self) -> &Invalidator {
        &self.inner.tags
    }

    pub fn path_invalidator(&self) -> &Invalidator {
        &self.inner.paths
    }

    /// Wrap `fetcher` so repeated calls with the same arguments reuse a stored result.
    ///
    /// `key_parts` name the fetcher's cache family and must be unique across
    /// memoized functions. Fails when `options.revalidate` is `Some(0)`.
    pub fn cached<A, T, E, F, Fut, I, S>(
        &self,
        fetcher: F,
        key_parts: I,
        options: CacheOptions<A>,
    ) -> Result<CachedFn<A, T, E>, CacheError>
    where
        A: 'static,
        T: 'static,
        E: 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if options.revalidate == Some(0) {
            return Err(CacheError::InvalidRevalidate);
        }

        let key_parts: Vec<String> = key_parts.into_iter().map(Into::into).collect();
        debug!(key_parts = ?key_parts, revalidate = ?options.revalidate, "wrapping fetcher");

        Ok(CachedFn::new(
            self.clone(),
            Arc::new(move |args: A| fetcher(args).boxed()),
            key_parts,
            options
                .transformer
                .unwrap_or_else(|| Arc::new(JsonTransformer)),
            CacheHeader::for_revalidate(options.revalidate),
            options.tags,
        ))
    }

    /// Every cache key written through the entry store for the current origin.
    pub async fn entry_keys(&self) -> Result<Vec<String>, CacheError> {
        let ctx = context::current()?;
        self.entries(&self.key_space(&ctx)).await?.keys().await
    }

    pub(crate) fn key_space(&self, ctx: &RequestContext) -> KeySpace {
        KeySpace::new(ctx.url(), &self.inner.config.namespace)
    }

    pub(crate) async fn entries(&self, space: &KeySpace) -> Result<TrackedStore, CacheError> {
        TrackedStore::open(
            self.inner.storage.as_ref(),
            &self.inner.config.entries_cache,
            space,
        )
        .await
    }

    /// OR of both invalidators. An unreadable flag counts as invalidated.
    pub(crate) async fn was_invalidated(
        &self,
        space: &KeySpace,
        cache_key: &str,
        tags: &[String],
        paths: &[String],
    ) -> bool {
        let by_tag = self.inner.tags.was_invalidated(space, cache_key, tags);
        let by_path = self.inner.paths.was_invalidated(space, cache_key, paths);
        let (by_tag, by_path) = futures::join!(by_tag, by_path);
        [by_tag, by_path].into_iter().any(|result| {
            result.unwrap_or_else(|err| {
                warn!(cache_key, error = %err, "invalidation state unreadable; refetching");
                true
            })
        })
    }

    pub(crate) async fn register(
        self,
        space: KeySpace,
        cache_key: String,
        tags: Vec<String>,
        paths: Vec<String>,
    ) -> Result<(), CacheError> {
        futures::try_join!(
            self.inner.tags.register(&space, &cache_key, &tags),
            self.inner.paths.register(&space, &cache_key, &paths),
        )?;
        Ok(())
    }

    pub(crate) async fn mark_as_revalidated(
        &self,
        space: &KeySpace,
        cache_key: &str,
        tags: &[String],
        paths: &[String],
    ) -> Result<(), CacheError> {
        futures::try_join!(
            self.inner.tags.mark_as_revalidated(space, cache_key, tags),
            self.inner.paths.mark_as_revalidated(space, cache_key, paths),
        )?;
        Ok(())
    }
}
