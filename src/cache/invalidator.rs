//! Identifier → cache key registry with pending-revalidation flags.
//!
//! One [`Invalidator`] exists per [`InvalidatorKind`]. For each identifier it
//! persists an [`Info`] record in a tracked platform cache. Every operation is
//! an independent read-modify-write of that record: there is no locking, so
//! concurrent writers to the same identifier can lose updates.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::blob::{CacheStorage, StoredBlob};
use super::config::CacheConfig;
use super::error::CacheError;
use super::header::{CacheHeader, ONE_YEAR};
use super::keys::{InvalidatorKind, KeySpace};
use super::tracked::TrackedStore;

/// Registration state persisted per identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Info {
    /// Cache keys registered under this identifier, in first-seen order.
    pub registered: Vec<String>,
    /// Registered keys that must be refetched on next access.
    pub pending_revalidates: Vec<String>,
}

impl Info {
    fn register(&mut self, cache_key: &str) -> bool {
        if self.registered.iter().any(|key| key == cache_key) {
            return false;
        }
        self.registered.push(cache_key.to_string());
        true
    }

    fn flag_all(&mut self) {
        self.pending_revalidates = self.registered.clone();
    }

    fn is_pending(&self, cache_key: &str) -> bool {
        self.pending_revalidates.iter().any(|key| key == cache_key)
    }

    fn clear_pending(&mut self, cache_key: &str) {
        self.pending_revalidates.retain(|key| key != cache_key);
    }
}

/// Registry for one invalidation dimension (tags or paths).
pub struct Invalidator {
    kind: InvalidatorKind,
    storage: Arc<dyn CacheStorage>,
    cache_name: String,
}

impl Invalidator {
    pub fn new(kind: InvalidatorKind, storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            kind,
            storage,
            cache_name: CacheConfig::invalidator_cache(kind.as_str()),
        }
    }

    pub fn kind(&self) -> InvalidatorKind {
        self.kind
    }

    /// Register `cache_key` under each identifier so it can be invalidated by them.
    #[instrument(skip(self, space), fields(kind = %self.kind))]
    pub async fn register(
        &self,
        space: &KeySpace,
        cache_key: &str,
        identifiers: &[String],
    ) -> Result<(), CacheError> {
        if identifiers.is_empty() {
            return Ok(());
        }
        let store = self.store(space).await?;
        try_join_all(identifiers.iter().map(|identifier| {
            let store = &store;
            async move {
                let key = space.identifier_key(self.kind, identifier);
                let mut info = read(store, &key).await?;
                if info.register(cache_key) {
                    debug!(identifier = %identifier, "registered cache key");
                }
                write(store, &key, &info).await
            }
        }))
        .await?;
        Ok(())
    }

    /// Storage keys of every identifier this invalidator has persisted.
    pub async fn keys(&self, space: &KeySpace) -> Result<Vec<String>, CacheError> {
        self.store(space).await?.keys().await
    }

    /// Flag every key registered under `identifier` as pending revalidation.
    #[instrument(skip(self, space), fields(kind = %self.kind))]
    pub async fn revalidate(&self, space: &KeySpace, identifier: &str) -> Result<(), CacheError> {
        let store = self.store(space).await?;
        let key = space.identifier_key(self.kind, identifier);
        let mut info = read(&store, &key).await?;
        info.flag_all();
        debug!(pending = info.pending_revalidates.len(), "flagged registrants");
        write(&store, &key, &info).await
    }

    /// True if any identifier has `cache_key` pending revalidation.
    pub async fn was_invalidated(
        &self,
        space: &KeySpace,
        cache_key: &str,
        identifiers: &[String],
    ) -> Result<bool, CacheError> {
        if identifiers.is_empty() {
            return Ok(false);
        }
        let store = self.store(space).await?;
        let flags = try_join_all(identifiers.iter().map(|identifier| {
            let store = &store;
            async move {
                let key = space.identifier_key(self.kind, identifier);
                Ok::<_, CacheError>(read(store, &key).await?.is_pending(cache_key))
            }
        }))
        .await?;
        Ok(flags.into_iter().any(|pending| pending))
    }

    /// Clear the pending flag of `cache_key` under each identifier.
    pub async fn mark_as_revalidated(
        &self,
        space: &KeySpace,
        cache_key: &str,
        identifiers: &[String],
    ) -> Result<(), CacheError> {
        if identifiers.is_empty() {
            return Ok(());
        }
        let store = self.store(space).await?;
        try_join_all(identifiers.iter().map(|identifier| {
            let store = &store;
            async move {
                let key = space.identifier_key(self.kind, identifier);
                let mut info = read(store, &key).await?;
                info.clear_pending(cache_key);
                write(store, &key, &info).await
            }
        }))
        .await?;
        Ok(())
    }

    /// Current record for `identifier`, empty if never touched.
    pub async fn info(&self, space: &KeySpace, identifier: &str) -> Result<Info, CacheError> {
        let store = self.store(space).await?;
        read(&store, &space.identifier_key(self.kind, identifier)).await
    }

    async fn store(&self, space: &KeySpace) -> Result<TrackedStore, CacheError> {
        TrackedStore::open(self.storage.as_ref(), &self.cache_name, space).await
    }
}

async fn read(store: &TrackedStore, key: &str) -> Result<Info, CacheError> {
    match store.lookup(key).await? {
        Some(blob) => blob.decode_json(),
        None => Ok(Info::default()),
    }
}

async fn write(store: &TrackedStore, key: &str, info: &Info) -> Result<(), CacheError> {
    let blob = StoredBlob::json(info, &CacheHeader::new().max_age(ONE_YEAR))?;
    store.put(key, blob).await
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::cache::memory::MemoryStorage;

    fn space() -> KeySpace {
        let url = Url::parse("https://example.com/").expect("valid url");
        KeySpace::new(&url, "__stashkit")
    }

    fn invalidator(kind: InvalidatorKind) -> Invalidator {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::default());
        Invalidator::new(kind, storage)
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn register_deduplicates_and_keeps_order() {
        let tags = invalidator(InvalidatorKind::Tag);
        let space = space();

        tags.register(&space, "k2", &ids(&["a"])).await.expect("register");
        tags.register(&space, "k1", &ids(&["a"])).await.expect("register");
        tags.register(&space, "k2", &ids(&["a"])).await.expect("register");

        let info = tags.info(&space, "a").await.expect("info");
        assert_eq!(info.registered, vec!["k2", "k1"]);
        assert!(info.pending_revalidates.is_empty());
    }

    #[tokio::test]
    async fn empty_identifiers_are_a_no_op() {
        let tags = invalidator(InvalidatorKind::Tag);
        let space = space();

        tags.register(&space, "k", &[]).await.expect("register");
        assert!(tags.keys(&space).await.expect("keys").is_empty());
        assert!(!tags.was_invalidated(&space, "k", &[]).await.expect("check"));
        tags.mark_as_revalidated(&space, "k", &[]).await.expect("mark");
    }

    #[tokio::test]
    async fn revalidate_flags_every_registrant() {
        let tags = invalidator(InvalidatorKind::Tag);
        let space = space();
        tags.register(&space, "k1", &ids(&["a"])).await.expect("register");
        tags.register(&space, "k2", &ids(&["a", "b"])).await.expect("register");

        tags.revalidate(&space, "a").await.expect("revalidate");
        tags.revalidate(&space, "a").await.expect("idempotent");

        assert!(tags.was_invalidated(&space, "k1", &ids(&["a"])).await.expect("check"));
        assert!(tags.was_invalidated(&space, "k2", &ids(&["b", "a"])).await.expect("check"));
        assert!(!tags.was_invalidated(&space, "k2", &ids(&["b"])).await.expect("check"));

        let info = tags.info(&space, "a").await.expect("info");
        assert_eq!(info.pending_revalidates, info.registered);
    }

    #[tokio::test]
    async fn mark_as_revalidated_clears_only_the_flag() {
        let tags = invalidator(InvalidatorKind::Tag);
        let space = space();
        tags.register(&space, "k1", &ids(&["a"])).await.expect("register");
        tags.register(&space, "k2", &ids(&["a"])).await.expect("register");
        tags.revalidate(&space, "a").await.expect("revalidate");

        tags.mark_as_revalidated(&space, "k1", &ids(&["a"]))
            .await
            .expect("mark");

        let info = tags.info(&space, "a").await.expect("info");
        assert_eq!(info.registered, vec!["k1", "k2"]);
        assert_eq!(info.pending_revalidates, vec!["k2"]);
    }

    #[tokio::test]
    async fn revalidating_unknown_identifier_creates_empty_record() {
        let tags = invalidator(InvalidatorKind::Tag);
        let space = space();

        tags.revalidate(&space, "never-used").await.expect("revalidate");

        assert_eq!(
            tags.keys(&space).await.expect("keys"),
            vec![space.identifier_key(InvalidatorKind::Tag, "never-used")]
        );
        assert_eq!(
            tags.info(&space, "never-used").await.expect("info"),
            Info::default()
        );
    }

    #[tokio::test]
    async fn keys_round_trip_through_revalidate() {
        let paths = invalidator(InvalidatorKind::Path);
        let space = space();
        paths.register(&space, "k", &ids(&["/users/1"])).await.expect("register");

        let keys = paths.keys(&space).await.expect("keys");
        assert_eq!(keys, vec!["https://example.com/__stashkit/__path/users/1"]);

        paths.revalidate(&space, &keys[0]).await.expect("revalidate");
        assert!(paths.was_invalidated(&space, "k", &ids(&["/users/1"])).await.expect("check"));
    }

    #[tokio::test]
    async fn kinds_do_not_share_records() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::default());
        let tags = Invalidator::new(InvalidatorKind::Tag, storage.clone());
        let paths = Invalidator::new(InvalidatorKind::Path, storage);
        let space = space();

        tags.register(&space, "k", &ids(&["/x"])).await.expect("register");
        paths.register(&space, "k", &ids(&["/x"])).await.expect("register");
        tags.revalidate(&space, "/x").await.expect("revalidate");

        assert!(tags.was_invalidated(&space, "k", &ids(&["/x"])).await.expect("check"));
        assert!(!paths.was_invalidated(&space, "k", &ids(&["/x"])).await.expect("check"));
    }
}
