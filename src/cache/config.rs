//! Cache engine configuration.
//!
//! Controls key namespacing and the in-memory storage backend via `stashkit.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

pub(crate) const DEFAULT_NAMESPACE: &str = "__stashkit";
pub(crate) const DEFAULT_ENTRIES_CACHE: &str = "stashkit:cache";
pub(crate) const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
const INVALIDATOR_CACHE_PREFIX: &str = "stashkit";
const INVALIDATOR_KINDS: [&str; 2] = ["tag", "path"];

/// Cache configuration from `stashkit.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path segment every generated locator lives under.
    pub namespace: String,
    /// Name of the platform cache holding memoized entries.
    pub entries_cache: String,
    /// Maximum entries per named cache in the in-memory backend.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            entries_cache: DEFAULT_ENTRIES_CACHE.to_string(),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            entries_cache: settings.entries_cache.clone(),
            memory_capacity: settings.memory_capacity.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Name of the platform cache backing an invalidator kind.
    pub fn invalidator_cache(kind: &str) -> String {
        format!("{INVALIDATOR_CACHE_PREFIX}:{kind}")
    }

    /// Whether `name` would share a platform cache, or its key list, with an
    /// invalidator. Such names can not hold memoized entries.
    pub fn is_reserved_cache_name(name: &str) -> bool {
        INVALIDATOR_KINDS.iter().any(|kind| {
            let cache = Self::invalidator_cache(kind);
            name == cache || name == format!("{cache}:keys")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.namespace, "__stashkit");
        assert_eq!(config.entries_cache, "stashkit:cache");
        assert_eq!(config.memory_capacity, 10_000);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }

    #[test]
    fn invalidator_caches_are_named_by_kind() {
        assert_eq!(CacheConfig::invalidator_cache("tag"), "stashkit:tag");
        assert_eq!(CacheConfig::invalidator_cache("path"), "stashkit:path");
    }

    #[test]
    fn invalidator_cache_names_are_reserved() {
        assert!(CacheConfig::is_reserved_cache_name("stashkit:tag"));
        assert!(CacheConfig::is_reserved_cache_name("stashkit:path:keys"));
        assert!(!CacheConfig::is_reserved_cache_name(DEFAULT_ENTRIES_CACHE));
        assert!(!CacheConfig::is_reserved_cache_name("stashkit:tags"));
    }
}
