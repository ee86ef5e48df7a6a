//! Stashkit cache engine
//!
//! Memoizes asynchronous fetchers behind a shared platform cache and
//! invalidates them by logical tag or by request path:
//!
//! - **Memoizer**: [`CacheEngine::cached`] wraps a fetcher into a [`CachedFn`].
//! - **Invalidators**: one registry per [`InvalidatorKind`] mapping tags or
//!   paths to the cache keys stored under them, with pending-revalidation flags.
//! - **Triggers**: [`CacheEngine::revalidate_tag`] and
//!   [`CacheEngine::revalidate_path`] flag entries for refetch on next access.
//! - **Tracked Store**: a blob cache that can enumerate its keys.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! namespace = "__stashkit"
//! entries_cache = "stashkit:cache"
//! memory_capacity = 10000
//! ```
//!
//! There is no locking anywhere: every registry update is a read-modify-write
//! of one stored record, and concurrent writers can lose each other's updates.

mod blob;
mod config;
mod engine;
mod error;
mod glob;
mod header;
mod invalidator;
mod keys;
pub(crate) mod lock;
mod memo;
mod memory;
mod options;
mod tracked;
mod transformer;
mod trigger;

pub use blob::{BlobCache, BlobHeaders, CacheStorage, JSON_CONTENT_TYPE, StoredBlob};
pub use config::CacheConfig;
pub use engine::CacheEngine;
pub use error::{CacheError, CallError};
pub use glob::PathGlob;
pub use header::{CacheHeader, ONE_YEAR, http_date, set_cache_header};
pub use invalidator::{Info, Invalidator};
pub use keys::{InvalidatorKind, KeySpace, key_parts_from_args};
pub use memo::CachedFn;
pub use memory::{MemoryCache, MemoryStorage};
pub use options::{CacheOptions, Tags};
pub use tracked::TrackedStore;
pub use transformer::{JsonTransformer, Transformer};
