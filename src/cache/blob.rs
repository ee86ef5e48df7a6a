//! Platform cache abstraction.
//!
//! A [`CacheStorage`] opens named [`BlobCache`]s; each blob cache maps string
//! locators to opaque payloads plus a handful of HTTP-style metadata headers.
//! Expiry is the backend's concern and follows the stored `Cache-Control`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use super::error::CacheError;
use super::header::{CacheHeader, http_date};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Metadata stored next to a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeaders {
    pub content_type: String,
    pub cache_control: String,
    pub last_modified: Option<String>,
}

/// A payload held by a [`BlobCache`].
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub headers: BlobHeaders,
    pub body: Bytes,
}

impl StoredBlob {
    /// Build a blob from already-serialised text.
    pub fn text(body: impl Into<String>, content_type: &str, cache_control: &CacheHeader) -> Self {
        Self {
            headers: BlobHeaders {
                content_type: content_type.to_string(),
                cache_control: cache_control.to_string(),
                last_modified: Some(http_date(OffsetDateTime::now_utc())),
            },
            body: Bytes::from(body.into()),
        }
    }

    /// Build a JSON blob from a serialisable value.
    pub fn json<T: Serialize>(value: &T, cache_control: &CacheHeader) -> Result<Self, CacheError> {
        let body = serde_json::to_string(value).map_err(CacheError::serialize)?;
        Ok(Self::text(body, JSON_CONTENT_TYPE, cache_control))
    }

    pub fn as_text(&self) -> Result<&str, CacheError> {
        std::str::from_utf8(&self.body).map_err(CacheError::deserialize)
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        serde_json::from_slice(&self.body).map_err(CacheError::deserialize)
    }
}

/// A single named cache.
#[async_trait]
pub trait BlobCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, CacheError>;

    /// Store `blob` under `key`, replacing any previous value.
    async fn put(&self, key: &str, blob: StoredBlob) -> Result<(), CacheError>;

    /// Remove `key`; returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Opens named caches, creating them on first use.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn open(&self, name: &str) -> Result<Arc<dyn BlobCache>, CacheError>;
}
