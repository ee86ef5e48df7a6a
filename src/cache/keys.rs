//! Locator derivation.
//!
//! Every value the engine persists lives under a URL-shaped locator built
//! from the current request origin and a configurable namespace segment:
//!
//! - memoized entries: `<origin>/<ns>/__cache__<pathname>?key=<part>&key=...`
//! - invalidator records: `<origin>/<ns>/__<kind>/<identifier>`
//! - tracked key lists: `<origin>/<ns>/__keys`

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::error::CacheError;

/// The two invalidation dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidatorKind {
    Tag,
    Path,
}

impl InvalidatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidatorKind::Tag => "tag",
            InvalidatorKind::Path => "path",
        }
    }
}

impl fmt::Display for InvalidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin plus namespace that all locators of one request are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    origin: String,
    namespace: String,
}

impl KeySpace {
    pub fn new(url: &Url, namespace: &str) -> Self {
        Self {
            origin: url.origin().ascii_serialization(),
            namespace: namespace.trim_matches('/').to_string(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Locator for one memoized call.
    pub fn cache_key(&self, pathname: &str, parts: &[String]) -> Result<String, CacheError> {
        let base = format!(
            "{}/{}/__cache__/{}",
            self.origin,
            self.namespace,
            pathname.trim_start_matches('/')
        );
        let mut url =
            Url::parse(&base).map_err(|err| CacheError::invalid_key(&base, err.to_string()))?;
        if !parts.is_empty() {
            let mut query = url.query_pairs_mut();
            for part in parts {
                query.append_pair("key", part);
            }
        }
        Ok(url.into())
    }

    /// Storage locator for an invalidation identifier (a tag or a path).
    ///
    /// Identifiers that already carry the namespace marker are returned as-is,
    /// so keys listed by an invalidator can be fed straight back into it.
    /// Tags are opaque and appended verbatim; paths drop their leading `/`.
    pub fn identifier_key(&self, kind: InvalidatorKind, identifier: &str) -> String {
        let marker = self.marker(kind);
        if identifier.contains(&marker) {
            return identifier.to_string();
        }
        let identifier = match kind {
            InvalidatorKind::Tag => identifier,
            InvalidatorKind::Path => identifier.trim_start_matches('/'),
        };
        format!("{}{}{}", self.origin, marker, identifier)
    }

    /// Locator of the side list that records every key written to a store.
    pub fn keys_sentinel(&self) -> String {
        format!("{}/{}/__keys", self.origin, self.namespace)
    }

    fn marker(&self, kind: InvalidatorKind) -> String {
        format!("/{}/__{}/", self.namespace, kind.as_str())
    }
}

/// Turn call arguments into locator parts.
///
/// `()` contributes nothing, tuples and sequences contribute one part per
/// element, any other value one part. Strings are used verbatim; everything
/// else is rendered as JSON.
pub fn key_parts_from_args<A: Serialize + ?Sized>(args: &A) -> Result<Vec<String>, CacheError> {
    let value = serde_json::to_value(args).map_err(CacheError::serialize)?;
    let parts = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(part_text).collect(),
        other => vec![part_text(other)],
    };
    Ok(parts)
}

fn part_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
