//! Conversion between stored text and structured cache entries.

use serde_json::Value;

use super::error::CacheError;

/// Serialises whole cache entries to the text kept in the platform cache.
///
/// The engine hands the transformer a JSON document of the form
/// `{"pathname": .., "value": .., "tags": [..]}` and expects the same
/// document back from [`Transformer::deserialise`].
pub trait Transformer: Send + Sync {
    fn serialise(&self, entry: &Value) -> Result<String, CacheError>;

    fn deserialise(&self, text: &str) -> Result<Value, CacheError>;
}

/// Plain `serde_json` text, the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransformer;

impl Transformer for JsonTransformer {
    fn serialise(&self, entry: &Value) -> Result<String, CacheError> {
        serde_json::to_string(entry).map_err(CacheError::serialize)
    }

    fn deserialise(&self, text: &str) -> Result<Value, CacheError> {
        serde_json::from_str(text).map_err(CacheError::deserialize)
    }
}
