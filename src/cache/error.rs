use thiserror::Error;

/// Errors raised by the cache engine and its storage collaborators.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no request context is active; cached calls and triggers must run inside a request scope")]
    MissingContext,
    #[error("invariant revalidate: 0 can not be passed to cached(), must be `None` or greater than zero")]
    InvalidRevalidate,
    #[error("invalid cache key `{key}`: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("invalid path pattern `{pattern}`: {reason}")]
    InvalidGlob { pattern: String, reason: String },
    #[error("invalid header value `{0}`")]
    InvalidHeader(String),
    #[error("failed to serialise cache payload: {0}")]
    Serialize(String),
    #[error("failed to deserialise cache payload: {0}")]
    Deserialize(String),
    #[error("cache storage failure: {message}")]
    Storage { message: String },
    #[error("background cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_glob(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGlob {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn serialize(message: impl ToString) -> Self {
        Self::Serialize(message.to_string())
    }

    pub fn deserialize(message: impl ToString) -> Self {
        Self::Deserialize(message.to_string())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// Error returned by a memoized call.
///
/// `Fetch` carries the wrapped fetcher's own error untouched; `Cache` carries
/// engine failures that sit on the critical path of producing the value.
#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error(transparent)]
    Fetch(E),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl<E> CallError<E> {
    /// Returns the fetcher error, if that is what failed.
    pub fn into_fetch(self) -> Option<E> {
        match self {
            CallError::Fetch(err) => Some(err),
            CallError::Cache(_) => None,
        }
    }
}
