//! Options accepted by [`CacheEngine::cached`](super::CacheEngine::cached).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, ready};

use super::error::CacheError;
use super::transformer::Transformer;

type DeriveTags<A> = dyn Fn(&A) -> BoxFuture<'static, Result<Vec<String>, CacheError>> + Send + Sync;

/// Invalidation tags for a memoized function.
pub enum Tags<A> {
    /// The same tags for every call.
    Fixed(Vec<String>),
    /// Tags computed from each call's arguments.
    Derived(Arc<DeriveTags<A>>),
}

impl<A> Tags<A> {
    pub fn none() -> Self {
        Tags::Fixed(Vec::new())
    }

    pub fn fixed<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tags::Fixed(tags.into_iter().map(Into::into).collect())
    }

    pub fn from_fn<F>(derive: F) -> Self
    where
        A: 'static,
        F: Fn(&A) -> Vec<String> + Send + Sync + 'static,
    {
        Tags::Derived(Arc::new(move |args: &A| ready(Ok(derive(args))).boxed()))
    }

    pub fn from_async<F, Fut>(derive: F) -> Self
    where
        A: 'static,
        F: Fn(&A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<String>, CacheError>> + Send + 'static,
    {
        Tags::Derived(Arc::new(move |args: &A| derive(args).boxed()))
    }

    pub async fn resolve(&self, args: &A) -> Result<Vec<String>, CacheError> {
        match self {
            Tags::Fixed(tags) => Ok(tags.clone()),
            Tags::Derived(derive) => derive(args).await,
        }
    }
}

impl<A> Clone for Tags<A> {
    fn clone(&self) -> Self {
        match self {
            Tags::Fixed(tags) => Tags::Fixed(tags.clone()),
            Tags::Derived(derive) => Tags::Derived(derive.clone()),
        }
    }
}

impl<A> Default for Tags<A> {
    fn default() -> Self {
        Tags::none()
    }
}

impl<A> fmt::Debug for Tags<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tags::Fixed(tags) => f.debug_tuple("Fixed").field(tags).finish(),
            Tags::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// `transformer`, `revalidate` (seconds, `None` for no expiry) and `tags`.
pub struct CacheOptions<A> {
    pub transformer: Option<Arc<dyn Transformer>>,
    pub revalidate: Option<u64>,
    pub tags: Tags<A>,
}

impl<A> CacheOptions<A> {
    pub fn new() -> Self {
        Self {
            transformer: None,
            revalidate: None,
            tags: Tags::none(),
        }
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Seconds a stored value stays valid. Zero is rejected when wrapping.
    pub fn revalidate(mut self, seconds: u64) -> Self {
        self.revalidate = Some(seconds);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Tags::fixed(tags);
        self
    }

    pub fn tags_with(mut self, tags: Tags<A>) -> Self {
        self.tags = tags;
        self
    }
}

impl<A> Default for CacheOptions<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for CacheOptions<A> {
    fn clone(&self) -> Self {
        Self {
            transformer: self.transformer.clone(),
            revalidate: self.revalidate,
            tags: self.tags.clone(),
        }
    }
}
