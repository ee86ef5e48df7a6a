//! Per-request context.
//!
//! The HTTP middleware creates one [`RequestContext`] per inbound request and
//! installs it with [`scope`]. Cache operations read it back through
//! [`current`] to learn the request URL, to set response headers and to hand
//! off deferred work to the process-wide [`BackgroundTasks`] tracker.

mod background;

use std::future::Future;
use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;
use uuid::Uuid;

use crate::cache::CacheError;
use crate::cache::lock::lock_or_recover;

pub use background::BackgroundTasks;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// State shared by everything running on behalf of one request.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

struct Inner {
    request_id: Uuid,
    url: Url,
    response_headers: Mutex<HeaderMap>,
    background: BackgroundTasks,
}

impl RequestContext {
    pub fn new(url: Url, background: BackgroundTasks) -> Self {
        Self {
            inner: Arc::new(Inner {
                request_id: Uuid::new_v4(),
                url,
                response_headers: Mutex::new(HeaderMap::new()),
                background,
            }),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Path component of the request URL, always starting with `/`.
    pub fn pathname(&self) -> &str {
        self.inner.url.path()
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.inner.background
    }

    /// Set a header on the eventual response, replacing any earlier value.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        lock_or_recover(&self.inner.response_headers, "set_response_header").insert(name, value);
    }

    /// Drain the headers collected so far.
    pub fn take_response_headers(&self) -> HeaderMap {
        std::mem::take(&mut *lock_or_recover(
            &self.inner.response_headers,
            "take_response_headers",
        ))
    }
}

/// Run `fut` with `ctx` as the current request context.
pub async fn scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// The context of the request being served on this task.
pub fn current() -> Result<RequestContext, CacheError> {
    CURRENT
        .try_with(RequestContext::clone)
        .map_err(|_| CacheError::MissingContext)
}
