//! `Cache-Control` header construction and parsing.

use std::fmt;
use std::time::Duration;

use axum::http::{HeaderValue, header::CACHE_CONTROL};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use super::error::CacheError;

/// One year, the lifetime used for entries that never expire on their own.
pub const ONE_YEAR: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Builder for a `Cache-Control` header value.
///
/// ```
/// use std::time::Duration;
/// use stashkit::cache::CacheHeader;
///
/// let header = CacheHeader::new().public().max_age(Duration::from_secs(60));
/// assert_eq!(header.to_string(), "public, max-age=60");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHeader {
    visibility: Option<Visibility>,
    max_age: Option<Duration>,
    s_maxage: Option<Duration>,
    stale_while_revalidate: Option<Duration>,
    stale_if_error: Option<Duration>,
    no_cache: bool,
    no_store: bool,
    must_revalidate: bool,
    immutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Public,
    Private,
}

impl CacheHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(mut self) -> Self {
        self.visibility = Some(Visibility::Public);
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Some(Visibility::Private);
        self
    }

    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    pub fn s_maxage(mut self, age: Duration) -> Self {
        self.s_maxage = Some(age);
        self
    }

    pub fn stale_while_revalidate(mut self, window: Duration) -> Self {
        self.stale_while_revalidate = Some(window);
        self
    }

    pub fn stale_if_error(mut self, window: Duration) -> Self {
        self.stale_if_error = Some(window);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn must_revalidate(mut self) -> Self {
        self.must_revalidate = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Header for stored entries: `revalidate` seconds, or a year when unset.
    pub fn for_revalidate(revalidate: Option<u64>) -> Self {
        let age = revalidate.map(Duration::from_secs).unwrap_or(ONE_YEAR);
        Self::new().max_age(age)
    }

    /// Extract the `max-age` directive from a header value.
    pub fn parse_max_age(value: &str) -> Option<Duration> {
        directives(value).find_map(|(name, arg)| {
            if name.eq_ignore_ascii_case("max-age") {
                arg?.parse::<u64>().ok().map(Duration::from_secs)
            } else {
                None
            }
        })
    }

    /// Returns true if the header value forbids storing the response.
    pub fn forbids_store(value: &str) -> bool {
        directives(value).any(|(name, _)| name.eq_ignore_ascii_case("no-store"))
    }
}

impl fmt::Display for CacheHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        match self.visibility {
            Some(Visibility::Public) => parts.push("public".to_string()),
            Some(Visibility::Private) => parts.push("private".to_string()),
            None => {}
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if let Some(age) = self.max_age {
            parts.push(format!("max-age={}", age.as_secs()));
        }
        if let Some(age) = self.s_maxage {
            parts.push(format!("s-maxage={}", age.as_secs()));
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        if let Some(window) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={}", window.as_secs()));
        }
        if let Some(window) = self.stale_if_error {
            parts.push(format!("stale-if-error={}", window.as_secs()));
        }
        if self.immutable {
            parts.push("immutable".to_string());
        }
        f.write_str(&parts.join(", "))
    }
}

fn directives(value: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    value.split(',').filter_map(|raw| {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once('=') {
            Some((name, arg)) => Some((name.trim(), Some(arg.trim().trim_matches('"')))),
            None => Some((raw, None)),
        }
    })
}

/// Render a timestamp as an HTTP date (`Tue, 15 Nov 1994 08:12:31 GMT`).
pub fn http_date(at: OffsetDateTime) -> String {
    at.to_offset(time::UtcOffset::UTC)
        .format(HTTP_DATE)
        .unwrap_or_default()
}

/// Set `Cache-Control` on the current request's response.
///
/// This only shapes the outgoing response headers; it does not store anything
/// in the platform cache.
pub fn set_cache_header(header: &CacheHeader) -> Result<String, CacheError> {
    let ctx = crate::context::current()?;
    let rendered = header.to_string();
    let value = HeaderValue::from_str(&rendered)
        .map_err(|_| CacheError::InvalidHeader(rendered.clone()))?;
    ctx.set_response_header(CACHE_CONTROL, value);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn renders_directives_in_stable_order() {
        let header = CacheHeader::new()
            .immutable()
            .max_age(Duration::from_secs(30))
            .public()
            .stale_while_revalidate(Duration::from_secs(5));
        assert_eq!(
            header.to_string(),
            "public, max-age=30, stale-while-revalidate=5, immutable"
        );
    }

    #[test]
    fn revalidate_defaults_to_one_year() {
        assert_eq!(
            CacheHeader::for_revalidate(None).to_string(),
            "max-age=31536000"
        );
        assert_eq!(
            CacheHeader::for_revalidate(Some(90)).to_string(),
            "max-age=90"
        );
    }

    #[test]
    fn parses_max_age_among_other_directives() {
        assert_eq!(
            CacheHeader::parse_max_age("public, s-maxage=10, max-age=60"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(CacheHeader::parse_max_age("no-cache"), None);
        assert_eq!(CacheHeader::parse_max_age("max-age=soon"), None);
    }

    #[test]
    fn detects_no_store() {
        assert!(CacheHeader::forbids_store("private, no-store"));
        assert!(!CacheHeader::forbids_store("max-age=1"));
    }

    #[test]
    fn formats_http_dates() {
        let at = datetime!(1994-11-15 08:12:31 UTC);
        assert_eq!(http_date(at), "Tue, 15 Nov 1994 08:12:31 GMT");
    }

    #[test]
    fn set_cache_header_requires_context() {
        let err = set_cache_header(&CacheHeader::new().no_store()).unwrap_err();
        assert!(matches!(err, CacheError::MissingContext));
    }
}
