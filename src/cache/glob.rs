//! Path glob matching for `revalidate_path`.
//!
//! `*` matches within one path segment, `**/*` matches any number of
//! segments (including none). Everything else is literal. Matches are
//! anchored at the end of the candidate only, so a pattern such as
//! `/users/*` matches full locators that end in `/users/<id>`.

use regex::Regex;

use super::error::CacheError;

#[derive(Debug, Clone)]
pub struct PathGlob {
    pattern: String,
    regex: Regex,
}

impl PathGlob {
    pub fn new(pattern: &str) -> Result<Self, CacheError> {
        let source = translate(pattern);
        let regex = Regex::new(&source)
            .map_err(|err| CacheError::invalid_glob(pattern, err.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

fn translate(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**/*") {
            source.push_str(".*");
            rest = after;
        } else if let Some(after) = rest.strip_prefix('*') {
            source.push_str("[^/]*");
            rest = after;
        } else {
            let end = rest.find('*').unwrap_or(rest.len());
            source.push_str(&regex::escape(&rest[..end]));
            rest = &rest[end..];
        }
    }
    source.push('$');
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "https://example.com/__stashkit/__path";

    fn locator(path: &str) -> String {
        format!("{PREFIX}{path}")
    }

    #[test]
    fn single_star_matches_one_segment() {
        let glob = PathGlob::new("/users/*").expect("valid glob");
        assert!(glob.is_match(&locator("/users/123")));
        assert!(glob.is_match(&locator("/users/456")));
        assert!(!glob.is_match(&locator("/users/123/posts")));
        assert!(!glob.is_match(&locator("/posts/1")));
    }

    #[test]
    fn double_star_matches_any_depth() {
        let glob = PathGlob::new("/users/**/*").expect("valid glob");
        assert!(glob.is_match(&locator("/users/123")));
        assert!(glob.is_match(&locator("/users/123/posts/9")));
        assert!(glob.is_match(&locator("/users/")));
        assert!(!glob.is_match(&locator("/posts/1")));
    }

    #[test]
    fn literal_pattern_is_anchored_at_end_only() {
        let glob = PathGlob::new("/users").expect("valid glob");
        assert!(glob.is_match(&locator("/users")));
        assert!(glob.is_match(&locator("/admin/users")));
        assert!(!glob.is_match(&locator("/users/1")));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let glob = PathGlob::new("/files/a.txt").expect("valid glob");
        assert!(glob.is_match(&locator("/files/a.txt")));
        assert!(!glob.is_match(&locator("/files/abtxt")));
    }

    #[test]
    fn keeps_original_pattern() {
        let glob = PathGlob::new("/a/*").expect("valid glob");
        assert_eq!(glob.pattern(), "/a/*");
    }
}
