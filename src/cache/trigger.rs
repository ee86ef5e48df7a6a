//! Invalidation triggers.
//!
//! Both triggers are fire-and-forget: they hand their work to the current
//! request's background tracker and return at once. Only later calls observe
//! the effect, never the call that is currently running.

use metrics::counter;
use tracing::{debug, info};

use super::engine::CacheEngine;
use super::error::CacheError;
use super::glob::PathGlob;
use super::keys::InvalidatorKind;
use crate::context;

impl CacheEngine {
    /// Flag every entry registered under `tag` for refetch on next access.
    pub fn revalidate_tag(&self, tag: impl Into<String>) -> Result<(), CacheError> {
        let ctx = context::current()?;
        let space = self.key_space(&ctx);
        let tag = tag.into();
        info!(tag = %tag, request_id = %ctx.request_id(), "revalidating tag");
        counter!("stashkit_revalidate_total", "kind" => InvalidatorKind::Tag.as_str()).increment(1);

        let engine = self.clone();
        ctx.background().wait_until("revalidate.tag", async move {
            engine.tag_invalidator().revalidate(&space, &tag).await
        });
        Ok(())
    }

    /// Flag every entry registered under a path matching `pattern`.
    ///
    /// `*` matches one path segment and `**/*` any number of them. Known
    /// paths are enumerated in the background and each match is revalidated
    /// as its own task.
    pub fn revalidate_path(&self, pattern: &str) -> Result<(), CacheError> {
        let ctx = context::current()?;
        let space = self.key_space(&ctx);
        let glob = PathGlob::new(pattern)?;
        info!(pattern, request_id = %ctx.request_id(), "revalidating paths");
        counter!("stashkit_revalidate_total", "kind" => InvalidatorKind::Path.as_str()).increment(1);

        let engine = self.clone();
        let background = ctx.background().clone();
        ctx.background().wait_until("revalidate.path", async move {
            let known = engine.path_invalidator().keys(&space).await?;
            let matches: Vec<String> = known.into_iter().filter(|key| glob.is_match(key)).collect();
            debug!(pattern = glob.pattern(), matched = matches.len(), "path glob expanded");

            for identifier in matches {
                let engine = engine.clone();
                let space = space.clone();
                background.wait_until("revalidate.path.match", async move {
                    engine.path_invalidator().revalidate(&space, &identifier).await
                });
            }
            Ok(())
        });
        Ok(())
    }
}
