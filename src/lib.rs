//! Stashkit: memoize async fetchers behind a shared blob cache and invalidate
//! them by tag or by request path.

pub mod application;
pub mod cache;
pub mod config;
pub mod context;
pub mod infra;
