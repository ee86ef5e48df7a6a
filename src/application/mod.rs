//! Application services built on the cache engine.

pub mod error;
pub mod users;
