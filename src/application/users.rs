//! Demo user directory served through the cache engine.
//!
//! Reads go through memoized fetchers tagged `users` (list and detail) and
//! `user-<id>` (detail). Writes revalidate those tags so the next read refetches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{CacheEngine, CacheOptions, CachedFn, Tags};

use super::error::AppError;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

pub const USERS_TAG: &str = "users";

pub fn user_tag(id: u64) -> String {
    format!("user-{id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Pagination for the user list; part of the list's cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    pub page: usize,
    pub limit: usize,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListParams {
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Result<Self, AppError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::validation("page starts at 1"));
        }
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(AppError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, limit })
    }
}

/// In-memory backing store standing in for a database.
#[derive(Default)]
pub struct UserDirectory {
    users: RwLock<BTreeMap<u64, User>>,
    reads: AtomicUsize,
}

impl UserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|user| (user.id, user)).collect()),
            reads: AtomicUsize::new(0),
        }
    }

    /// A small fixed directory for the demo server.
    pub fn seeded() -> Self {
        Self::new([
            User {
                id: 1,
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
            },
            User {
                id: 2,
                username: "grace".to_string(),
                email: "grace@example.com".to_string(),
            },
            User {
                id: 3,
                username: "linus".to_string(),
                email: "linus@example.com".to_string(),
            },
        ])
    }

    /// Number of reads that reached the directory.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub async fn list(&self, params: ListParams) -> Vec<User> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let skip = (params.page - 1).saturating_mul(params.limit);
        self.users
            .read()
            .await
            .values()
            .skip(skip)
            .take(params.limit)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: u64) -> Option<User> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.users.read().await.get(&id).cloned()
    }

    pub async fn update(&self, id: u64, patch: UserPatch) -> Option<User> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id)?;
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        Some(user.clone())
    }

    pub async fn remove(&self, id: u64) -> bool {
        self.users.write().await.remove(&id).is_some()
    }
}

/// User reads and writes with cache-backed reads.
pub struct UserService {
    engine: CacheEngine,
    directory: Arc<UserDirectory>,
    list: CachedFn<ListParams, Vec<User>, AppError>,
    get: CachedFn<u64, User, AppError>,
}

impl UserService {
    pub fn new(engine: CacheEngine, directory: Arc<UserDirectory>) -> Result<Self, AppError> {
        let source = directory.clone();
        let list = engine.cached(
            move |params: ListParams| {
                let source = source.clone();
                async move { Ok::<_, AppError>(source.list(params).await) }
            },
            ["users"],
            CacheOptions::new().tags([USERS_TAG]),
        )?;

        let source = directory.clone();
        let get = engine.cached(
            move |id: u64| {
                let source = source.clone();
                async move { source.get(id).await.ok_or(AppError::NotFound) }
            },
            ["users", "detail"],
            CacheOptions::new().tags_with(Tags::from_fn(|id: &u64| {
                vec![USERS_TAG.to_string(), user_tag(*id)]
            })),
        )?;

        Ok(Self {
            engine,
            directory,
            list,
            get,
        })
    }

    pub fn directory(&self) -> &Arc<UserDirectory> {
        &self.directory
    }

    pub async fn list(&self, params: ListParams) -> Result<Vec<User>, AppError> {
        Ok(self.list.call(params).await?)
    }

    pub async fn get(&self, id: u64) -> Result<User, AppError> {
        Ok(self.get.call(id).await?)
    }

    pub async fn update(&self, id: u64, patch: UserPatch) -> Result<User, AppError> {
        if patch
            .username
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(AppError::validation("username must not be empty"));
        }
        if patch.email.as_deref().is_some_and(|email| !email.contains('@')) {
            return Err(AppError::validation("email must contain `@`"));
        }

        let user = self
            .directory
            .update(id, patch)
            .await
            .ok_or(AppError::NotFound)?;
        debug!(user_id = id, "user updated");
        self.revalidate_user(id)?;
        Ok(user)
    }

    pub async fn remove(&self, id: u64) -> Result<(), AppError> {
        if !self.directory.remove(id).await {
            return Err(AppError::NotFound);
        }
        info!(user_id = id, "user removed");
        self.revalidate_user(id)?;
        Ok(())
    }

    fn revalidate_user(&self, id: u64) -> Result<(), AppError> {
        self.engine.revalidate_tag(USERS_TAG)?;
        self.engine.revalidate_tag(user_tag(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_are_validated() {
        assert_eq!(ListParams::new(None, None).expect("defaults"), ListParams::default());
        assert!(ListParams::new(Some(0), None).is_err());
        assert!(ListParams::new(None, Some(0)).is_err());
        assert!(ListParams::new(None, Some(MAX_PAGE_SIZE + 1)).is_err());
    }

    #[tokio::test]
    async fn directory_pages_and_counts_reads() {
        let directory = UserDirectory::seeded();

        let first = directory.list(ListParams { page: 1, limit: 2 }).await;
        let second = directory.list(ListParams { page: 2, limit: 2 }).await;

        assert_eq!(
            first.iter().map(|user| user.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            second.iter().map(|user| user.id).collect::<Vec<_>>(),
            vec![3]
        );
        assert_eq!(directory.reads(), 2);
    }

    #[tokio::test]
    async fn directory_updates_and_removes() {
        let directory = UserDirectory::seeded();
        let patch = UserPatch {
            email: Some("ada@lovelace.dev".to_string()),
            ..Default::default()
        };

        let updated = directory.update(1, patch).await.expect("exists");
        assert_eq!(updated.email, "ada@lovelace.dev");
        assert_eq!(updated.username, "ada");

        assert!(directory.remove(1).await);
        assert!(!directory.remove(1).await);
        assert!(directory.get(1).await.is_none());
    }
}
