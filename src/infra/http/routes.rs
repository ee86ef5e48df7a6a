use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    application::{
        error::AppError,
        users::{ListParams, UserPatch},
    },
    cache::{CacheHeader, set_cache_header},
};

use super::HttpState;

const USER_MAX_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ListQuery {
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PathPatternQuery {
    pattern: Option<String>,
}

pub(super) async fn list_users(
    State(state): State<HttpState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let params = ListParams::new(query.page, query.limit)?;
    let users = state.users.list(params).await?;
    Ok(Json(json!({ "users": users })).into_response())
}

pub(super) async fn get_user(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
) -> Result<Response, AppError> {
    let user = state.users.get(id).await?;
    set_cache_header(&CacheHeader::new().public().max_age(USER_MAX_AGE))?;
    Ok(Json(json!({ "user": user })).into_response())
}

pub(super) async fn update_user(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
    Json(patch): Json<UserPatch>,
) -> Result<Response, AppError> {
    state.users.update(id, patch).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(super) async fn delete_user(
    State(state): State<HttpState>,
    Path(id): Path<u64>,
) -> Result<Response, AppError> {
    state.users.remove(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(super) async fn revalidate_tag(
    State(state): State<HttpState>,
    Path(tag): Path<String>,
) -> Result<Response, AppError> {
    state.engine.revalidate_tag(tag)?;
    Ok(StatusCode::ACCEPTED.into_response())
}

pub(super) async fn revalidate_path(
    State(state): State<HttpState>,
    Query(query): Query<PathPatternQuery>,
) -> Result<Response, AppError> {
    let pattern = query
        .pattern
        .filter(|pattern| !pattern.trim().is_empty())
        .ok_or_else(|| AppError::validation("`pattern` query parameter is required"))?;
    state.engine.revalidate_path(&pattern)?;
    Ok(StatusCode::ACCEPTED.into_response())
}

pub(super) async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
