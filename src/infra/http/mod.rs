//! HTTP adapter: axum router over the demo user service and the cache triggers.

mod middleware;
mod routes;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::{application::users::UserService, cache::CacheEngine, context::BackgroundTasks};

pub use middleware::{log_responses, request_scope};

#[derive(Clone)]
pub struct HttpState {
    pub users: Arc<UserService>,
    pub engine: CacheEngine,
    pub background: BackgroundTasks,
}

pub fn build_router(state: HttpState) -> Router {
    let background = state.background.clone();

    Router::new()
        .route("/users", get(routes::list_users))
        .route(
            "/users/{id}",
            get(routes::get_user)
                .put(routes::update_user)
                .delete(routes::delete_user),
        )
        .route("/revalidate/tag/{tag}", post(routes::revalidate_tag))
        .route("/revalidate/path", post(routes::revalidate_path))
        .route("/health", get(routes::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn_with_state(background, request_scope))
}
