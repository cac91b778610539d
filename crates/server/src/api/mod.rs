//! HTTP control plane: cookie-session auth, network/filter CRUD and the
//! release history query.

mod auth;
mod filters;
mod middleware;
mod networks;
mod releases;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::state::AppState;

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/v1/auth/test", get(auth::test))
        // Networks
        .route("/api/v1/irc", get(networks::list))
        .route("/api/v1/irc", post(networks::store))
        .route("/api/v1/irc/{id}", get(networks::get))
        .route("/api/v1/irc/{id}", put(networks::update))
        .route("/api/v1/irc/{id}", delete(networks::delete))
        .route("/api/v1/irc/{id}/channels", post(networks::store_channel))
        // Filters
        .route("/api/v1/filters", get(filters::list))
        .route("/api/v1/filters", post(filters::store))
        .route("/api/v1/filters/{id}", get(filters::get))
        .route("/api/v1/filters/{id}", put(filters::update))
        .route("/api/v1/filters/{id}", delete(filters::delete))
        // Releases
        .route("/api/v1/releases", get(releases::query))
        .layer(from_fn_with_state(state.clone(), middleware::session_auth));

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout))
        .merge(protected)
        .with_state(state)
}
