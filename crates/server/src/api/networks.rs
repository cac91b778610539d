//! Network and channel management endpoints.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use trawler_core::{IrcChannel, IrcNetwork, SupervisorError};

use crate::state::AppState;

fn map_error(e: SupervisorError) -> StatusCode {
    match e {
        SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
        SupervisorError::Repo(trawler_core::RepoError::NotFound) => StatusCode::NOT_FOUND,
        SupervisorError::Repo(e) => {
            error!("repository error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Reject configurations that violate an invariant before any side effect.
fn validate_network(network: &IrcNetwork) -> Result<(), String> {
    if network.server.trim().is_empty() {
        return Err("server must not be empty".to_string());
    }
    if network.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if network.nickserv.account.trim().is_empty() {
        return Err("nickserv account must not be empty".to_string());
    }
    if network.port == 0 {
        return Err("port must not be 0".to_string());
    }
    Ok(())
}

pub async fn list(State(state): State<Arc<AppState>>) -> Response {
    match state.supervisor().networks_with_health() {
        Ok(networks) => Json(networks).into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.supervisor().get_network(id) {
        Ok(network) => Json(network).into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn store(
    State(state): State<Arc<AppState>>,
    body: Result<Json<IrcNetwork>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(mut network)) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if let Err(reason) = validate_network(&network) {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    match state.supervisor().store_network(&mut network).await {
        Ok(()) => Json(network).into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<IrcNetwork>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(mut network)) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    network.id = id;
    if let Err(reason) = validate_network(&network) {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    match state.supervisor().update_network(&network).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.supervisor().delete_network(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn store_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<IrcChannel>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(mut channel)) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if channel.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "channel name must not be empty").into_response();
    }

    match state.supervisor().store_channel(id, &mut channel).await {
        Ok(()) => Json(channel).into_response(),
        Err(e) => map_error(e).into_response(),
    }
}
