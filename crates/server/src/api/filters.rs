//! Filter CRUD endpoints.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use trawler_core::{Filter, RepoError};

use crate::state::AppState;

fn map_error(e: RepoError) -> StatusCode {
    match e {
        RepoError::NotFound => StatusCode::NOT_FOUND,
        RepoError::Database(e) => {
            error!("repository error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn validate_filter(filter: &Filter) -> Result<(), String> {
    if filter.name.trim().is_empty() {
        return Err("filter name must not be empty".to_string());
    }
    if filter.action.client.trim().is_empty() {
        return Err("filter action needs a download client".to_string());
    }
    Ok(())
}

pub async fn list(State(state): State<Arc<AppState>>) -> Response {
    match state.filter_repo().list_filters() {
        Ok(filters) => Json(filters).into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.filter_repo().get_filter(id) {
        Ok(Some(filter)) => Json(filter).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn store(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Filter>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(mut filter)) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if let Err(reason) = validate_filter(&filter) {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    match state.filter_repo().store_filter(&mut filter) {
        Ok(()) => Json(filter).into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<Filter>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(mut filter)) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    filter.id = id;
    if let Err(reason) = validate_filter(&filter) {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    match state.filter_repo().update_filter(&filter) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.filter_repo().delete_filter(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}
