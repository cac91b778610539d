//! Release history endpoint: pagination plus `indexer` and `action_status`
//! predicates.

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use trawler_core::release::{Release, ReleaseActionStatus};
use trawler_core::{ReleaseQuery, ReleaseStatus};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReleaseQueryParams {
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    limit: u64,
    indexer: Option<String>,
    action_status: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReleaseWithStatuses {
    #[serde(flatten)]
    release: Release,
    action_status: Vec<ReleaseActionStatus>,
}

#[derive(Debug, Serialize)]
struct ReleaseListResponse {
    data: Vec<ReleaseWithStatuses>,
    count: u64,
    offset: u64,
    limit: u64,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReleaseQueryParams>,
) -> Response {
    let action_status = match params.action_status.as_deref() {
        None | Some("") => None,
        Some(raw) => match ReleaseStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("unknown action_status {:?}", raw),
                )
                    .into_response();
            }
        },
    };

    let query = ReleaseQuery {
        offset: params.offset,
        limit: params.limit.clamp(0, 500),
        indexer: params.indexer.clone(),
        action_status,
    };

    let repo = state.release_repo();
    let (releases, count) = match repo
        .query_releases(&query)
        .and_then(|releases| repo.count_releases(&query).map(|count| (releases, count)))
    {
        Ok(result) => result,
        Err(e) => {
            error!("repository error: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut data = Vec::with_capacity(releases.len());
    for release in releases {
        let action_status = repo.list_statuses(release.id).unwrap_or_default();
        data.push(ReleaseWithStatuses {
            release,
            action_status,
        });
    }

    Json(ReleaseListResponse {
        data,
        count,
        offset: query.offset,
        limit: query.limit,
    })
    .into_response()
}
