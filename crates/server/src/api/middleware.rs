//! Session-auth middleware for API routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::session::session_token;
use crate::state::AppState;

/// Reject requests without a valid session cookie. Missing or stale
/// sessions are 403; 401 is reserved for bad login credentials.
pub async fn session_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_token);

    match token {
        Some(token) if state.sessions().validate(token) => Ok(next.run(request).await),
        _ => Err(StatusCode::FORBIDDEN),
    }
}
