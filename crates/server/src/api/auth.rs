//! Cookie-session authentication.
//!
//! The process serves plaintext behind a reverse proxy; the session cookie
//! is HttpOnly + SameSite=Lax by default and upgraded to Secure +
//! SameSite=Strict when the request carries `X-Forwarded-Proto: https`.

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::session::{session_token, SESSION_COOKIE};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

fn forwarded_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("https"))
}

fn session_cookie(state: &AppState, headers: &HeaderMap, value: &str, max_age: Option<u32>) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; HttpOnly",
        SESSION_COOKIE,
        value,
        state.config().server.base_url
    );
    // SameSite=Strict requires a Secure cookie, so the upgrade is tied to
    // the forwarded protocol.
    if forwarded_https(headers) {
        cookie.push_str("; Secure; SameSite=Strict");
    } else {
        cookie.push_str("; SameSite=Lax");
    }
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    cookie
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let auth = &state.config().auth;
    if request.username != auth.username || request.password != auth.password {
        warn!(username = %request.username, "login rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let token = state.sessions().create();
    info!(username = %request.username, "login ok");

    (
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            session_cookie(&state, &headers, &token, None),
        )],
    )
        .into_response()
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_token)
    {
        state.sessions().revoke(token);
    }

    (
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            session_cookie(&state, &headers, "", Some(0)),
        )],
    )
        .into_response()
}

/// Session probe for the UI: 204 when the middleware let us through.
pub async fn test() -> StatusCode {
    StatusCode::NO_CONTENT
}
