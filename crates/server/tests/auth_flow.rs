//! Cookie-session auth flow against the real router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use trawler_core::testing::MockConnector;
use trawler_core::{
    load_config_from_str, DownloadClientPool, IndexerRegistry, IrcSupervisor, ReleasePipeline,
    SqliteRepo,
};
use trawler_server::{create_router, AppState};

fn test_app() -> Router {
    let config = load_config_from_str(
        r#"
[auth]
username = "operator"
password = "hunter2"
"#,
    )
    .unwrap();

    let repo = Arc::new(SqliteRepo::in_memory().unwrap());
    let registry = Arc::new(IndexerRegistry::new(vec![], &[]).unwrap());
    let pipeline = Arc::new(ReleasePipeline::new(
        repo.clone(),
        repo.clone(),
        Arc::new(DownloadClientPool::new()),
        config.pipeline.clone(),
    ));
    let supervisor = Arc::new(IrcSupervisor::new(
        repo.clone(),
        registry,
        pipeline,
        Arc::new(MockConnector::new()),
        config.irc.clone(),
    ));

    let state = Arc::new(AppState::new(config, supervisor, repo.clone(), repo));
    create_router(state)
}

fn login_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Extract `trawler_session=...` from the Set-Cookie header.
fn session_cookie(response: &axum::response::Response) -> Option<String> {
    let set_cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = set_cookie.split(';').next()?;
    pair.starts_with("trawler_session=").then(|| pair.to_string())
}

#[tokio::test]
async fn test_login_wrong_credentials() {
    let app = test_app();

    let response = app
        .oneshot(login_request(
            r#"{"username": "operator", "password": "wrong"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_login_malformed_body() {
    let app = test_app();

    let response = app
        .oneshot(login_request("this is not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_sets_http_only_lax_cookie() {
    let app = test_app();

    let response = app
        .oneshot(login_request(
            r#"{"username": "operator", "password": "hunter2"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("trawler_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(!set_cookie.contains("Secure"));
}

#[tokio::test]
async fn test_login_behind_https_proxy_upgrades_cookie() {
    let app = test_app();

    let mut request = login_request(r#"{"username": "operator", "password": "hunter2"}"#);
    request
        .headers_mut()
        .insert("X-Forwarded-Proto", "https".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("SameSite=Strict"));
}

#[tokio::test]
async fn test_session_probe() {
    let app = test_app();

    // Without a session: 403.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Log in and retry with the cookie: 204.
    let login = app
        .clone()
        .oneshot(login_request(
            r#"{"username": "operator", "password": "hunter2"}"#,
        ))
        .await
        .unwrap();
    let cookie = session_cookie(&login).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/test")
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let app = test_app();

    let login = app
        .clone()
        .oneshot(login_request(
            r#"{"username": "operator", "password": "hunter2"}"#,
        ))
        .await
        .unwrap();
    let cookie = session_cookie(&login).unwrap();

    let logout = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/logout")
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    // The old cookie no longer authenticates.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/test")
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_protected_routes_need_session() {
    let app = test_app();

    for uri in ["/api/v1/irc", "/api/v1/filters", "/api/v1/releases"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }

    // Health stays open for the reverse proxy.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
