//! integration tests for the /oidc surface.
//!
//! these cover the parts of the bridge that do not require a live provider:
//! input validation, the state cookie, and csrf enforcement. the token
//! exchange itself is exercised against a real provider in deployment.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use tower::ServiceExt;

use common::*;
use wirefire_db::queries;

fn app(state: &wirefire::AppState) -> axum::Router {
    wirefire::create_app(state.clone())
}

#[tokio::test]
async fn login_without_flow_is_bad_request() {
    let state = test_state().await;

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/oidc/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_with_mismatched_state_is_bad_request() {
    let state = test_state().await;

    // state query without a matching cookie
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/oidc/callback?state=abc&code=xyz")
                .header(header::COOKIE, "state=different")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_post_without_csrf_token_is_forbidden_and_changes_nothing() {
    let state = test_state().await;
    let peer = peer_key(1);

    // an in-flight registration that must remain untouched
    let data = json!({"Version": 68, "Hostinfo": {"Hostname": "laptop"}});
    queries::create_registration_request(state.db.conn(), "a0a1a2a3a4a5a6a7", &peer, &data)
        .await
        .unwrap();

    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oidc/callback")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "rid=a0a1a2a3a4a5a6a7&tailnet=1&token=Zm9v&csrf_token=bogus",
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let rr = queries::find_registration_request(state.db.conn(), "a0a1a2a3a4a5a6a7")
        .await
        .unwrap()
        .unwrap();
    assert!(!rr.authenticated, "csrf failure must not authenticate");
    assert!(rr.error.is_empty(), "csrf failure must not record an error");
    assert!(rr.user.is_none());
}

#[tokio::test]
async fn callback_post_with_forged_cookie_is_forbidden() {
    let state = test_state().await;

    // cookie present but the form token does not pair with it
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oidc/callback")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::COOKIE, format!("csrf_token={}", "ab".repeat(32)))
                .body(Body::from("rid=x&tailnet=1&token=Zm9v&csrf_token=not-the-pair"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
