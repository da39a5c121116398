//! Integration tests for the tiered rate limiter.
//!
//! Covers the middleware on `/control/v1` routes (headers, 429 envelope,
//! per-caller isolation, API-key tier) and the `consume` RPC.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bastion_control_config::Config;
use bastion_control_test_fixtures::{
    body_json, create_test_app, create_test_state, create_test_state_with, post_json, send,
    test_config,
};
use serde_json::json;

fn with_general_limit(limit: u32) -> Config {
    let mut config = test_config();
    config.general_limit = limit;
    config
}

fn faults_request(ip: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/control/v1/faults")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

fn issue_request(ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/control/v1/credentials/issue")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(
            json!({ "serviceName": "feed", "commonName": "feed-1.internal" }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_allowed_requests_carry_quota_headers() {
    let app = create_test_app(create_test_state().await);

    let response = send(&app, faults_request("203.0.113.1")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers["x-ratelimit-limit"], "100");
    assert_eq!(headers["x-ratelimit-remaining"], "99");
    assert!(headers.get("x-ratelimit-reset").is_some());
}

#[tokio::test]
async fn test_general_limit_returns_429_envelope() {
    let config = with_general_limit(2);
    let app = create_test_app(create_test_state_with(config).await);

    for _ in 0..2 {
        assert_eq!(send(&app, faults_request("203.0.113.2")).await.status(), StatusCode::OK);
    }

    let response = send(&app, faults_request("203.0.113.2")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 =
        response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after >= 1);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["details"]["limit"], 2);
    assert_eq!(body["details"]["remaining"], 0);
    assert_eq!(body["details"]["retryAfterSeconds"], retry_after);
    assert!(body["details"]["resetAt"].is_string());
}

#[tokio::test]
async fn test_callers_are_isolated() {
    let config = with_general_limit(1);
    let app = create_test_app(create_test_state_with(config).await);

    assert_eq!(send(&app, faults_request("203.0.113.3")).await.status(), StatusCode::OK);
    assert_eq!(
        send(&app, faults_request("203.0.113.3")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(&app, faults_request("203.0.113.4")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_callers_use_their_own_tier() {
    let config = with_general_limit(1);
    let app = create_test_app(create_test_state_with(config).await);

    for _ in 0..3 {
        let request = Request::builder()
            .method("GET")
            .uri("/control/v1/faults")
            .header("x-api-key", "service-key-1")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1000");
    }
}

#[tokio::test]
async fn test_credential_routes_use_auth_tier() {
    let mut config = test_config();
    config.auth_limit = 2;
    let app = create_test_app(create_test_state_with(config).await);

    let first = send(&app, issue_request("203.0.113.5")).await;
    assert_eq!(first.status(), StatusCode::OK);
    // the auth quota is reported, not the general one
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    assert_eq!(send(&app, issue_request("203.0.113.5")).await.status(), StatusCode::OK);

    let rejected = send(&app, issue_request("203.0.113.5")).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(rejected).await;
    assert_eq!(body["message"], "Too many authentication attempts. Please try again later.");
}

#[tokio::test]
async fn test_credential_checks_stay_on_general_tier() {
    let mut config = test_config();
    config.auth_limit = 1;
    let app = create_test_app(create_test_state_with(config).await);

    let issued = body_json(send(&app, issue_request("203.0.113.5")).await).await;

    // a relying service verifying many peers is not held to the auth quota
    for _ in 0..5 {
        let request = Request::builder()
            .method("POST")
            .uri("/control/v1/credentials/verify")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::from(
                json!({
                    "serviceName": "feed",
                    "commonName": "feed-1.internal",
                    "certificate": issued["certificate"],
                })
                .to_string(),
            ))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    }

    for uri in ["/control/v1/credentials/ca", "/control/v1/credentials/revocations"] {
        let request = Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::OK);
    }

    // issuing again is still held to it
    assert_eq!(send(&app, issue_request("203.0.113.5")).await.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_unknown_routes_do_not_consume() {
    let config = with_general_limit(1);
    let app = create_test_app(create_test_state_with(config).await);

    let request = Request::builder()
        .uri("/control/v1/nope")
        .header("x-forwarded-for", "203.0.113.6")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::NOT_FOUND);

    assert_eq!(send(&app, faults_request("203.0.113.6")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_consume_rpc_returns_decision_as_data() {
    let mut config = test_config();
    config.payment_limit = 1;
    let app = create_test_app(create_test_state_with(config).await);

    let consume = json!({ "tier": "payment", "callerKey": "session:abc" });

    let (status, _, first) = post_json(&app, "/control/v1/ratelimit/consume", consume.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["allowed"], true);
    assert_eq!(first["limit"], 1);
    assert_eq!(first["remaining"], 0);

    let (status, _, second) = post_json(&app, "/control/v1/ratelimit/consume", consume).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["allowed"], false);
    assert!(second["retryAfterSeconds"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_consume_rpc_rejects_unknown_tier() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = post_json(
        &app,
        "/control/v1/ratelimit/consume",
        json!({ "tier": "bulk", "callerKey": "ip:1.2.3.4" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"][0]["fieldPath"], "tier");
}
