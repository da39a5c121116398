#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Integration tests for health check and metrics endpoints.
//!
//! These routes sit outside `/control/v1`, so they are never rate limited or
//! degraded by fault rules.

use axum::http::StatusCode;
use bastion_control_test_fixtures::{
    create_test_app, create_test_state, empty_request, get_json, post_json, send,
};
use serde_json::json;

#[tokio::test]
async fn test_livez_returns_200() {
    let app = create_test_app(create_test_state().await);

    let response = send(&app, empty_request("GET", "/livez")).await;
    assert_eq!(response.status(), StatusCode::OK, "Livez should always return 200");
}

#[tokio::test]
async fn test_readyz_and_startupz_return_200_with_healthy_storage() {
    let app = create_test_app(create_test_state().await);

    for path in ["/readyz", "/startupz"] {
        let response = send(&app, empty_request("GET", path)).await;
        assert_eq!(response.status(), StatusCode::OK, "{path} should be ready");
    }
}

#[tokio::test]
async fn test_healthz_returns_json_with_expected_fields() {
    let app = create_test_app(create_test_state().await);

    let (status, _, json) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "bastion-control");
    assert!(json["version"].as_str().is_some(), "Should have a version string");
    assert_eq!(json["instance_id"], "test-instance");
    assert!(json["uptime_seconds"].as_u64().is_some(), "Should have uptime_seconds");
    assert_eq!(json["storage_healthy"], true);
    // no leader election in tests
    assert_eq!(json["is_leader"], false);
}

#[tokio::test]
async fn test_health_routes_carry_no_rate_limit_headers() {
    let app = create_test_app(create_test_state().await);

    let response = send(&app, empty_request("GET", "/healthz")).await;
    assert!(response.headers().get("x-ratelimit-limit").is_none());
}

#[tokio::test]
async fn test_metrics_exposes_prometheus_text() {
    bastion_control_core::metrics::install_prometheus().unwrap();
    let app = create_test_app(create_test_state().await);

    // generate at least one series
    let _ = post_json(
        &app,
        "/control/v1/ratelimit/consume",
        json!({ "tier": "general", "callerKey": "ip:203.0.113.9" }),
    )
    .await;

    let response = send(&app, empty_request("GET", "/metrics")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"), "metrics output: {text}");
}
