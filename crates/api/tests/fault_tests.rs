//! Integration tests for fault injection and its effect on control routes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::StatusCode;
use bastion_control_test_fixtures::{
    create_test_app, create_test_state, empty_request, get_json, post_json, send, send_json,
};
use serde_json::json;

#[tokio::test]
async fn test_certain_failure_is_applied_and_listed() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = post_json(
        &app,
        "/control/v1/faults/failure",
        json!({ "targetService": "jobs", "message": "database unreachable", "probability": 1.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["applied"], true);
    assert_eq!(
        body["message"],
        "Simulated injection of failure into jobs with message: \"database unreachable\""
    );
    assert!(body["expiresAt"].is_string());

    let (_, _, list) = get_json(&app, "/control/v1/faults").await;
    let faults = list["faults"].as_array().unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0]["targetService"], "jobs");
    assert_eq!(faults[0]["kind"], "FAILURE");
}

#[tokio::test]
async fn test_zero_probability_is_never_applied() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = post_json(
        &app,
        "/control/v1/faults/latency",
        json!({ "targetService": "jobs", "durationMs": 100, "probability": 0.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["applied"], false);
    assert_eq!(
        body["message"],
        "Latency injection request received for jobs, but not executed (below probability threshold)."
    );

    let (_, _, list) = get_json(&app, "/control/v1/faults").await;
    assert!(list["faults"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_injected_failure_degrades_target_routes() {
    let app = create_test_app(create_test_state().await);

    post_json(
        &app,
        "/control/v1/faults/failure",
        json!({ "targetService": "ratelimit", "message": "limiter offline", "probability": 1.0 }),
    )
    .await;

    let (status, _, body) = post_json(
        &app,
        "/control/v1/ratelimit/consume",
        json!({ "tier": "general", "callerKey": "ip:203.0.113.7" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert_eq!(body["message"], "limiter offline");

    // other services are untouched
    let (status, _, _) = get_json(&app, "/control/v1/credentials/ca").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_fault_routes_are_never_degraded() {
    let app = create_test_app(create_test_state().await);

    post_json(
        &app,
        "/control/v1/faults/failure",
        json!({ "targetService": "faults", "message": "should not apply", "probability": 1.0 }),
    )
    .await;

    let (status, _, _) = get_json(&app, "/control/v1/faults").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_clear_by_service_and_clear_all() {
    let app = create_test_app(create_test_state().await);

    for service in ["jobs", "credentials"] {
        post_json(
            &app,
            "/control/v1/faults/latency",
            json!({ "targetService": service, "durationMs": 1, "probability": 1.0 }),
        )
        .await;
    }

    let (status, _, body) = send_json(&app, empty_request("DELETE", "/control/v1/faults/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);

    let (_, _, list) = get_json(&app, "/control/v1/faults").await;
    assert_eq!(list["faults"].as_array().unwrap().len(), 1);

    let (_, _, body) = send_json(&app, empty_request("DELETE", "/control/v1/faults")).await;
    assert_eq!(body["removed"], 1);

    let response = send(&app, empty_request("DELETE", "/control/v1/faults/Bad..Name")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_injection_limits_are_validated() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = post_json(
        &app,
        "/control/v1/faults/latency",
        json!({ "targetService": "jobs", "durationMs": 60_001, "probability": 1.5 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let paths: Vec<&str> =
        body["details"].as_array().unwrap().iter().map(|d| d["fieldPath"].as_str().unwrap()).collect();
    assert_eq!(paths, vec!["durationMs", "probability"]);
}
