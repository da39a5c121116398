//! Integration tests for the uniform error envelope: routing misses, body
//! parsing, redaction and panics.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    routing::get,
};
use bastion_control_api::error::{handle_panic, route_not_found};
use bastion_control_test_fixtures::{
    body_json, create_test_app, create_test_state, empty_request, send, send_json,
};
use tower_http::catch_panic::CatchPanicLayer;

#[tokio::test]
async fn test_unknown_route_is_not_found_envelope() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = send_json(&app, empty_request("GET", "/control/v1/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["message"], "Route not found");
}

#[tokio::test]
async fn test_wrong_method_is_an_envelope() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = send_json(&app, empty_request("PUT", "/control/v1/jobs")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error_at_root() {
    let app = create_test_app(create_test_state().await);

    let request = Request::builder()
        .method("POST")
        .uri("/control/v1/jobs")
        .header("content-type", "application/json")
        .body(Body::from("{\"ownerId\": \"u\", "))
        .unwrap();
    let (status, _, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"][0]["fieldPath"], "");
    assert_eq!(body["details"][0]["code"], "invalid_json");
}

#[tokio::test]
async fn test_missing_content_type_is_rejected() {
    let app = create_test_app(create_test_state().await);

    let request = Request::builder()
        .method("POST")
        .uri("/control/v1/jobs")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["fieldPath"], "");
}

#[tokio::test]
async fn test_failure_message_with_secret_is_redacted() {
    let app = create_test_app(create_test_state().await);

    let request = Request::builder()
        .method("POST")
        .uri("/control/v1/faults/failure")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "targetService": "jobs",
                "message": "db failed password=hunter2",
                "probability": 1.0,
            })
            .to_string(),
        ))
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::OK);

    let (status, _, body) = send_json(&app, empty_request("GET", "/control/v1/jobs/job_x")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let message = body["message"].as_str().unwrap();
    assert!(!message.contains("hunter2"), "leaked: {message}");
    assert!(message.contains("[REDACTED]"));
}

#[tokio::test]
async fn test_panics_become_internal_error_envelope() {
    async fn boom() -> &'static str {
        panic!("secret=do-not-leak")
    }

    let app = Router::new()
        .route("/boom", get(boom))
        .fallback(route_not_found)
        .layer(CatchPanicLayer::custom(handle_panic));

    let response = send(&app, empty_request("GET", "/boom")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert_eq!(body["message"], "An internal error occurred");
    assert!(!body.to_string().contains("do-not-leak"));
}
