// Test fixtures are allowed to use unwrap/expect for clear failure messages
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Test fixtures and utilities for Bastion Control API integration tests.
//!
//! Every helper works against the full Axum router backed by an in-memory
//! storage backend and an ephemeral master key, with job timings shrunk to
//! milliseconds so generation completes within a test.
//!
//! # Usage
//!
//! ```rust,ignore
//! use bastion_control_test_fixtures::{create_test_app, create_test_state, post_json};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let state = create_test_state().await;
//!     let app = create_test_app(state);
//!
//!     let (status, _, body) = post_json(
//!         &app,
//!         "/control/v1/ratelimit/consume",
//!         json!({ "tier": "auth", "callerKey": "ip:203.0.113.5" }),
//!     )
//!     .await;
//!     assert!(status.is_success());
//!     assert_eq!(body["allowed"], true);
//! }
//! ```

#![deny(unsafe_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, Response, StatusCode},
};
use bastion_control_api::{AppState, create_router_with_state};
use bastion_control_config::Config;
use bastion_control_core::{MasterKey, SecretEncryptor};
use bastion_control_storage::Backend;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Configuration used by [`create_test_state`]
///
/// Generation takes 20ms and is polled every 5ms; the known-services registry
/// is left at its default.
pub fn test_config() -> Config {
    Config::builder()
        .job_poll_interval_ms(5)
        .simulated_generation_ms(20)
        .backend_call_timeout_ms(500)
        .job_max_runtime_secs(5)
        .result_base_url("https://cdn.test/videos")
        .build()
}

/// Creates a test AppState with in-memory storage from [`test_config`]
pub async fn create_test_state() -> AppState {
    create_test_state_with(test_config()).await
}

/// Creates a test AppState from a custom configuration
pub async fn create_test_state_with(config: Config) -> AppState {
    let encryptor = SecretEncryptor::from_master_key(&MasterKey::ephemeral()).unwrap();
    AppState::initialize(Arc::new(config), Backend::memory(), encryptor, None, "test-instance")
        .await
        .expect("test state initializes")
}

/// Creates a fully configured Axum router with all middleware and routes.
pub fn create_test_app(state: AppState) -> Router {
    create_router_with_state(state)
}

/// Reads a response body as JSON
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Builds a JSON request
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Builds a bodyless request
pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

/// Sends a request through the router
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

/// Sends a request and returns status, headers and JSON body
pub async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = send(app, request).await;
    let status = response.status();
    let headers = response.headers().clone();
    (status, headers, body_json(response).await)
}

/// POSTs a JSON body and returns status, headers and JSON body
pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, HeaderMap, Value) {
    send_json(app, json_request("POST", uri, body)).await
}

/// GETs a path and returns status, headers and JSON body
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Value) {
    send_json(app, empty_request("GET", uri)).await
}

/// Issues a credential and returns the response body
///
/// # Panics
///
/// Panics if the issue request does not return 200.
pub async fn issue_credential(app: &Router, service: &str, common_name: &str) -> Value {
    let (status, _, body) = post_json(
        app,
        "/control/v1/credentials/issue",
        json!({ "serviceName": service, "commonName": common_name }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "issue failed: {body}");
    body
}

/// Creates a generation job and returns its id
///
/// # Panics
///
/// Panics if the request does not return 202.
pub async fn create_job(app: &Router, owner_id: &str, prompt: &str) -> String {
    let (status, _, body) = post_json(
        app,
        "/control/v1/jobs",
        json!({ "ownerId": owner_id, "prompt": prompt }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "create job failed: {body}");
    body["jobId"].as_str().unwrap().to_string()
}
