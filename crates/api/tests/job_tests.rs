//! Integration tests for generation job submission and status polling.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use axum::{Router, http::StatusCode};
use bastion_control_test_fixtures::{
    create_job, create_test_app, create_test_state, get_json, post_json,
};
use serde_json::{Value, json};

async fn wait_for_status(app: &Router, job_id: &str, expected: &str) -> Value {
    for _ in 0..200 {
        let (status, _, body) = get_json(app, &format!("/control/v1/jobs/{job_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == expected {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached {expected}");
}

#[tokio::test]
async fn test_create_job_returns_202_pending() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = post_json(
        &app,
        "/control/v1/jobs",
        json!({ "ownerId": "user-1", "prompt": "a lighthouse in a storm at night" }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["jobId"].as_str().unwrap().starts_with("job_"));
    assert_eq!(body["status"], "PENDING");
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn test_job_completes_with_result_reference() {
    let app = create_test_app(create_test_state().await);
    let job_id = create_job(&app, "user-1", "a lighthouse in a storm at night").await;

    let job = wait_for_status(&app, &job_id, "COMPLETED").await;
    assert_eq!(job["jobId"], job_id.as_str());
    assert_eq!(job["ownerId"], "user-1");
    assert_eq!(job["resultReference"], format!("https://cdn.test/videos/{job_id}.mp4"));
    assert!(job.get("errorDetail").is_none());
}

#[tokio::test]
async fn test_defaults_are_applied_to_parameters() {
    let app = create_test_app(create_test_state().await);
    let job_id = create_job(&app, "user-1", "   a lighthouse in a storm at night   ").await;

    let (_, _, job) = get_json(&app, &format!("/control/v1/jobs/{job_id}")).await;
    let params = &job["parameters"];
    assert_eq!(params["prompt"], "a lighthouse in a storm at night");
    assert_eq!(params["durationSeconds"], 5);
    assert_eq!(params["style"], "cinematic");
    assert_eq!(params["aspectRatio"], "16:9");
    assert_eq!(params["quality"], "standard");
}

#[tokio::test]
async fn test_identical_requests_create_distinct_jobs() {
    let app = create_test_app(create_test_state().await);
    let a = create_job(&app, "user-1", "a lighthouse in a storm at night").await;
    let b = create_job(&app, "user-1", "a lighthouse in a storm at night").await;
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected_with_details() {
    let app = create_test_app(create_test_state().await);

    let (status, _, body) = post_json(
        &app,
        "/control/v1/jobs",
        json!({
            "ownerId": "user-1",
            "prompt": "short",
            "durationSeconds": 91,
            "style": "noir",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let paths: Vec<&str> =
        body["details"].as_array().unwrap().iter().map(|d| d["fieldPath"].as_str().unwrap()).collect();
    assert_eq!(paths, vec!["prompt", "durationSeconds", "style"]);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = create_test_app(create_test_state().await);

    let missing = format!("job_{}", "0".repeat(32));
    let (status, _, body) = get_json(&app, &format!("/control/v1/jobs/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _, _) = get_json(&app, "/control/v1/jobs/not-a-job-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generation_failure_is_recorded() {
    let app = create_test_app(create_test_state().await);

    let (status, _, _) = post_json(
        &app,
        "/control/v1/faults/failure",
        json!({ "targetService": "generation", "message": "GPU pool exhausted", "probability": 1.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let job_id = create_job(&app, "user-1", "a lighthouse in a storm at night").await;
    let job = wait_for_status(&app, &job_id, "FAILED").await;
    assert!(job["errorDetail"].as_str().unwrap().contains("GPU pool exhausted"));
    assert!(job.get("resultReference").is_none());
}
