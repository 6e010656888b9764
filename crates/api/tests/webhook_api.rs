//! Integration tests for the signed completion webhook.

mod common;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use chrono::Utc;
use common::{
    body_json, build_test_app, post_json, post_signed_webhook, post_webhook, seed_request,
    TestApp,
};
use ideaforge_core::analysis::Completion;
use ideaforge_core::signature::sign_payload;
use ideaforge_db::models::status::RequestStatus;
use ideaforge_pipeline::AnalysisStore;
use serde_json::json;

/// App with `request_id` dispatched as run-1.
async fn running_app(request_id: &str) -> TestApp {
    let t = build_test_app();
    seed_request(&t.store, request_id).await;
    let response = post_json(
        &t.app,
        &format!("/api/v1/analysis/{request_id}/dispatch"),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    t
}

async fn status_of(t: &TestApp, request_id: &str) -> Option<RequestStatus> {
    t.store
        .find_request(request_id)
        .await
        .unwrap()
        .unwrap()
        .status()
}

#[tokio::test]
async fn signed_success_webhook_is_applied() {
    let t = running_app("FEAT-100").await;

    let response = post_signed_webhook(
        &t.app,
        json!({"request_id": "FEAT-100", "outcome": "success", "result": {"score": 9}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["request_id"], "FEAT-100");
    assert_eq!(json["data"]["outcome"], "applied");
    assert_eq!(status_of(&t, "FEAT-100").await, Some(RequestStatus::Completed));
    assert_matches!(t.store.find_result("FEAT-100").await.unwrap(), Some(result) => {
        assert_eq!(result.payload["score"], 9);
    });

    // Redelivery is acknowledged without changing anything.
    let response = post_signed_webhook(
        &t.app,
        json!({"request_id": "FEAT-100", "outcome": "failure", "error": "late"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["outcome"], "already_terminal");
    assert_eq!(status_of(&t, "FEAT-100").await, Some(RequestStatus::Completed));
}

#[tokio::test]
async fn bad_signature_returns_401_without_mutation() {
    let t = running_app("FEAT-101").await;
    let body = serde_json::to_vec(&json!({"request_id": "FEAT-101", "outcome": "failure"})).unwrap();

    let forged = sign_payload("not-the-secret", &body);
    let response = post_webhook(&t.app, body.clone(), Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
    assert_eq!(json["error"], "Invalid webhook signature");

    let response = post_webhook(&t.app, body.clone(), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = post_webhook(&t.app, body, Some("sha256=zz")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = t.store.find_request("FEAT-101").await.unwrap().unwrap();
    assert_eq!(request.status(), Some(RequestStatus::Running));
    assert!(request.webhook_received_at.is_none());
}

#[tokio::test]
async fn malformed_body_after_authentication_returns_400() {
    let t = build_test_app();
    let body = b"{not json".to_vec();
    let signature = sign_payload(common::WEBHOOK_SECRET, &body);

    let response = post_webhook(&t.app, body, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_request_returns_404() {
    let t = build_test_app();
    let response = post_signed_webhook(
        &t.app,
        json!({"request_id": "FEAT-999", "outcome": "success", "result": {}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn undispatched_request_returns_409_not_running() {
    let t = build_test_app();
    seed_request(&t.store, "FEAT-102").await;

    let response = post_signed_webhook(
        &t.app,
        json!({"request_id": "FEAT-102", "outcome": "success", "result": {}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "NOT_RUNNING");
    assert_eq!(status_of(&t, "FEAT-102").await, Some(RequestStatus::Submitted));
}

#[tokio::test]
async fn webhook_after_timeout_is_already_terminal() {
    let t = running_app("FEAT-200").await;
    t.store
        .apply_completion("FEAT-200", &Completion::timed_out(), Utc::now())
        .await
        .unwrap();

    let response = post_signed_webhook(
        &t.app,
        json!({"request_id": "FEAT-200", "outcome": "success", "result": {"late": true}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["outcome"], "already_terminal");

    let request = t.store.find_request("FEAT-200").await.unwrap().unwrap();
    assert_eq!(request.failure_reason.as_deref(), Some("timeout"));
    assert!(request.webhook_received_at.is_some());
}

#[tokio::test]
async fn success_without_result_and_unreachable_artifact_is_deferred() {
    let t = running_app("FEAT-103").await;
    t.runner.fail_artifact("run-1");

    let response = post_signed_webhook(
        &t.app,
        json!({"request_id": "FEAT-103", "outcome": "success"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["outcome"], "deferred");
    assert_eq!(status_of(&t, "FEAT-103").await, Some(RequestStatus::Running));

    // The poller picks it up once the artifact is reachable.
    t.runner.set_state("run-1", ideaforge_runner::RunState::Succeeded);
    t.runner
        .set_artifact("run-1", r#"{"outcome":"success","result":{"ok":true}}"#);
    let far_future = Utc::now() + chrono::Duration::minutes(5);
    let summary = t.pipeline.scheduler.tick(far_future).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(status_of(&t, "FEAT-103").await, Some(RequestStatus::Completed));
}

#[tokio::test]
async fn refused_artifact_download_fails_request() {
    let t = running_app("FEAT-104").await;
    t.runner.reject_artifact("run-1", 410);

    let response = post_signed_webhook(
        &t.app,
        json!({"request_id": "FEAT-104", "outcome": "success"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["outcome"], "applied");

    let request = t.store.find_request("FEAT-104").await.unwrap().unwrap();
    assert_eq!(request.status(), Some(RequestStatus::Failed));
    assert_matches!(
        request.failure_reason.as_deref(),
        Some(reason) if reason.starts_with("invalid job output: artifact download rejected")
    );
}
