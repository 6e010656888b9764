//! Tests for `AppError` -> HTTP response mapping.
//!
//! These call `IntoResponse` directly; no server is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use ideaforge_api::error::AppError;
use ideaforge_core::error::CoreError;
use ideaforge_core::signature::SignatureError;
use ideaforge_db::models::status::RequestStatus;
use ideaforge_pipeline::{PipelineError, StoreError};
use ideaforge_runner::RunnerError;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn core_not_found_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "AnalysisRequest",
        id: "FEAT-1".into(),
    });
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "AnalysisRequest with id FEAT-1 not found");
}

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("request_id must not be blank".into()));
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn terminal_request_returns_409() {
    let err = AppError::from(PipelineError::Terminal {
        request_id: "FEAT-2".into(),
        status: RequestStatus::Completed,
    });
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(json["error"], "Analysis request FEAT-2 is already completed");
}

#[tokio::test]
async fn dispatch_failure_returns_502_without_runner_details() {
    let err = AppError::from(PipelineError::Dispatch(RunnerError::Api {
        status: 500,
        body: "secret stack trace".into(),
    }));
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "DISPATCH_FAILED");
    assert!(!json["error"].as_str().unwrap().contains("secret"));
}

#[tokio::test]
async fn authenticity_failure_returns_401() {
    let err = AppError::from(PipelineError::Authenticity(SignatureError::Mismatch));
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn not_running_returns_409_with_code() {
    let (status, json) = error_to_response(AppError::NotRunning("FEAT-3".into())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "NOT_RUNNING");
}

#[tokio::test]
async fn inconsistent_store_returns_sanitized_500() {
    let err = AppError::from(StoreError::Inconsistent {
        request_id: "FEAT-4".into(),
        detail: "running without run_reference".into(),
    });
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn row_not_found_returns_404() {
    let err = AppError::from(StoreError::Database(sqlx::Error::RowNotFound));
    let (status, _) = error_to_response(err).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
