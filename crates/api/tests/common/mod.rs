#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use ideaforge_api::config::ServerConfig;
use ideaforge_api::router::build_app_router;
use ideaforge_api::state::AppState;
use ideaforge_core::signature::{sign_payload, SIGNATURE_HEADER};
use ideaforge_db::models::analysis::{CreateAnalysisRequest, RequestKind};
use ideaforge_pipeline::testing::{FakeRunner, MemoryAnalysisStore};
use ideaforge_pipeline::{Pipeline, PipelineConfig};
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        embedded_poller: false,
    }
}

/// The application plus handles on its in-memory store and scripted runner.
pub struct TestApp {
    pub app: Router,
    pub pipeline: Pipeline,
    pub store: Arc<MemoryAnalysisStore>,
    pub runner: Arc<FakeRunner>,
}

/// Build the full application router over an in-memory store, with push
/// delivery enabled.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(MemoryAnalysisStore::new());
    let runner = Arc::new(FakeRunner::new());
    let pipeline_config = PipelineConfig {
        callback_base_url: Some("https://ideaforge.test".into()),
        webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(store.clone(), runner.clone(), &pipeline_config);

    let config = test_config();
    let state = AppState {
        pipeline: pipeline.clone(),
    };
    TestApp {
        app: build_app_router(state, &config),
        pipeline,
        store,
        runner,
    }
}

/// Register a submitted request.
pub async fn seed_request(store: &MemoryAnalysisStore, request_id: &str) {
    store
        .insert(
            &CreateAnalysisRequest {
                request_id: request_id.into(),
                kind: RequestKind::Feature,
            },
            Utc::now(),
        )
        .await
        .expect("request id already taken");
}

pub async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// POST raw bytes to the webhook endpoint with an optional signature header.
pub async fn post_webhook(app: &Router, body: Vec<u8>, signature: Option<&str>) -> Response {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/webhooks/analysis")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// POST a webhook body signed with the configured secret.
pub async fn post_signed_webhook(app: &Router, body: serde_json::Value) -> Response {
    let bytes = serde_json::to_vec(&body).unwrap();
    let signature = sign_payload(WEBHOOK_SECRET, &bytes);
    post_webhook(app, bytes, Some(&signature)).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
