//! Repository tests against a real PostgreSQL database.
//!
//! Run with `DATABASE_URL` set and `cargo test -p ideaforge-db -- --ignored`.

use chrono::{Duration, TimeZone, Utc};
use ideaforge_core::analysis::{NormalizedResult, Usage};
use ideaforge_core::types::Timestamp;
use ideaforge_db::models::analysis::{CreateAnalysisRequest, RequestKind};
use ideaforge_db::models::status::RequestStatus;
use ideaforge_db::repositories::AnalysisRequestRepo;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

fn new_request(request_id: &str) -> CreateAnalysisRequest {
    CreateAnalysisRequest {
        request_id: request_id.to_string(),
        kind: RequestKind::Feature,
    }
}

fn result(summary: &str) -> NormalizedResult {
    NormalizedResult {
        payload: serde_json::json!({ "summary": summary }),
        model: Some("analyst".into()),
        usage: Usage {
            input_tokens: Some(10),
            output_tokens: Some(20),
        },
        completed_at: t0(),
    }
}

async fn running(pool: &PgPool, request_id: &str, run_reference: &str) {
    AnalysisRequestRepo::create(pool, &new_request(request_id))
        .await
        .unwrap();
    AnalysisRequestRepo::mark_dispatched(
        pool,
        request_id,
        run_reference,
        &serde_json::json!({}),
        t0(),
    )
    .await
    .unwrap()
    .expect("dispatch should win on a submitted request");
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn create_starts_submitted(pool: PgPool) {
    let created = AnalysisRequestRepo::create(&pool, &new_request("FEAT-1"))
        .await
        .unwrap();
    assert_eq!(created.status(), Some(RequestStatus::Submitted));
    assert!(created.run_reference.is_none());
    assert_eq!(created.kind, "feature");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn second_dispatch_loses_and_keeps_first_reference(pool: PgPool) {
    running(&pool, "FEAT-2", "run-1").await;

    let second = AnalysisRequestRepo::mark_dispatched(
        &pool,
        "FEAT-2",
        "run-2",
        &serde_json::json!({}),
        t0() + Duration::seconds(5),
    )
    .await
    .unwrap();
    assert!(second.is_none());

    let stored = AnalysisRequestRepo::find_by_request_id(&pool, "FEAT-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.run_reference.as_deref(), Some("run-1"));
    assert_eq!(stored.status(), Some(RequestStatus::Running));
    assert_eq!(stored.dispatched_at, Some(t0()));
}

// ---------------------------------------------------------------------------
// Terminal transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn complete_inserts_exactly_one_result(pool: PgPool) {
    running(&pool, "FEAT-3", "run-3").await;

    assert!(AnalysisRequestRepo::complete(&pool, "FEAT-3", &result("first"), t0())
        .await
        .unwrap());
    assert!(!AnalysisRequestRepo::complete(&pool, "FEAT-3", &result("second"), t0())
        .await
        .unwrap());
    assert!(!AnalysisRequestRepo::fail(&pool, "FEAT-3", "late", t0())
        .await
        .unwrap());

    let stored = AnalysisRequestRepo::find_result(&pool, "FEAT-3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payload["summary"], "first");

    let request = AnalysisRequestRepo::find_by_request_id(&pool, "FEAT-3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status(), Some(RequestStatus::Completed));
    assert!(request.failure_reason.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn fail_from_submitted_is_rejected(pool: PgPool) {
    AnalysisRequestRepo::create(&pool, &new_request("FEAT-4"))
        .await
        .unwrap();
    assert!(!AnalysisRequestRepo::fail(&pool, "FEAT-4", "timeout", t0())
        .await
        .unwrap());
    assert_eq!(
        AnalysisRequestRepo::status_of(&pool, "FEAT-4").await.unwrap(),
        Some(RequestStatus::Submitted.id())
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_complete_and_fail_apply_once(pool: PgPool) {
    running(&pool, "FEAT-5", "run-5").await;

    let r1 = result("r1");
    let (completed, failed) = tokio::join!(
        AnalysisRequestRepo::complete(&pool, "FEAT-5", &r1, t0()),
        AnalysisRequestRepo::fail(&pool, "FEAT-5", "r2", t0()),
    );
    let (completed, failed) = (completed.unwrap(), failed.unwrap());
    assert!(completed ^ failed, "exactly one transition must win");

    let request = AnalysisRequestRepo::find_by_request_id(&pool, "FEAT-5")
        .await
        .unwrap()
        .unwrap();
    let stored_result = AnalysisRequestRepo::find_result(&pool, "FEAT-5")
        .await
        .unwrap();
    if completed {
        assert_eq!(request.status(), Some(RequestStatus::Completed));
        assert!(stored_result.is_some());
        assert!(request.failure_reason.is_none());
    } else {
        assert_eq!(request.status(), Some(RequestStatus::Failed));
        assert!(stored_result.is_none());
        assert_eq!(request.failure_reason.as_deref(), Some("r2"));
    }
}

// ---------------------------------------------------------------------------
// Observability stamps
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn stamps_do_not_touch_status(pool: PgPool) {
    running(&pool, "FEAT-6", "run-6").await;
    let later = t0() + Duration::seconds(30);

    assert!(AnalysisRequestRepo::record_poll(&pool, "FEAT-6", later)
        .await
        .unwrap());
    assert!(AnalysisRequestRepo::record_webhook_receipt(&pool, "FEAT-6", later)
        .await
        .unwrap());
    assert!(!AnalysisRequestRepo::record_poll(&pool, "missing", later)
        .await
        .unwrap());

    let request = AnalysisRequestRepo::find_by_request_id(&pool, "FEAT-6")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status(), Some(RequestStatus::Running));
    assert_eq!(request.last_polled_at, Some(later));
    assert_eq!(request.webhook_received_at, Some(later));
    assert_eq!(request.updated_at, t0());

    let running = AnalysisRequestRepo::list_running(&pool).await.unwrap();
    assert_eq!(running.len(), 1);
}
