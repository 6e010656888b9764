//! Repository for the `analysis_requests` and `analysis_results` tables.
//!
//! Every status change is a single conditional `UPDATE ... WHERE status_id = $n`.
//! Callers learn whether they won the transition from the affected row, never
//! from a prior read.

use ideaforge_core::analysis::NormalizedResult;
use ideaforge_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::analysis::{AnalysisRequest, AnalysisResult, CreateAnalysisRequest};
use crate::models::status::{RequestStatus, StatusId};

/// Column list for `analysis_requests` queries.
const COLUMNS: &str = "\
    id, request_id, kind, status_id, run_reference, payload, failure_reason, \
    dispatched_at, webhook_received_at, last_polled_at, completed_at, \
    created_at, updated_at";

/// Column list for `analysis_results` queries.
const RESULT_COLUMNS: &str = "\
    id, request_id, payload, model, input_tokens, output_tokens, \
    completed_at, created_at";

/// Provides lifecycle operations for analysis requests.
pub struct AnalysisRequestRepo;

impl AnalysisRequestRepo {
    /// Insert a new request in `submitted` status.
    pub async fn create(
        pool: &PgPool,
        input: &CreateAnalysisRequest,
    ) -> Result<AnalysisRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO analysis_requests (request_id, kind, status_id) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnalysisRequest>(&query)
            .bind(&input.request_id)
            .bind(input.kind.as_str())
            .bind(RequestStatus::Submitted.id())
            .fetch_one(pool)
            .await
    }

    /// Find a request by its caller-supplied identifier.
    pub async fn find_by_request_id(
        pool: &PgPool,
        request_id: &str,
    ) -> Result<Option<AnalysisRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM analysis_requests WHERE request_id = $1");
        sqlx::query_as::<_, AnalysisRequest>(&query)
            .bind(request_id)
            .fetch_optional(pool)
            .await
    }

    /// Current status ID of a request, if it exists.
    pub async fn status_of(
        pool: &PgPool,
        request_id: &str,
    ) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>(
            "SELECT status_id FROM analysis_requests WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(pool)
        .await
    }

    /// All requests currently awaiting an outcome, oldest dispatch first.
    pub async fn list_running(pool: &PgPool) -> Result<Vec<AnalysisRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analysis_requests \
             WHERE status_id = $1 \
             ORDER BY dispatched_at ASC"
        );
        sqlx::query_as::<_, AnalysisRequest>(&query)
            .bind(RequestStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    /// Record the run reference and flip `submitted` -> `running` in one update.
    ///
    /// Returns `None` when the request was not in `submitted` (already
    /// dispatched, or unknown); the caller re-reads to tell them apart.
    pub async fn mark_dispatched(
        pool: &PgPool,
        request_id: &str,
        run_reference: &str,
        payload: &serde_json::Value,
        at: Timestamp,
    ) -> Result<Option<AnalysisRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE analysis_requests \
             SET status_id = $3, run_reference = $4, payload = $5, \
                 dispatched_at = $6, updated_at = $6 \
             WHERE request_id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnalysisRequest>(&query)
            .bind(request_id)
            .bind(RequestStatus::Submitted.id())
            .bind(RequestStatus::Running.id())
            .bind(run_reference)
            .bind(payload)
            .bind(at)
            .fetch_optional(pool)
            .await
    }

    /// Stamp `webhook_received_at`. Applies in any status.
    ///
    /// Returns `false` if the request does not exist.
    pub async fn record_webhook_receipt(
        pool: &PgPool,
        request_id: &str,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analysis_requests SET webhook_received_at = $2 WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp `last_polled_at`. Applies in any status.
    pub async fn record_poll(
        pool: &PgPool,
        request_id: &str,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analysis_requests SET last_polled_at = $2 WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flip `running` -> `completed` and insert the result, atomically.
    ///
    /// The status update and the result insert share one transaction, so a
    /// completed request always has exactly one result. Returns `false`
    /// without writing anything when the request was not `running`.
    pub async fn complete(
        pool: &PgPool,
        request_id: &str,
        result: &NormalizedResult,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let won = sqlx::query(
            "UPDATE analysis_requests \
             SET status_id = $3, completed_at = $4, updated_at = $4 \
             WHERE request_id = $1 AND status_id = $2",
        )
        .bind(request_id)
        .bind(RequestStatus::Running.id())
        .bind(RequestStatus::Completed.id())
        .bind(at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !won {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO analysis_results \
                 (request_id, payload, model, input_tokens, output_tokens, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(request_id)
        .bind(&result.payload)
        .bind(result.model.as_deref())
        .bind(result.usage.input_tokens)
        .bind(result.usage.output_tokens)
        .bind(result.completed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Flip `running` -> `failed` with a reason.
    ///
    /// Returns `false` without writing anything when the request was not
    /// `running`.
    pub async fn fail(
        pool: &PgPool,
        request_id: &str,
        reason: &str,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analysis_requests \
             SET status_id = $3, failure_reason = $4, completed_at = $5, updated_at = $5 \
             WHERE request_id = $1 AND status_id = $2",
        )
        .bind(request_id)
        .bind(RequestStatus::Running.id())
        .bind(RequestStatus::Failed.id())
        .bind(reason)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find the result of a completed request.
    pub async fn find_result(
        pool: &PgPool,
        request_id: &str,
    ) -> Result<Option<AnalysisResult>, sqlx::Error> {
        let query =
            format!("SELECT {RESULT_COLUMNS} FROM analysis_results WHERE request_id = $1");
        sqlx::query_as::<_, AnalysisResult>(&query)
            .bind(request_id)
            .fetch_optional(pool)
            .await
    }
}
