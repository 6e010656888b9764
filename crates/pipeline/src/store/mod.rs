//! Persistence seam for the pipeline.
//!
//! [`AnalysisStore`] is the only shared mutable resource in the system.
//! Status changes go exclusively through [`AnalysisStore::mark_dispatched`]
//! and [`AnalysisStore::apply_completion`], both of which must be atomic
//! compare-and-set operations in every implementation.

mod postgres;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

use async_trait::async_trait;
use ideaforge_core::analysis::{ApplyOutcome, Completion};
use ideaforge_core::types::Timestamp;
use ideaforge_db::models::analysis::{AnalysisRequest, AnalysisResult};
use ideaforge_db::models::status::{RequestStatus, StatusId};

pub use postgres::PgAnalysisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Inconsistent record for {request_id}: {detail}")]
    Inconsistent { request_id: String, detail: String },
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn find_request(&self, request_id: &str) -> Result<Option<AnalysisRequest>, StoreError>;

    async fn find_result(&self, request_id: &str) -> Result<Option<AnalysisResult>, StoreError>;

    /// Requests currently in RUNNING.
    async fn list_running(&self) -> Result<Vec<AnalysisRequest>, StoreError>;

    /// Set `run_reference` and flip SUBMITTED -> RUNNING in one step.
    ///
    /// Returns `None` when the request was not SUBMITTED.
    async fn mark_dispatched(
        &self,
        request_id: &str,
        run_reference: &str,
        payload: &serde_json::Value,
        at: Timestamp,
    ) -> Result<Option<AnalysisRequest>, StoreError>;

    /// Returns `false` when the request does not exist.
    async fn record_webhook_receipt(&self, request_id: &str, at: Timestamp)
        -> Result<bool, StoreError>;

    /// Returns `false` when the request does not exist.
    async fn record_poll(&self, request_id: &str, at: Timestamp) -> Result<bool, StoreError>;

    /// Flip RUNNING -> COMPLETED (with result) or FAILED (with reason).
    ///
    /// Returns `None` when the request does not exist.
    async fn apply_completion(
        &self,
        request_id: &str,
        completion: &Completion,
        at: Timestamp,
    ) -> Result<Option<ApplyOutcome>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Classify a request whose RUNNING compare-and-set did not match.
///
/// Status only moves forward, so a request read back as RUNNING after a
/// missed update was SUBMITTED when the update ran.
pub(crate) fn lost_race_outcome(
    request_id: &str,
    status_id: StatusId,
) -> Result<ApplyOutcome, StoreError> {
    match RequestStatus::from_id(status_id) {
        Some(RequestStatus::Completed | RequestStatus::Failed) => Ok(ApplyOutcome::AlreadyTerminal),
        Some(RequestStatus::Submitted | RequestStatus::Running) => Ok(ApplyOutcome::NotRunning),
        None => Err(StoreError::Inconsistent {
            request_id: request_id.to_string(),
            detail: format!("unknown status_id {status_id}"),
        }),
    }
}
