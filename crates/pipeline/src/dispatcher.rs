//! Starting analysis runs.
//!
//! [`WorkflowDispatcher::dispatch`] calls the runner's start API, then records
//! the run reference and flips SUBMITTED -> RUNNING in one conditional
//! update. A failed start leaves the request SUBMITTED; a lost update
//! (concurrent dispatch) reports the reference that won.

use std::sync::Arc;

use chrono::Utc;
use ideaforge_core::analysis::DispatchOutcome;
use ideaforge_core::types::Timestamp;
use ideaforge_db::models::analysis::AnalysisRequest;
use ideaforge_db::models::status::RequestStatus;
use ideaforge_runner::{JobRunner, StartRun};

use crate::error::PipelineError;
use crate::store::{AnalysisStore, StoreError};

pub struct WorkflowDispatcher {
    store: Arc<dyn AnalysisStore>,
    runner: Arc<dyn JobRunner>,
    /// Sent with every start call when push delivery is configured.
    callback_url: Option<String>,
}

impl WorkflowDispatcher {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        runner: Arc<dyn JobRunner>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            store,
            runner,
            callback_url,
        }
    }

    pub fn push_enabled(&self) -> bool {
        self.callback_url.is_some()
    }

    pub async fn dispatch(
        &self,
        request_id: &str,
        payload: serde_json::Value,
    ) -> Result<DispatchOutcome, PipelineError> {
        self.dispatch_at(request_id, payload, Utc::now()).await
    }

    /// Dispatch with an explicit clock reading for `dispatched_at`.
    pub async fn dispatch_at(
        &self,
        request_id: &str,
        payload: serde_json::Value,
        now: Timestamp,
    ) -> Result<DispatchOutcome, PipelineError> {
        let request = self.load(request_id).await?;
        if let Some(outcome) = already_dispatched(&request)? {
            tracing::info!(
                request_id,
                run_reference = %outcome.run_reference(),
                "Analysis request already dispatched",
            );
            return Ok(outcome);
        }

        let start = StartRun {
            request_id: request_id.to_string(),
            payload,
            callback_url: self.callback_url.clone(),
        };
        let run_reference = self.runner.start_run(&start).await.map_err(|e| {
            tracing::warn!(request_id, error = %e, "Failed to start analysis run");
            PipelineError::Dispatch(e)
        })?;

        let updated = self
            .store
            .mark_dispatched(request_id, &run_reference, &start.payload, now)
            .await?;
        if updated.is_some() {
            tracing::info!(
                request_id,
                run_reference = %run_reference,
                push = self.push_enabled(),
                "Analysis run dispatched",
            );
            return Ok(DispatchOutcome::Dispatched { run_reference });
        }

        // Another dispatch won between our read and our update.
        let winner = self.load(request_id).await?;
        let outcome = already_dispatched(&winner)?.ok_or_else(|| StoreError::Inconsistent {
            request_id: request_id.to_string(),
            detail: "dispatch update missed but request is still submitted".into(),
        })?;
        tracing::warn!(
            request_id,
            orphaned_run = %run_reference,
            run_reference = %outcome.run_reference(),
            "Lost dispatch race, discarding started run",
        );
        Ok(outcome)
    }

    async fn load(&self, request_id: &str) -> Result<AnalysisRequest, PipelineError> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(request_id.to_string()))
    }
}

/// `None` if the request can still be dispatched; otherwise the outcome to
/// report (or an error for terminal requests).
fn already_dispatched(request: &AnalysisRequest) -> Result<Option<DispatchOutcome>, PipelineError> {
    let status = request.status().ok_or_else(|| StoreError::Inconsistent {
        request_id: request.request_id.clone(),
        detail: format!("unknown status_id {}", request.status_id),
    })?;

    match status {
        RequestStatus::Submitted => Ok(None),
        RequestStatus::Running => {
            let run_reference =
                request
                    .run_reference
                    .clone()
                    .ok_or_else(|| StoreError::Inconsistent {
                        request_id: request.request_id.clone(),
                        detail: "running without run_reference".into(),
                    })?;
            Ok(Some(DispatchOutcome::AlreadyDispatched { run_reference }))
        }
        RequestStatus::Completed | RequestStatus::Failed => Err(PipelineError::Terminal {
            request_id: request.request_id.clone(),
            status,
        }),
    }
}
