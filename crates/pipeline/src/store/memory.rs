//! In-memory [`AnalysisStore`] for tests.
//!
//! One mutex guards the whole map, so each compare-and-set is atomic with
//! respect to every other store call.

use std::collections::HashMap;

use async_trait::async_trait;
use ideaforge_core::analysis::{ApplyOutcome, Completion};
use ideaforge_core::types::{DbId, Timestamp};
use ideaforge_db::models::analysis::{AnalysisRequest, AnalysisResult, CreateAnalysisRequest};
use ideaforge_db::models::status::RequestStatus;
use tokio::sync::Mutex;

use super::{lost_race_outcome, AnalysisStore, StoreError};

#[derive(Default)]
struct Tables {
    requests: HashMap<String, AnalysisRequest>,
    results: HashMap<String, AnalysisResult>,
    next_id: DbId,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryAnalysisStore {
    tables: Mutex<Tables>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a SUBMITTED request, as the CRUD layer would.
    ///
    /// Returns `None` if the identifier is taken.
    pub async fn insert(
        &self,
        input: &CreateAnalysisRequest,
        at: Timestamp,
    ) -> Option<AnalysisRequest> {
        let mut tables = self.tables.lock().await;
        if tables.requests.contains_key(&input.request_id) {
            return None;
        }
        let request = AnalysisRequest {
            id: tables.next_id(),
            request_id: input.request_id.clone(),
            kind: input.kind.as_str().to_string(),
            status_id: RequestStatus::Submitted.id(),
            run_reference: None,
            payload: None,
            failure_reason: None,
            dispatched_at: None,
            webhook_received_at: None,
            last_polled_at: None,
            completed_at: None,
            created_at: at,
            updated_at: at,
        };
        tables
            .requests
            .insert(request.request_id.clone(), request.clone());
        Some(request)
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn find_request(&self, request_id: &str) -> Result<Option<AnalysisRequest>, StoreError> {
        Ok(self.tables.lock().await.requests.get(request_id).cloned())
    }

    async fn find_result(&self, request_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self.tables.lock().await.results.get(request_id).cloned())
    }

    async fn list_running(&self) -> Result<Vec<AnalysisRequest>, StoreError> {
        let tables = self.tables.lock().await;
        let mut running: Vec<_> = tables
            .requests
            .values()
            .filter(|r| r.status_id == RequestStatus::Running.id())
            .cloned()
            .collect();
        running.sort_by_key(|r| r.dispatched_at);
        Ok(running)
    }

    async fn mark_dispatched(
        &self,
        request_id: &str,
        run_reference: &str,
        payload: &serde_json::Value,
        at: Timestamp,
    ) -> Result<Option<AnalysisRequest>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(request) = tables.requests.get_mut(request_id) else {
            return Ok(None);
        };
        if request.status_id != RequestStatus::Submitted.id() {
            return Ok(None);
        }
        request.status_id = RequestStatus::Running.id();
        request.run_reference = Some(run_reference.to_string());
        request.payload = Some(payload.clone());
        request.dispatched_at = Some(at);
        request.updated_at = at;
        Ok(Some(request.clone()))
    }

    async fn record_webhook_receipt(
        &self,
        request_id: &str,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.requests.get_mut(request_id) {
            Some(request) => {
                request.webhook_received_at = Some(at);
                true
            }
            None => false,
        })
    }

    async fn record_poll(&self, request_id: &str, at: Timestamp) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.requests.get_mut(request_id) {
            Some(request) => {
                request.last_polled_at = Some(at);
                true
            }
            None => false,
        })
    }

    async fn apply_completion(
        &self,
        request_id: &str,
        completion: &Completion,
        at: Timestamp,
    ) -> Result<Option<ApplyOutcome>, StoreError> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let result_id = tables.next_id();
        let Some(request) = tables.requests.get_mut(request_id) else {
            return Ok(None);
        };
        if request.status_id != RequestStatus::Running.id() {
            return lost_race_outcome(request_id, request.status_id).map(Some);
        }

        request.completed_at = Some(at);
        request.updated_at = at;
        match completion {
            Completion::Succeeded(result) => {
                request.status_id = RequestStatus::Completed.id();
                let row = AnalysisResult {
                    id: result_id,
                    request_id: request_id.to_string(),
                    payload: result.payload.clone(),
                    model: result.model.clone(),
                    input_tokens: result.usage.input_tokens,
                    output_tokens: result.usage.output_tokens,
                    completed_at: result.completed_at,
                    created_at: at,
                };
                tables.results.insert(request_id.to_string(), row);
            }
            Completion::Failed { reason } => {
                request.status_id = RequestStatus::Failed.id();
                request.failure_reason = Some(reason.clone());
            }
        }
        Ok(Some(ApplyOutcome::Applied))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
