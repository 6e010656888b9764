//! PostgreSQL-backed [`AnalysisStore`], delegating to [`AnalysisRequestRepo`].

use async_trait::async_trait;
use ideaforge_core::analysis::{ApplyOutcome, Completion};
use ideaforge_core::types::Timestamp;
use ideaforge_db::models::analysis::{AnalysisRequest, AnalysisResult};
use ideaforge_db::repositories::AnalysisRequestRepo;
use ideaforge_db::DbPool;

use super::{lost_race_outcome, AnalysisStore, StoreError};

/// Store backed by the shared connection pool.
///
/// Safe to use from several processes at once: every transition is a
/// conditional `UPDATE` evaluated by PostgreSQL.
#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: DbPool,
}

impl PgAnalysisStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn find_request(&self, request_id: &str) -> Result<Option<AnalysisRequest>, StoreError> {
        Ok(AnalysisRequestRepo::find_by_request_id(&self.pool, request_id).await?)
    }

    async fn find_result(&self, request_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(AnalysisRequestRepo::find_result(&self.pool, request_id).await?)
    }

    async fn list_running(&self) -> Result<Vec<AnalysisRequest>, StoreError> {
        Ok(AnalysisRequestRepo::list_running(&self.pool).await?)
    }

    async fn mark_dispatched(
        &self,
        request_id: &str,
        run_reference: &str,
        payload: &serde_json::Value,
        at: Timestamp,
    ) -> Result<Option<AnalysisRequest>, StoreError> {
        Ok(
            AnalysisRequestRepo::mark_dispatched(&self.pool, request_id, run_reference, payload, at)
                .await?,
        )
    }

    async fn record_webhook_receipt(
        &self,
        request_id: &str,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(AnalysisRequestRepo::record_webhook_receipt(&self.pool, request_id, at).await?)
    }

    async fn record_poll(&self, request_id: &str, at: Timestamp) -> Result<bool, StoreError> {
        Ok(AnalysisRequestRepo::record_poll(&self.pool, request_id, at).await?)
    }

    async fn apply_completion(
        &self,
        request_id: &str,
        completion: &Completion,
        at: Timestamp,
    ) -> Result<Option<ApplyOutcome>, StoreError> {
        let won = match completion {
            Completion::Succeeded(result) => {
                AnalysisRequestRepo::complete(&self.pool, request_id, result, at).await?
            }
            Completion::Failed { reason } => {
                AnalysisRequestRepo::fail(&self.pool, request_id, reason, at).await?
            }
        };
        if won {
            return Ok(Some(ApplyOutcome::Applied));
        }

        match AnalysisRequestRepo::status_of(&self.pool, request_id).await? {
            Some(status_id) => lost_race_outcome(request_id, status_id).map(Some),
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(ideaforge_db::health_check(&self.pool).await?)
    }
}
