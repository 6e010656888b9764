use ideaforge_core::signature::SignatureError;
use ideaforge_db::models::status::RequestStatus;
use ideaforge_runner::RunnerError;

use crate::store::StoreError;

/// Errors surfaced by pipeline operations to their callers.
///
/// Parse failures, timeouts and lost races are not here: the pipeline
/// turns those into FAILED transitions or no-op outcomes itself.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No request with this identifier exists.
    #[error("Analysis request {0} not found")]
    NotFound(String),

    /// The request already finished; it cannot be dispatched again.
    #[error("Analysis request {request_id} is already {status}")]
    Terminal {
        request_id: String,
        status: RequestStatus,
    },

    /// The job runner refused or failed the start call. The request is
    /// still submitted and the caller may retry.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[source] RunnerError),

    /// Webhook signature check failed. Nothing was written.
    #[error("Webhook authenticity check failed: {0}")]
    Authenticity(#[from] SignatureError),

    /// Authenticated webhook body that is not a completion notice.
    #[error("Malformed completion payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
