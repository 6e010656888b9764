//! Wire types for the job runner API.

use serde::{Deserialize, Serialize};

/// Body of `POST /runs`.
///
/// `request_id` doubles as an idempotency hint so the runner can refuse a
/// second start for the same request.
#[derive(Debug, Clone, Serialize)]
pub struct StartRun {
    pub request_id: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Response of `POST /runs`.
#[derive(Debug, Deserialize)]
pub(crate) struct StartRunResponse {
    pub run_reference: String,
}

/// Run state as reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

/// Response of `GET /runs/{run_reference}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub status: RunState,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl RunStatus {
    pub fn new(status: RunState) -> Self {
        Self {
            status,
            failure_reason: None,
        }
    }
}
