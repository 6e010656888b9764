//! Analysis request and result models.

use ideaforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{RequestStatus, StatusId};

/// A row from the `analysis_requests` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AnalysisRequest {
    pub id: DbId,
    pub request_id: String,
    pub kind: String,
    pub status_id: StatusId,
    pub run_reference: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub dispatched_at: Option<Timestamp>,
    pub webhook_received_at: Option<Timestamp>,
    pub last_polled_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AnalysisRequest {
    /// Typed status. Unknown IDs can only come from a schema mismatch.
    pub fn status(&self) -> Option<RequestStatus> {
        RequestStatus::from_id(self.status_id)
    }
}

/// A row from the `analysis_results` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AnalysisResult {
    pub id: DbId,
    pub request_id: String,
    pub payload: serde_json::Value,
    pub model: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub completed_at: Timestamp,
    pub created_at: Timestamp,
}

/// Subject type of an analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Feature,
    Idea,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Idea => "idea",
        }
    }
}

/// DTO used by the CRUD layer to register a new request in `submitted`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnalysisRequest {
    pub request_id: String,
    #[serde(default)]
    pub kind: RequestKind,
}
