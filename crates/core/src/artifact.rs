//! Parsing and normalization of job output (the resolver's pure step).
//!
//! The external job writes a JSON artifact:
//!
//! ```text
//! {
//!   "outcome": "success" | "failure",
//!   "result": { ... },           required when outcome = success
//!   "error": "reason",           optional, used when outcome = failure
//!   "model": "name",             optional
//!   "usage": { "input_tokens": n, "output_tokens": n },
//!   "completed_at": "RFC3339"    optional, defaults to now
//! }
//! ```
//!
//! Only the top-level contract is validated. The `result` payload itself is
//! opaque to the pipeline.

use serde::Deserialize;

use crate::analysis::{Completion, NormalizedResult, ReportedOutcome, Usage, DEFAULT_FAILURE_REASON};
use crate::types::Timestamp;

/// Malformed or missing job output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("artifact must be a JSON object")]
    NotAnObject,

    #[error("artifact is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("artifact has unknown outcome '{0}'")]
    UnknownOutcome(String),

    #[error("result payload must be a JSON object or array")]
    InvalidPayload,

    #[error("artifact has malformed field: {0}")]
    Malformed(String),

    #[error("artifact not found: {0}")]
    Missing(String),

    /// The runner refused the download with a non-retryable error.
    #[error("artifact download rejected: {0}")]
    Rejected(String),
}

impl ArtifactError {
    /// Human-readable failure reason stored on the request.
    pub fn failure_reason(&self) -> String {
        format!("invalid job output: {self}")
    }
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    outcome: Option<String>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    model: Option<String>,
    usage: Option<Usage>,
    completed_at: Option<Timestamp>,
}

/// Parse raw artifact bytes into a [`Completion`].
pub fn parse_artifact(bytes: &[u8], now: Timestamp) -> Result<Completion, ArtifactError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ArtifactError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ArtifactError::NotAnObject);
    }

    let raw: RawArtifact =
        serde_json::from_value(value).map_err(|e| ArtifactError::Malformed(e.to_string()))?;

    let outcome = raw.outcome.ok_or(ArtifactError::MissingField("outcome"))?;
    match ReportedOutcome::parse(&outcome) {
        Some(ReportedOutcome::Success) => {
            let payload = raw.result.ok_or(ArtifactError::MissingField("result"))?;
            let result = normalize_result(
                payload,
                raw.model,
                raw.usage.unwrap_or_default(),
                raw.completed_at.unwrap_or(now),
            )?;
            Ok(Completion::Succeeded(result))
        }
        Some(ReportedOutcome::Failure) => Ok(Completion::failed(failure_reason(raw.error))),
        None => Err(ArtifactError::UnknownOutcome(outcome)),
    }
}

/// Validate an inline result payload and attach provenance.
///
/// Used for webhook bodies that carry the result directly, and as the
/// last step of [`parse_artifact`].
pub fn normalize_result(
    payload: serde_json::Value,
    model: Option<String>,
    usage: Usage,
    completed_at: Timestamp,
) -> Result<NormalizedResult, ArtifactError> {
    if !(payload.is_object() || payload.is_array()) {
        return Err(ArtifactError::InvalidPayload);
    }
    Ok(NormalizedResult {
        payload,
        model: model.filter(|m| !m.trim().is_empty()),
        usage,
        completed_at,
    })
}

/// Pick the failure reason reported by the job, falling back to a default.
pub fn failure_reason(reported: Option<String>) -> String {
    reported
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string())
}
