//! Completion and transition vocabulary shared by every delivery channel.
//!
//! A [`Completion`] is what the webhook receiver and the poller hand to the
//! state reconciler. [`ApplyOutcome`] and [`DispatchOutcome`] are the
//! results of the two compare-and-set transitions in the request lifecycle.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Failure reason recorded when a request exceeds the poll timeout.
pub const TIMEOUT_REASON: &str = "timeout";

/// Failure reason used when the job reports failure without a message.
pub const DEFAULT_FAILURE_REASON: &str = "job reported failure";

/// Outcome discriminator reported by the external job (webhook body and
/// output artifact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedOutcome {
    Success,
    Failure,
}

impl ReportedOutcome {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Resource-usage counters reported by the job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

/// A validated job result ready to be persisted as the request's Result.
///
/// `payload` is opaque: only its well-formedness (object or array) is
/// checked here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub payload: serde_json::Value,
    pub model: Option<String>,
    pub usage: Usage,
    pub completed_at: Timestamp,
}

/// A terminal outcome to apply to a RUNNING request.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Succeeded(NormalizedResult),
    Failed { reason: String },
}

impl Completion {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self::failed(TIMEOUT_REASON)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Short label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of the RUNNING -> terminal compare-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// This call performed the transition.
    Applied,
    /// Another caller already finished the request. Not an error.
    AlreadyTerminal,
    /// The request never reached RUNNING.
    NotRunning,
}

impl ApplyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::AlreadyTerminal => "already_terminal",
            Self::NotRunning => "not_running",
        }
    }
}

/// Result of the SUBMITTED -> RUNNING compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched { run_reference: String },
    AlreadyDispatched { run_reference: String },
}

impl DispatchOutcome {
    pub fn run_reference(&self) -> &str {
        match self {
            Self::Dispatched { run_reference } | Self::AlreadyDispatched { run_reference } => {
                run_reference
            }
        }
    }

    pub fn already_dispatched(&self) -> bool {
        matches!(self, Self::AlreadyDispatched { .. })
    }
}
