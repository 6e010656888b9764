//! The request state machine.
//!
//! ```text
//! SUBMITTED --dispatch--> RUNNING --apply--> COMPLETED
//!                                        \--> FAILED
//! ```
//!
//! [`StateReconciler::apply`] is the only way into a terminal state. It is a
//! single compare-and-set on `status = RUNNING`: whichever channel (webhook,
//! poll, or timeout) lands first wins, and later callers get
//! [`ApplyOutcome::AlreadyTerminal`] with their data discarded.

use std::fmt;
use std::sync::Arc;

use ideaforge_core::analysis::{ApplyOutcome, Completion};
use ideaforge_core::types::Timestamp;

use crate::error::PipelineError;
use crate::store::AnalysisStore;

/// Which channel produced a completion. Used for logging only: the
/// reconciler treats every source the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSource {
    Webhook,
    Poll,
    Timeout,
}

impl fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Webhook => "webhook",
            Self::Poll => "poll",
            Self::Timeout => "timeout",
        })
    }
}

pub struct StateReconciler {
    store: Arc<dyn AnalysisStore>,
}

impl StateReconciler {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self { store }
    }

    /// Apply a terminal outcome to a RUNNING request, at most once.
    pub async fn apply(
        &self,
        request_id: &str,
        completion: Completion,
        source: CompletionSource,
        now: Timestamp,
    ) -> Result<ApplyOutcome, PipelineError> {
        let outcome = self
            .store
            .apply_completion(request_id, &completion, now)
            .await?
            .ok_or_else(|| PipelineError::NotFound(request_id.to_string()))?;

        match outcome {
            ApplyOutcome::Applied => match &completion {
                Completion::Succeeded(_) => {
                    tracing::info!(request_id, %source, "Analysis request completed");
                }
                Completion::Failed { reason } => {
                    tracing::info!(request_id, %source, reason = %reason, "Analysis request failed");
                }
            },
            ApplyOutcome::AlreadyTerminal => {
                tracing::info!(
                    request_id,
                    %source,
                    discarded = completion.label(),
                    "Analysis request already terminal, discarding outcome",
                );
            }
            ApplyOutcome::NotRunning => {
                tracing::error!(
                    request_id,
                    %source,
                    "Completion for analysis request that was never dispatched",
                );
            }
        }

        Ok(outcome)
    }
}
