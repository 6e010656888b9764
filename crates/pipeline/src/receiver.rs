//! Inbound completion notifications (push channel).
//!
//! Flow: verify the HMAC signature over the raw body, parse the notice,
//! stamp `webhook_received_at`, build a [`Completion`], and hand it to the
//! [`StateReconciler`]. Nothing is written before the signature check
//! passes.

use std::sync::Arc;

use chrono::Utc;
use ideaforge_core::analysis::{ApplyOutcome, Completion, ReportedOutcome, Usage};
use ideaforge_core::artifact;
use ideaforge_core::signature::verify_signature;
use ideaforge_core::types::Timestamp;
use ideaforge_db::models::status::RequestStatus;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::reconciler::{CompletionSource, StateReconciler};
use crate::resolver::{ArtifactResolver, ResolveError};
use crate::store::{AnalysisStore, StoreError};

/// Body of a completion webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionNotice {
    pub request_id: String,
    pub outcome: ReportedOutcome,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// What happened to an accepted notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptOutcome {
    Applied,
    AlreadyTerminal,
    /// The request was never dispatched.
    NotRunning,
    /// Success without an inline result and the artifact could not be
    /// fetched yet. The request stays running for the poller.
    Deferred,
}

impl ReceiptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::AlreadyTerminal => "already_terminal",
            Self::NotRunning => "not_running",
            Self::Deferred => "deferred",
        }
    }
}

impl From<ApplyOutcome> for ReceiptOutcome {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Applied => Self::Applied,
            ApplyOutcome::AlreadyTerminal => Self::AlreadyTerminal,
            ApplyOutcome::NotRunning => Self::NotRunning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub request_id: String,
    pub outcome: ReceiptOutcome,
}

pub struct CompletionReceiver {
    store: Arc<dyn AnalysisStore>,
    resolver: Arc<ArtifactResolver>,
    reconciler: Arc<StateReconciler>,
    webhook_secret: Option<String>,
}

impl CompletionReceiver {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        resolver: Arc<ArtifactResolver>,
        reconciler: Arc<StateReconciler>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            reconciler,
            webhook_secret,
        }
    }

    pub async fn receive(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<Receipt, PipelineError> {
        self.receive_at(body, signature, Utc::now()).await
    }

    /// Handle one webhook delivery: `body` is the raw request body and
    /// `signature` the value of the signature header.
    pub async fn receive_at(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: Timestamp,
    ) -> Result<Receipt, PipelineError> {
        if let Err(e) = verify_signature(self.webhook_secret.as_deref(), body, signature) {
            tracing::warn!(
                security_event = "webhook_rejected",
                error = %e,
                body_len = body.len(),
                "Rejected completion webhook",
            );
            return Err(e.into());
        }

        let notice: CompletionNotice = serde_json::from_slice(body)
            .map_err(|e| PipelineError::MalformedPayload(e.to_string()))?;
        let request_id = notice.request_id.clone();

        let request = self
            .store
            .find_request(&request_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(request_id.clone()))?;
        self.store.record_webhook_receipt(&request_id, now).await?;
        tracing::debug!(request_id = %request_id, outcome = ?notice.outcome, "Completion webhook received");

        let status = request.status().ok_or_else(|| StoreError::Inconsistent {
            request_id: request_id.clone(),
            detail: format!("unknown status_id {}", request.status_id),
        })?;
        // Skip the artifact download for requests that cannot transition.
        // The reconciler stays authoritative for everything else.
        if status.is_terminal() {
            tracing::info!(
                request_id = %request_id,
                discarded = ?notice.outcome,
                "Late completion webhook, request already terminal",
            );
            return Ok(Receipt {
                request_id,
                outcome: ReceiptOutcome::AlreadyTerminal,
            });
        }
        if status == RequestStatus::Submitted {
            tracing::error!(request_id = %request_id, "Completion webhook for undispatched request");
            return Ok(Receipt {
                request_id,
                outcome: ReceiptOutcome::NotRunning,
            });
        }

        let completion = match self
            .completion_for(notice, request.run_reference.as_deref(), now)
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    error = %e,
                    "Artifact not available yet, leaving request to the poller",
                );
                return Ok(Receipt {
                    request_id,
                    outcome: ReceiptOutcome::Deferred,
                });
            }
        };

        let outcome = self
            .reconciler
            .apply(&request_id, completion, CompletionSource::Webhook, now)
            .await?;
        Ok(Receipt {
            request_id,
            outcome: outcome.into(),
        })
    }

    /// Turn a notice into a completion. Only a transient artifact download
    /// failure is an error; malformed output becomes a FAILED completion.
    async fn completion_for(
        &self,
        notice: CompletionNotice,
        run_reference: Option<&str>,
        now: Timestamp,
    ) -> Result<Completion, ResolveError> {
        if notice.outcome == ReportedOutcome::Failure {
            return Ok(Completion::failed(artifact::failure_reason(notice.error)));
        }

        match notice.result {
            Some(payload) => {
                let usage = notice.usage.unwrap_or_default();
                Ok(
                    match self.resolver.normalize(payload, notice.model, usage, now) {
                        Ok(result) => Completion::Succeeded(result),
                        Err(e) => Completion::failed(e.failure_reason()),
                    },
                )
            }
            None => {
                let Some(run_reference) = run_reference else {
                    return Ok(Completion::failed(
                        artifact::ArtifactError::MissingField("result").failure_reason(),
                    ));
                };
                match self.resolver.resolve(run_reference, now).await {
                    Ok(completion) => Ok(completion),
                    Err(ResolveError::Parse(e)) => Ok(Completion::failed(e.failure_reason())),
                    Err(e) => Err(e),
                }
            }
        }
    }
}
