//! Polling reconciliation (pull channel).
//!
//! Every `poll_interval` the scheduler lists RUNNING requests, skips those
//! with a recent webhook receipt, asks the runner for each remaining run's
//! status, and feeds terminal observations (or a timeout) to the
//! [`StateReconciler`]. Per-request work is independent and bounded by
//! `poll_concurrency`; one request's failure never aborts the tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use ideaforge_core::analysis::{ApplyOutcome, Completion};
use ideaforge_core::artifact;
use ideaforge_core::polling::{has_timed_out, within_grace_period};
use ideaforge_core::types::Timestamp;
use ideaforge_db::models::analysis::AnalysisRequest;
use ideaforge_runner::{JobRunner, RunState};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::reconciler::{CompletionSource, StateReconciler};
use crate::resolver::{ArtifactResolver, ResolveError};
use crate::store::AnalysisStore;

/// Failure reason for a cancelled run that did not report one.
const CANCELLED_REASON: &str = "run cancelled";

/// Per-tick counters, logged at the end of every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// RUNNING requests found at the start of the tick.
    pub examined: usize,
    pub skipped_grace: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub still_running: usize,
    /// Finished by another channel while this tick was in flight.
    pub already_terminal: usize,
    pub errors: usize,
}

/// What one request's poll ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollResult {
    SkippedGrace,
    Completed,
    Failed,
    TimedOut,
    StillRunning,
    AlreadyTerminal,
    Error,
}

impl TickSummary {
    fn record(&mut self, result: PollResult) {
        match result {
            PollResult::SkippedGrace => self.skipped_grace += 1,
            PollResult::Completed => self.completed += 1,
            PollResult::Failed => self.failed += 1,
            PollResult::TimedOut => self.timed_out += 1,
            PollResult::StillRunning => self.still_running += 1,
            PollResult::AlreadyTerminal => self.already_terminal += 1,
            PollResult::Error => self.errors += 1,
        }
    }
}

pub struct PollingScheduler {
    store: Arc<dyn AnalysisStore>,
    runner: Arc<dyn JobRunner>,
    resolver: Arc<ArtifactResolver>,
    reconciler: Arc<StateReconciler>,
    interval: Duration,
    timeout: chrono::Duration,
    grace: chrono::Duration,
    concurrency: usize,
}

impl PollingScheduler {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        runner: Arc<dyn JobRunner>,
        resolver: Arc<ArtifactResolver>,
        reconciler: Arc<StateReconciler>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            runner,
            resolver,
            reconciler,
            interval: config.poll_interval().max(Duration::from_secs(1)),
            timeout: config.poll_timeout(),
            grace: config.grace_period(),
            concurrency: config.poll_concurrency.max(1),
        }
    }

    /// Spawn the polling loop onto the runtime.
    pub fn start(self: Arc<Self>) -> PollerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { self.run(cancel).await }
        });
        PollerHandle { cancel, task }
    }

    /// Tick every `poll_interval` until `cancel` fires. A tick in progress
    /// is allowed to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.num_seconds(),
            grace_secs = self.grace.num_seconds(),
            concurrency = self.concurrency,
            "Polling scheduler started",
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Polling scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::error!(error = %e, "Polling tick failed");
                    }
                }
            }
        }
    }

    /// Run one polling pass as of `now`.
    ///
    /// Fails only if the RUNNING set cannot be listed; per-request errors
    /// are counted in the summary.
    pub async fn tick(&self, now: Timestamp) -> Result<TickSummary, PipelineError> {
        let running = self.store.list_running().await?;
        let mut summary = TickSummary {
            examined: running.len(),
            ..TickSummary::default()
        };

        let results: Vec<PollResult> = stream::iter(running)
            .map(|request| self.poll_one(request, now))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for result in results {
            summary.record(result);
        }

        if summary.examined > 0 {
            tracing::info!(
                examined = summary.examined,
                skipped_grace = summary.skipped_grace,
                completed = summary.completed,
                failed = summary.failed,
                timed_out = summary.timed_out,
                still_running = summary.still_running,
                already_terminal = summary.already_terminal,
                errors = summary.errors,
                "Polling tick finished",
            );
        } else {
            tracing::debug!("Polling tick: no running requests");
        }
        Ok(summary)
    }

    async fn poll_one(&self, request: AnalysisRequest, now: Timestamp) -> PollResult {
        let request_id = request.request_id.as_str();
        if within_grace_period(request.webhook_received_at, now, self.grace) {
            tracing::debug!(request_id, "Recent webhook receipt, skipping poll");
            return PollResult::SkippedGrace;
        }
        let Some(run_reference) = request.run_reference.as_deref() else {
            tracing::error!(request_id, "Running request has no run reference");
            return PollResult::Error;
        };
        let timed_out = request
            .dispatched_at
            .is_some_and(|at| has_timed_out(at, now, self.timeout));

        let status = self.runner.run_status(run_reference).await;
        if let Err(e) = self.store.record_poll(request_id, now).await {
            tracing::warn!(request_id, error = %e, "Failed to record poll timestamp");
        }

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    request_id,
                    run_reference,
                    error = %e,
                    transient = e.is_transient(),
                    "Run status query failed",
                );
                return self.timeout_or(request_id, timed_out, now, PollResult::Error).await;
            }
        };
        tracing::debug!(request_id, run_reference, status = ?status.status, "Run status");

        let completion = match status.status {
            RunState::Succeeded => match self.resolver.resolve(run_reference, now).await {
                Ok(completion) => completion,
                Err(ResolveError::Parse(e)) => {
                    tracing::warn!(request_id, run_reference, error = %e, "Invalid job output");
                    Completion::failed(e.failure_reason())
                }
                Err(e) => {
                    tracing::warn!(request_id, run_reference, error = %e, "Artifact fetch failed");
                    return self.timeout_or(request_id, timed_out, now, PollResult::Error).await;
                }
            },
            RunState::Failed => Completion::failed(artifact::failure_reason(status.failure_reason)),
            RunState::Cancelled => Completion::failed(
                status
                    .failure_reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| CANCELLED_REASON.to_string()),
            ),
            RunState::Queued | RunState::InProgress => {
                return self
                    .timeout_or(request_id, timed_out, now, PollResult::StillRunning)
                    .await;
            }
        };

        let label = if completion.is_success() {
            PollResult::Completed
        } else {
            PollResult::Failed
        };
        self.apply(request_id, completion, CompletionSource::Poll, now, label)
            .await
    }

    /// Fail the request with the timeout reason if it is overdue, otherwise
    /// report `otherwise`.
    async fn timeout_or(
        &self,
        request_id: &str,
        timed_out: bool,
        now: Timestamp,
        otherwise: PollResult,
    ) -> PollResult {
        if !timed_out {
            return otherwise;
        }
        tracing::warn!(request_id, "Analysis run exceeded poll timeout");
        self.apply(
            request_id,
            Completion::timed_out(),
            CompletionSource::Timeout,
            now,
            PollResult::TimedOut,
        )
        .await
    }

    async fn apply(
        &self,
        request_id: &str,
        completion: Completion,
        source: CompletionSource,
        now: Timestamp,
        applied: PollResult,
    ) -> PollResult {
        match self.reconciler.apply(request_id, completion, source, now).await {
            Ok(ApplyOutcome::Applied) => applied,
            Ok(ApplyOutcome::AlreadyTerminal) => PollResult::AlreadyTerminal,
            Ok(ApplyOutcome::NotRunning) => PollResult::Error,
            Err(e) => {
                tracing::error!(request_id, error = %e, "Failed to apply polled outcome");
                PollResult::Error
            }
        }
    }
}

/// Handle to a spawned polling loop.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loop, waiting up to `grace` for an in-flight tick before
    /// aborting it. Abandoned work is re-derived from the store next start.
    pub async fn stop(mut self, grace: Duration) {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => tracing::info!("Polling scheduler stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Polling scheduler task failed"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Polling scheduler did not stop in time, aborting",
                );
                self.task.abort();
            }
        }
    }
}
