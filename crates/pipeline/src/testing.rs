//! Test doubles: the in-memory store and a scripted job runner.
//!
//! Compiled for this crate's tests and, through the `testing` feature, for
//! the API integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ideaforge_runner::{JobRunner, RunState, RunStatus, RunnerError, StartRun};
use tokio::sync::Semaphore;

pub use crate::store::memory::MemoryAnalysisStore;

/// Response scripted for one run's status or artifact call.
#[derive(Debug, Clone)]
enum Scripted<T> {
    Ok(T),
    Unavailable,
    /// Answered with this non-2xx status.
    Rejected(u16),
}

impl<T: Clone> Scripted<T> {
    fn answer(&self) -> Result<T, RunnerError> {
        match self {
            Self::Ok(value) => Ok(value.clone()),
            Self::Unavailable => Err(unavailable()),
            Self::Rejected(status) => Err(RunnerError::Api {
                status: *status,
                body: "rejected".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct FakeState {
    next_run: u64,
    starts: Vec<StartRun>,
    failing_starts: usize,
    starts_failing_after_launch: usize,
    statuses: HashMap<String, Scripted<RunStatus>>,
    artifacts: HashMap<String, Scripted<Vec<u8>>>,
    status_calls: HashMap<String, usize>,
    artifact_calls: HashMap<String, usize>,
    start_gate: Option<Arc<Semaphore>>,
    status_delay: Option<Duration>,
}

/// A [`JobRunner`] whose answers are set by the test.
///
/// Runs are numbered `run-1`, `run-2`, ... unless [`FakeRunner::next_run_number`]
/// says otherwise. Unscripted runs report `in_progress` and have no artifact.
#[derive(Default)]
pub struct FakeRunner {
    state: Mutex<FakeState>,
}

fn unavailable() -> RunnerError {
    RunnerError::Api {
        status: 503,
        body: "runner unavailable".to_string(),
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        let runner = Self::default();
        runner.next_run_number(1);
        runner
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn next_run_number(&self, n: u64) {
        self.state().next_run = n;
    }

    /// The next `n` start calls fail before any run is created.
    pub fn fail_next_starts(&self, n: usize) {
        self.state().failing_starts = n;
    }

    /// The next `n` start calls create a run, then report failure anyway.
    pub fn fail_next_starts_after_launch(&self, n: usize) {
        self.state().starts_failing_after_launch = n;
    }

    pub fn set_status(&self, run_reference: &str, status: RunStatus) {
        self.state()
            .statuses
            .insert(run_reference.to_string(), Scripted::Ok(status));
    }

    pub fn set_state(&self, run_reference: &str, state: RunState) {
        self.set_status(run_reference, RunStatus::new(state));
    }

    pub fn fail_status(&self, run_reference: &str) {
        self.state()
            .statuses
            .insert(run_reference.to_string(), Scripted::Unavailable);
    }

    pub fn set_artifact(&self, run_reference: &str, body: impl Into<Vec<u8>>) {
        self.state()
            .artifacts
            .insert(run_reference.to_string(), Scripted::Ok(body.into()));
    }

    pub fn fail_artifact(&self, run_reference: &str) {
        self.state()
            .artifacts
            .insert(run_reference.to_string(), Scripted::Unavailable);
    }

    /// Artifact downloads for `run_reference` answer with HTTP `status`.
    pub fn reject_artifact(&self, run_reference: &str, status: u16) {
        self.state()
            .artifacts
            .insert(run_reference.to_string(), Scripted::Rejected(status));
    }

    /// Start calls record themselves, then wait for a permit on the
    /// returned semaphore before answering.
    pub fn hold_starts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state().start_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Status calls take `delay` to answer.
    pub fn delay_status(&self, delay: Duration) {
        self.state().status_delay = Some(delay);
    }

    /// Every start call received, including failed ones.
    pub fn starts(&self) -> Vec<StartRun> {
        self.state().starts.clone()
    }

    pub fn status_calls(&self, run_reference: &str) -> usize {
        self.state()
            .status_calls
            .get(run_reference)
            .copied()
            .unwrap_or(0)
    }

    pub fn artifact_calls(&self, run_reference: &str) -> usize {
        self.state()
            .artifact_calls
            .get(run_reference)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobRunner for FakeRunner {
    async fn start_run(&self, request: &StartRun) -> Result<String, RunnerError> {
        let (answer, gate) = {
            let mut state = self.state();
            state.starts.push(request.clone());
            let answer = if state.failing_starts > 0 {
                state.failing_starts -= 1;
                Err(unavailable())
            } else {
                let run_reference = format!("run-{}", state.next_run);
                state.next_run += 1;
                if state.starts_failing_after_launch > 0 {
                    state.starts_failing_after_launch -= 1;
                    Err(unavailable())
                } else {
                    Ok(run_reference)
                }
            };
            (answer, state.start_gate.clone())
        };
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        answer
    }

    async fn run_status(&self, run_reference: &str) -> Result<RunStatus, RunnerError> {
        let (answer, delay) = {
            let mut state = self.state();
            *state
                .status_calls
                .entry(run_reference.to_string())
                .or_default() += 1;
            let answer = match state.statuses.get(run_reference) {
                Some(scripted) => scripted.answer(),
                None => Ok(RunStatus::new(RunState::InProgress)),
            };
            (answer, state.status_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }

    async fn download_artifact(&self, run_reference: &str) -> Result<Vec<u8>, RunnerError> {
        let mut state = self.state();
        *state
            .artifact_calls
            .entry(run_reference.to_string())
            .or_default() += 1;
        match state.artifacts.get(run_reference) {
            Some(scripted) => scripted.answer(),
            None => Err(RunnerError::ArtifactMissing(run_reference.to_string())),
        }
    }
}
