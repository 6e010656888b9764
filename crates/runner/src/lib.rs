//! Client for the external job runner that executes analysis workflows.
//!
//! [`RunnerApi`] wraps the runner's HTTP endpoints (start, status, artifact).
//! Pipeline services depend on the [`JobRunner`] trait rather than the
//! concrete client so they can be exercised without a live runner.

pub mod api;
pub mod types;

use async_trait::async_trait;

pub use api::{RunnerApi, RunnerConfig, RunnerError};
pub use types::{RunState, RunStatus, StartRun};

/// Operations the pipeline needs from a job runner.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Start a run. Returns the runner-assigned run reference.
    async fn start_run(&self, request: &StartRun) -> Result<String, RunnerError>;

    /// Query the status of a run.
    async fn run_status(&self, run_reference: &str) -> Result<RunStatus, RunnerError>;

    /// Download the raw output artifact of a finished run.
    async fn download_artifact(&self, run_reference: &str) -> Result<Vec<u8>, RunnerError>;
}
