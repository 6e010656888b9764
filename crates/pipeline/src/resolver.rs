//! Artifact retrieval and normalization.
//!
//! [`ArtifactResolver::resolve`] downloads a finished run's output and turns
//! it into a [`Completion`]. Malformed, missing, or refused output is a
//! [`ResolveError::Parse`], which callers apply as a FAILED transition.
//! Transport errors and 5xx/429 answers are a [`ResolveError::Transient`],
//! which leaves the request RUNNING for the next poll.

use std::sync::Arc;

use ideaforge_core::analysis::{Completion, NormalizedResult, Usage};
use ideaforge_core::artifact::{self, ArtifactError};
use ideaforge_core::types::Timestamp;
use ideaforge_runner::{JobRunner, RunnerError};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] ArtifactError),

    #[error("Artifact download failed: {0}")]
    Transient(#[source] RunnerError),
}

pub struct ArtifactResolver {
    runner: Arc<dyn JobRunner>,
}

impl ArtifactResolver {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self { runner }
    }

    /// Download and parse the output artifact of `run_reference`.
    pub async fn resolve(
        &self,
        run_reference: &str,
        now: Timestamp,
    ) -> Result<Completion, ResolveError> {
        let bytes = match self.runner.download_artifact(run_reference).await {
            Ok(bytes) => bytes,
            Err(RunnerError::ArtifactMissing(run)) => {
                return Err(ArtifactError::Missing(run).into());
            }
            Err(e) if e.is_transient() => return Err(ResolveError::Transient(e)),
            Err(e) => return Err(ArtifactError::Rejected(e.to_string()).into()),
        };

        let completion = artifact::parse_artifact(&bytes, now)?;
        tracing::debug!(
            run_reference,
            outcome = completion.label(),
            bytes = bytes.len(),
            "Artifact resolved",
        );
        Ok(completion)
    }

    /// Normalize a result payload delivered inline (webhook body).
    pub fn normalize(
        &self,
        payload: serde_json::Value,
        model: Option<String>,
        usage: Usage,
        now: Timestamp,
    ) -> Result<NormalizedResult, ArtifactError> {
        artifact::normalize_result(payload, model, usage, now)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::testing::FakeRunner;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap()
    }

    fn resolver(runner: &Arc<FakeRunner>) -> ArtifactResolver {
        ArtifactResolver::new(Arc::clone(runner) as Arc<dyn JobRunner>)
    }

    #[tokio::test]
    async fn resolves_success_artifact() {
        let runner = Arc::new(FakeRunner::new());
        runner.set_artifact(
            "run-1",
            r#"{"outcome":"success","result":{"verdict":"build"},"model":"m1"}"#,
        );

        let completion = resolver(&runner).resolve("run-1", now()).await.unwrap();
        assert_matches!(completion, Completion::Succeeded(result) => {
            assert_eq!(result.payload["verdict"], "build");
            assert_eq!(result.model.as_deref(), Some("m1"));
        });
    }

    #[tokio::test]
    async fn missing_artifact_is_a_parse_error() {
        let runner = Arc::new(FakeRunner::new());
        let err = resolver(&runner).resolve("run-9", now()).await.unwrap_err();
        assert_matches!(err, ResolveError::Parse(ArtifactError::Missing(run)) if run == "run-9");
    }

    #[tokio::test]
    async fn malformed_artifact_is_a_parse_error() {
        let runner = Arc::new(FakeRunner::new());
        runner.set_artifact("run-2", "not json");
        let err = resolver(&runner).resolve("run-2", now()).await.unwrap_err();
        assert_matches!(err, ResolveError::Parse(ArtifactError::InvalidJson(_)));
    }

    #[tokio::test]
    async fn unavailable_runner_is_transient() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_artifact("run-3");
        let err = resolver(&runner).resolve("run-3", now()).await.unwrap_err();
        assert_matches!(err, ResolveError::Transient(_));
    }

    #[tokio::test]
    async fn refused_download_is_a_parse_error() {
        let runner = Arc::new(FakeRunner::new());
        runner.reject_artifact("run-4", 403);
        let err = resolver(&runner).resolve("run-4", now()).await.unwrap_err();
        assert_matches!(err, ResolveError::Parse(ArtifactError::Rejected(msg)) => {
            assert!(msg.contains("403"), "{msg}");
        });
    }

    #[test]
    fn normalize_rejects_scalar_payload() {
        let runner = Arc::new(FakeRunner::new());
        let err = resolver(&runner)
            .normalize(serde_json::json!(42), None, Usage::default(), now())
            .unwrap_err();
        assert_eq!(err, ArtifactError::InvalidPayload);
    }
}
