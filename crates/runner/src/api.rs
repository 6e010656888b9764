//! REST API client for the external job runner.
//!
//! Wraps the runner HTTP endpoints (run start, run status, artifact
//! download) using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::types::{RunStatus, StartRun, StartRunResponse};
use crate::JobRunner;

/// Default per-request timeout for runner calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the runner API.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base HTTP URL, e.g. `https://runner.internal/api`.
    pub api_url: String,
    /// Optional bearer token sent on every request.
    pub api_token: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Errors from the runner REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The runner returned a non-2xx status code.
    #[error("Runner API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The run has no artifact to download.
    #[error("Artifact not found for run {0}")]
    ArtifactMissing(String),

    /// The configured base URL cannot carry path segments.
    #[error("Invalid runner API URL: {0}")]
    InvalidUrl(String),
}

impl RunnerError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::ArtifactMissing(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// HTTP client for the job runner.
pub struct RunnerApi {
    client: reqwest::Client,
    api_url: Url,
    api_token: Option<String>,
}

impl RunnerApi {
    /// Build a client with the configured timeout.
    pub fn new(config: &RunnerConfig) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Self::with_client(client, config)
    }

    /// Build a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &RunnerConfig) -> Result<Self, RunnerError> {
        let api_url = Url::parse(&config.api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| RunnerError::InvalidUrl(config.api_url.clone()))?;
        Ok(Self {
            client,
            api_url,
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
        })
    }

    // ---- private helpers ----

    /// Append `segments` to the base URL, percent-encoding each one so an
    /// opaque run reference stays a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RunnerError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| RunnerError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or a [`RunnerError::Api`] containing the status
    /// and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RunnerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RunnerError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RunnerError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobRunner for RunnerApi {
    /// `POST /runs`
    async fn start_run(&self, request: &StartRun) -> Result<String, RunnerError> {
        let response = self
            .authorize(self.client.post(self.endpoint(&["runs"])?))
            .json(request)
            .send()
            .await?;

        let started: StartRunResponse = Self::parse_response(response).await?;
        tracing::debug!(
            request_id = %request.request_id,
            run_reference = %started.run_reference,
            "Runner accepted run",
        );
        Ok(started.run_reference)
    }

    /// `GET /runs/{run_reference}`
    async fn run_status(&self, run_reference: &str) -> Result<RunStatus, RunnerError> {
        let response = self
            .authorize(self.client.get(self.endpoint(&["runs", run_reference])?))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /runs/{run_reference}/artifact`
    async fn download_artifact(&self, run_reference: &str) -> Result<Vec<u8>, RunnerError> {
        let response = self
            .authorize(
                self.client
                    .get(self.endpoint(&["runs", run_reference, "artifact"])?),
            )
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RunnerError::ArtifactMissing(run_reference.to_string()));
        }
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
