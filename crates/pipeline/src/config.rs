//! Pipeline configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use ideaforge_core::polling::{
    self, DEFAULT_GRACE_PERIOD_SECS, DEFAULT_POLL_CONCURRENCY, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_TIMEOUT_SECS,
};
use ideaforge_runner::api::DEFAULT_REQUEST_TIMEOUT_SECS;
use ideaforge_runner::RunnerConfig;

/// Path of the completion webhook, appended to `CALLBACK_BASE_URL`.
pub const WEBHOOK_PATH: &str = "/api/v1/webhooks/analysis";

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{0}")]
    Inconsistent(&'static str),
}

/// Read an environment variable, falling back to `default` when unset.
pub fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Read an optional, non-empty environment variable.
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Timing and delivery settings shared by the pipeline services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Seconds between scheduler ticks (`POLL_INTERVAL_SECS`).
    pub poll_interval_secs: u64,
    /// Seconds before a RUNNING request is failed (`POLL_TIMEOUT_SECS`).
    pub poll_timeout_secs: u64,
    /// Seconds after a webhook during which polling skips the request
    /// (`GRACE_PERIOD_SECS`).
    pub grace_period_secs: u64,
    /// Concurrent status checks per tick (`POLL_CONCURRENCY`).
    pub poll_concurrency: usize,
    /// Public base URL for push delivery. `None` means poll-only.
    pub callback_base_url: Option<String>,
    /// Shared HMAC secret for webhook signatures.
    pub webhook_secret: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            poll_concurrency: DEFAULT_POLL_CONCURRENCY,
            callback_base_url: None,
            webhook_secret: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `POLL_INTERVAL_SECS` | `30`    |
    /// | `POLL_TIMEOUT_SECS`  | `900`   |
    /// | `GRACE_PERIOD_SECS`  | `60`    |
    /// | `POLL_CONCURRENCY`   | `4`     |
    /// | `CALLBACK_BASE_URL`  | unset   |
    /// | `WEBHOOK_SECRET`     | unset   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            poll_interval_secs: env_or("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            poll_timeout_secs: env_or("POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?,
            grace_period_secs: env_or("GRACE_PERIOD_SECS", DEFAULT_GRACE_PERIOD_SECS)?,
            poll_concurrency: env_or("POLL_CONCURRENCY", DEFAULT_POLL_CONCURRENCY)?,
            callback_base_url: env_opt("CALLBACK_BASE_URL"),
            webhook_secret: env_opt("WEBHOOK_SECRET"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_SECS",
                value: "0".into(),
            });
        }
        if self.poll_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_CONCURRENCY",
                value: "0".into(),
            });
        }
        if self.callback_base_url.is_some() && self.webhook_secret.is_none() {
            return Err(ConfigError::Inconsistent(
                "WEBHOOK_SECRET must be set when CALLBACK_BASE_URL is set",
            ));
        }
        Ok(())
    }

    /// Full callback URL sent to the runner, or `None` for poll-only.
    pub fn callback_url(&self) -> Option<String> {
        self.callback_base_url
            .as_deref()
            .map(|base| format!("{}{WEBHOOK_PATH}", base.trim_end_matches('/')))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> chrono::Duration {
        polling::secs(self.poll_timeout_secs)
    }

    pub fn grace_period(&self) -> chrono::Duration {
        polling::secs(self.grace_period_secs)
    }
}

/// Load job runner connection settings.
///
/// | Env Var                       | Default  |
/// |-------------------------------|----------|
/// | `RUNNER_API_URL`              | required |
/// | `RUNNER_API_TOKEN`            | unset    |
/// | `RUNNER_REQUEST_TIMEOUT_SECS` | `30`     |
pub fn runner_config_from_env() -> Result<RunnerConfig, ConfigError> {
    Ok(RunnerConfig {
        api_url: env_opt("RUNNER_API_URL").ok_or(ConfigError::Missing("RUNNER_API_URL"))?,
        api_token: env_opt("RUNNER_API_TOKEN"),
        request_timeout_secs: env_or("RUNNER_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
    })
}
