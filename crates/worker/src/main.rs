//! Standalone polling worker.
//!
//! Runs the polling scheduler against the shared database without serving
//! HTTP. Use it with `EMBEDDED_POLLER=false` on the API, or run several
//! workers side by side: every transition is a conditional update, so
//! overlapping polls are harmless.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ideaforge_pipeline::config::{env_or, runner_config_from_env};
use ideaforge_pipeline::{PgAnalysisStore, Pipeline, PipelineConfig};
use ideaforge_runner::RunnerApi;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let pipeline_config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let runner_config = runner_config_from_env().context("Invalid job runner configuration")?;
    let shutdown_timeout_secs: u64 = env_or("SHUTDOWN_TIMEOUT_SECS", 30)?;
    tracing::info!(
        interval_secs = pipeline_config.poll_interval_secs,
        timeout_secs = pipeline_config.poll_timeout_secs,
        runner = %runner_config.api_url,
        "Worker starting",
    );

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = ideaforge_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    ideaforge_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    let runner = RunnerApi::new(&runner_config).context("Failed to build job runner client")?;
    let pipeline = Pipeline::new(
        Arc::new(PgAnalysisStore::new(pool)),
        Arc::new(runner),
        &pipeline_config,
    );
    let poller = Arc::clone(&pipeline.scheduler).start();

    shutdown_signal().await;
    poller.stop(Duration::from_secs(shutdown_timeout_secs)).await;
    tracing::info!("Worker stopped");
    Ok(())
}

/// `RUST_LOG` filter with a crate default; `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ideaforge_worker=debug,ideaforge_pipeline=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), stopping worker"),
        () = terminate => tracing::info!("Received SIGTERM, stopping worker"),
    }
}
