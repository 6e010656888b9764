use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ideaforge_core::error::CoreError;
use ideaforge_pipeline::{PipelineError, StoreError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce `{error, code}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A completion arrived for a request that was never dispatched.
    #[error("Analysis request {0} is not running")]
    NotRunning(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Pipeline(PipelineError::Store(err))
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
            },

            AppError::Pipeline(err) => classify_pipeline_error(err),

            AppError::NotRunning(request_id) => (
                StatusCode::CONFLICT,
                "NOT_RUNNING",
                format!("Analysis request {request_id} has not been dispatched"),
            ),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a pipeline error to an HTTP status, error code, and message.
///
/// Signature failures never echo the reason back to the caller.
fn classify_pipeline_error(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err {
        PipelineError::NotFound(request_id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Analysis request {request_id} not found"),
        ),
        PipelineError::Terminal { .. } => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        PipelineError::Dispatch(source) => {
            tracing::warn!(error = %source, "Job runner rejected dispatch");
            (
                StatusCode::BAD_GATEWAY,
                "DISPATCH_FAILED",
                "The job runner could not start the analysis".to_string(),
            )
        }
        PipelineError::Authenticity(_) => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Invalid webhook signature".to_string(),
        ),
        PipelineError::MalformedPayload(msg) => {
            (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
        }
        PipelineError::Store(StoreError::Database(db)) => classify_sqlx_error(db),
        PipelineError::Store(inconsistent @ StoreError::Inconsistent { .. }) => {
            tracing::error!(error = %inconsistent, "Inconsistent analysis record");
            internal()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
