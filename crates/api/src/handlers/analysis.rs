//! Handlers for the `/analysis` resource.
//!
//! Dispatch starts an external analysis run; the read endpoint reports the
//! request's current state and, once completed, its result.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use ideaforge_core::error::CoreError;
use ideaforge_db::models::analysis::{AnalysisRequest, AnalysisResult};
use ideaforge_db::models::status::RequestStatus;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /analysis/{request_id}/dispatch`.
#[derive(Debug, Deserialize)]
pub struct DispatchAnalysis {
    /// Opaque input forwarded to the job runner.
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

fn empty_payload() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Serialize)]
pub struct DispatchAccepted {
    pub request_id: String,
    pub run_reference: String,
    pub already_dispatched: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalysisView {
    /// Status label resolved from `request.status_id`.
    pub status: Option<RequestStatus>,
    pub request: AnalysisRequest,
    pub result: Option<AnalysisResult>,
}

fn validate_request_id(request_id: &str) -> AppResult<()> {
    if request_id.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "request_id must not be blank".into(),
        )));
    }
    Ok(())
}

/// POST /api/v1/analysis/{request_id}/dispatch
///
/// Start the analysis run for a submitted request. Returns 202; repeating
/// the call for a running request returns the existing run reference.
pub async fn dispatch_analysis(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(input): Json<DispatchAnalysis>,
) -> AppResult<impl IntoResponse> {
    validate_request_id(&request_id)?;
    let outcome = state
        .pipeline
        .dispatcher
        .dispatch(&request_id, input.payload)
        .await?;

    let data = DispatchAccepted {
        already_dispatched: outcome.already_dispatched(),
        run_reference: outcome.run_reference().to_string(),
        request_id,
    };
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data })))
}

/// GET /api/v1/analysis/{request_id}
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AppResult<Json<DataResponse<AnalysisView>>> {
    validate_request_id(&request_id)?;
    let store = &state.pipeline.store;
    let request = store
        .find_request(&request_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "AnalysisRequest",
                id: request_id.clone(),
            })
        })?;
    let result = store.find_result(&request_id).await?;

    Ok(Json(DataResponse {
        data: AnalysisView {
            status: request.status(),
            request,
            result,
        },
    }))
}
