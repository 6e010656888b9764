//! Inbound completion webhook from the job runner.
//!
//! The body is taken as raw bytes: the signature covers the exact bytes
//! sent, so it must be checked before any JSON parsing.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use ideaforge_core::signature::SIGNATURE_HEADER;
use ideaforge_pipeline::{Receipt, ReceiptOutcome};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/webhooks/analysis
///
/// 200 for applied, already-terminal and deferred deliveries; 409 when the
/// request was never dispatched.
pub async fn receive_completion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<DataResponse<Receipt>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let receipt = state.pipeline.receiver.receive(&body, signature).await?;
    if receipt.outcome == ReceiptOutcome::NotRunning {
        return Err(AppError::NotRunning(receipt.request_id));
    }
    Ok(Json(DataResponse { data: receipt }))
}
