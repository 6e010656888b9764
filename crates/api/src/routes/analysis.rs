//! Route definitions for the `/analysis` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::analysis;
use crate::state::AppState;

/// Routes mounted at `/analysis`.
///
/// ```text
/// GET    /{request_id}            -> get_analysis
/// POST   /{request_id}/dispatch   -> dispatch_analysis
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{request_id}", get(analysis::get_analysis))
        .route("/{request_id}/dispatch", post(analysis::dispatch_analysis))
}
