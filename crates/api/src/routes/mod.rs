pub mod analysis;
pub mod health;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /analysis/{request_id}              request state and result (GET)
/// /analysis/{request_id}/dispatch     start the analysis run (POST)
///
/// /webhooks/analysis                  signed completion callback (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/analysis", analysis::router())
        .nest("/webhooks", webhooks::router())
}
