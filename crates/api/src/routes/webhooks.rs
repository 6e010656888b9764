//! Route definitions for inbound webhooks. Authenticated by HMAC signature
//! rather than user credentials.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`.
///
/// ```text
/// POST   /analysis   -> receive_completion
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/analysis", post(webhooks::receive_completion))
}
