// crates/kashi-server/src/routes/debug.rs
//! Dev-only introspection routes. Hidden (404) unless a dev bypass token is
//! configured.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::queue::QueueStats;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct QueueDebugResponse {
    pub queue: QueueStats,
    pub waiters: usize,
    pub buffered_users: usize,
}

/// GET /debug/queue — queue counters plus broker occupancy.
async fn queue_debug(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
) -> Result<Json<QueueDebugResponse>, ApiError> {
    if !state.config.dev_routes_enabled() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(QueueDebugResponse {
        queue: state.queue.stats(),
        waiters: state.broker.waiter_count(),
        buffered_users: state.broker.buffered_users(),
    }))
}

/// Create the debug routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/debug/queue", get(queue_debug))
}
