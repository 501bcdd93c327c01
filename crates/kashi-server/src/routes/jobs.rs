// crates/kashi-server/src/routes/jobs.rs
//! Job lifecycle routes: submit, query, result fetch, ack, catch-up, and the
//! long-poll endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use kashi_core::{Change, JobPayload, JobResult, JobStatus};

use crate::auth::Identity;
use crate::broker::JobEventBroker;
use crate::config::{MAX_CHANGES_LIMIT, MAX_LONGPOLL_SECS};
use crate::error::ApiError;
use crate::queue::QueuedTask;
use crate::state::AppState;
use crate::store::JobView;
use crate::worker::split_lines;

const MAX_LYRICS_CHARS: usize = 20_000;
const MAX_LYRICS_LINES: usize = 200;
const DEFAULT_CHANGES_LIMIT: usize = 100;
const DEFAULT_LONGPOLL_SECS: u64 = 25;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ChangesResponse {
    pub changes: Vec<Change>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct LongPollResponse {
    pub changes: Vec<Change>,
    pub has_pending: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default)]
    since: i64,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LongPollParams {
    timeout: Option<u64>,
    #[serde(default)]
    since: i64,
    limit: Option<usize>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_CHANGES_LIMIT)
        .clamp(1, MAX_CHANGES_LIMIT)
}

fn validate(payload: &JobPayload) -> Result<(), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if payload.lyrics.trim().is_empty() {
        return Err(ApiError::Validation("lyrics are required".into()));
    }
    if payload.lyrics.chars().count() > MAX_LYRICS_CHARS {
        return Err(ApiError::Validation("lyrics too long".into()));
    }
    if split_lines(&payload.lyrics).len() > MAX_LYRICS_LINES {
        return Err(ApiError::Validation("too many lyric lines".into()));
    }
    Ok(())
}

/// POST /jobs — create a job and enqueue it. Returns immediately.
async fn submit(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<JobPayload>,
) -> Result<Json<SubmitResponse>, ApiError> {
    validate(&payload)?;
    let job_id = state.store.create_job(&identity.user_id, &payload);
    state.queue.push(QueuedTask {
        job_id: job_id.clone(),
        user_id: identity.user_id,
        lyrics: payload.lyrics,
    });
    Ok(Json(SubmitResponse {
        job_id,
        status: JobStatus::Queued,
    }))
}

/// GET /jobs/{id} — job status view. 404 covers missing, expired and unowned.
async fn get_job(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state
        .store
        .get_job(&identity.user_id, &id)
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// GET /jobs/{id}/result — the raw result. 409 with the current status while
/// the job is unfinished (or failed); 404 once the result expired or was
/// acknowledged.
async fn get_result(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<JobResult>, ApiError> {
    let view = state
        .store
        .get_job(&identity.user_id, &id)
        .ok_or(ApiError::NotFound)?;
    match view.status {
        JobStatus::Succeeded => view.result.map(Json).ok_or(ApiError::NotFound),
        other => Err(ApiError::NotFinished(other)),
    }
}

/// POST /jobs/{id}/ack — delete the consumed result. Idempotent.
async fn ack(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    if state.store.ack(&identity.user_id, &id) {
        Ok(Json(AckResponse { ok: true }))
    } else {
        Err(ApiError::NotFound)
    }
}

/// GET /jobs/recent?since&limit — catch-up query over both indexes.
async fn recent(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(params): Query<RecentParams>,
) -> Json<ChangesResponse> {
    let changes = state.store.changes_since(
        &identity.user_id,
        params.since,
        clamp_limit(params.limit),
    );
    Json(ChangesResponse { changes })
}

/// Removes the waiter exactly once no matter which of timeout, disconnect or
/// resolution fires first. Dropping the response future on client disconnect
/// runs this too — the primary leak class this endpoint guards against.
struct WaiterGuard {
    broker: Arc<JobEventBroker>,
    user: String,
    id: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.broker.remove(&self.user, self.id);
    }
}

/// GET /jobs/pending/longpoll?timeout&since&limit — hold the request open
/// until something changes for this user or the (clamped) timeout elapses.
async fn longpoll(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(params): Query<LongPollParams>,
) -> Json<LongPollResponse> {
    let timeout = params
        .timeout
        .unwrap_or(DEFAULT_LONGPOLL_SECS)
        .clamp(1, MAX_LONGPOLL_SECS);
    let limit = clamp_limit(params.limit);
    let user = identity.user_id;

    // Catch-up first: anything already newer than the cursor returns now.
    let changes = state.store.changes_since(&user, params.since, limit);
    if !changes.is_empty() {
        return Json(LongPollResponse {
            changes,
            has_pending: true,
        });
    }

    // Nothing in flight means nothing to wait for.
    if state.store.pending_count(&user) == 0 {
        return Json(LongPollResponse {
            changes: Vec::new(),
            has_pending: false,
        });
    }

    let (waiter_id, rx) = state.broker.register(&user, params.since, limit);
    let _guard = WaiterGuard {
        broker: Arc::clone(&state.broker),
        user: user.clone(),
        id: waiter_id,
    };

    let changes = tokio::select! {
        resolved = rx => resolved.unwrap_or_default(),
        _ = tokio::time::sleep(Duration::from_secs(timeout)) => Vec::new(),
    };
    let has_pending = state.store.pending_count(&user) > 0;
    Json(LongPollResponse {
        changes,
        has_pending,
    })
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(submit))
        .route("/jobs/recent", get(recent))
        .route("/jobs/pending/longpoll", get(longpoll))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/result", get(get_result))
        .route("/jobs/{id}/ack", post(ack))
}
