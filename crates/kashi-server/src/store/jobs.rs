// crates/kashi-server/src/store/jobs.rs
//! Job metadata, results, and the per-user pending/recent indexes.
//!
//! Persisted layout:
//! - `job:{id}` — metadata hash (owner, payload, status, stage, timestamps)
//! - `job:{id}:result` — result JSON string with TTL
//! - `pending:{user}` / `recent:{user}` — sorted sets scored by `updatedAt`
//! - `changes:{user}` — pub/sub channel carrying the job id
//!
//! Every terminal transition moves the job from the pending index to the
//! recent index in the same call — a job is never in both, and never in
//! neither while non-terminal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use kashi_core::{now_ms, Change, JobPayload, JobResult, JobStatus, Stage};

use super::kv::MemoryKv;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a status query returns. The result is attached only when the job
/// succeeded and the result blob still exists (not expired, not acked).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Store facade over the KV engine. Cheap to clone; handlers, the worker and
/// the broker all share one.
#[derive(Clone)]
pub struct JobStore {
    kv: Arc<MemoryKv>,
    retention: Duration,
    recent_cap: usize,
}

fn job_key(id: &str) -> String {
    format!("job:{id}")
}

fn result_key(id: &str) -> String {
    format!("job:{id}:result")
}

fn pending_key(user: &str) -> String {
    format!("pending:{user}")
}

fn recent_key(user: &str) -> String {
    format!("recent:{user}")
}

/// Channel name for a user's change notifications.
pub fn change_channel(user: &str) -> String {
    format!("changes:{user}")
}

/// Extract the user id back out of a change-channel name.
pub fn user_from_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix("changes:")
}

impl JobStore {
    pub fn new(kv: Arc<MemoryKv>, retention: Duration, recent_cap: usize) -> Self {
        Self {
            kv,
            retention,
            recent_cap,
        }
    }

    pub fn kv(&self) -> &Arc<MemoryKv> {
        &self.kv
    }

    /// Create a job in `queued` state, index it as pending, and publish the
    /// first change. Returns the new job id.
    pub fn create_job(&self, user: &str, payload: &JobPayload) -> String {
        let id = Uuid::new_v4().to_string();
        let now = now_ms();
        let now_s = now.to_string();
        self.kv.hset(
            &job_key(&id),
            &[
                ("user", user),
                ("title", &payload.title),
                ("artist", &payload.artist),
                ("lyrics", &payload.lyrics),
                ("status", JobStatus::Queued.as_str()),
                ("created_at", &now_s),
                ("updated_at", &now_s),
            ],
        );
        self.kv.expire(&job_key(&id), self.retention);
        self.kv.zadd(&pending_key(user), &id, now);
        self.kv.publish(&change_channel(user), &id);
        tracing::info!(job_id = %id, user = %user, "job created");
        id
    }

    fn meta(&self, id: &str) -> Option<HashMap<String, String>> {
        self.kv.hgetall(&job_key(id))
    }

    /// Metadata hash for a job the caller owns. A missing job, a missing
    /// owner field, and an ownership mismatch are all indistinguishable.
    fn owned_meta(&self, user: &str, id: &str) -> Option<HashMap<String, String>> {
        let meta = self.meta(id)?;
        if meta.get("user").map(String::as_str) != Some(user) {
            return None;
        }
        Some(meta)
    }

    pub fn get_job(&self, user: &str, id: &str) -> Option<JobView> {
        let meta = self.owned_meta(user, id)?;
        let status = JobStatus::parse(meta.get("status")?)?;
        let result = if status == JobStatus::Succeeded {
            self.kv
                .get(&result_key(id))
                .and_then(|json| serde_json::from_str(&json).ok())
        } else {
            None
        };
        Some(JobView {
            job_id: id.to_string(),
            status,
            stage: meta.get("stage").and_then(|s| Stage::parse(s)),
            updated_at: meta
                .get("updated_at")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            result,
            error: meta.get("error").cloned(),
        })
    }

    /// Advance a job's lifecycle. Bumps `updatedAt` strictly, keeps `stage`
    /// only while running and `error` only when failed, moves the job between
    /// the pending and recent indexes on terminal transitions, and publishes
    /// a change.
    pub fn transition(
        &self,
        id: &str,
        status: JobStatus,
        stage: Option<Stage>,
        error: Option<&str>,
    ) -> Result<Change, StoreError> {
        let meta = self
            .meta(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let user = meta.get("user").cloned().unwrap_or_default();
        let prev: i64 = meta
            .get("updated_at")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        // Strictly increasing per job so same-millisecond stage bursts stay
        // ordered against long-poll cursors.
        let updated_at = now_ms().max(prev + 1);
        let updated_s = updated_at.to_string();

        let key = job_key(id);
        self.kv
            .hset(&key, &[("status", status.as_str()), ("updated_at", &updated_s)]);
        match (status, stage) {
            (JobStatus::Running, Some(stage)) => {
                self.kv.hset(&key, &[("stage", stage.as_str())]);
            }
            _ => self.kv.hdel(&key, &["stage"]),
        }
        match (status, error) {
            (JobStatus::Failed, Some(message)) => {
                self.kv.hset(&key, &[("error", message)]);
            }
            _ => self.kv.hdel(&key, &["error"]),
        }
        self.kv.expire(&key, self.retention);

        if status.is_terminal() {
            self.kv.zrem(&pending_key(&user), id);
            self.kv.zadd(&recent_key(&user), id, updated_at);
            self.prune_recent(&user, updated_at);
        } else {
            self.kv.zadd(&pending_key(&user), id, updated_at);
        }

        self.kv.publish(&change_channel(&user), id);
        tracing::debug!(
            job_id = %id,
            status = %status,
            stage = ?stage,
            "job transitioned"
        );

        Ok(Change {
            job_id: id.to_string(),
            status,
            stage: if status == JobStatus::Running { stage } else { None },
            updated_at,
            error: error
                .filter(|_| status == JobStatus::Failed)
                .map(str::to_string),
        })
    }

    /// Prune the recent index after every insertion: drop entries older than
    /// the retention window, then evict the oldest past the cardinality cap.
    fn prune_recent(&self, user: &str, now: i64) {
        let key = recent_key(user);
        let cutoff = now - self.retention.as_millis() as i64;
        self.kv.zrem_below(&key, cutoff);
        let card = self.kv.zcard(&key);
        if card > self.recent_cap {
            self.kv.zrem_oldest(&key, card - self.recent_cap);
        }
    }

    /// Persist the result blob with its own TTL.
    pub fn write_result(&self, id: &str, result: &JobResult) -> Result<(), StoreError> {
        let json = serde_json::to_string(result)?;
        self.kv.set_ex(&result_key(id), &json, self.retention);
        Ok(())
    }

    /// The worker's task payload, read back from metadata.
    pub fn lyrics(&self, id: &str) -> Option<(String, String, String)> {
        let meta = self.meta(id)?;
        Some((
            meta.get("title").cloned().unwrap_or_default(),
            meta.get("artist").cloned().unwrap_or_default(),
            meta.get("lyrics").cloned()?,
        ))
    }

    /// Acknowledge a consumed result: delete the blob, drop the pending-index
    /// entry, keep metadata (with its TTL) so status stays queryable briefly.
    /// Idempotent — acking twice is a no-op.
    pub fn ack(&self, user: &str, id: &str) -> bool {
        if self.owned_meta(user, id).is_none() {
            return false;
        }
        self.kv.del(&result_key(id));
        self.kv.zrem(&pending_key(user), id);
        tracing::debug!(job_id = %id, user = %user, "job acked");
        true
    }

    /// Changes for this user strictly newer than `since`, across both
    /// indexes, ascending by `updatedAt`, capped at `limit`.
    pub fn changes_since(&self, user: &str, since: i64, limit: usize) -> Vec<Change> {
        let mut entries = self.kv.zrange_gt(&pending_key(user), since);
        entries.extend(self.kv.zrange_gt(&recent_key(user), since));
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries.dedup_by(|a, b| a.0 == b.0);

        entries
            .into_iter()
            .filter_map(|(id, _)| self.change_for(&id))
            .take(limit)
            .collect()
    }

    /// Hydrate a change from live metadata. Expired metadata yields nothing.
    pub fn change_for(&self, id: &str) -> Option<Change> {
        let meta = self.meta(id)?;
        let status = JobStatus::parse(meta.get("status")?)?;
        Some(Change {
            job_id: id.to_string(),
            status,
            stage: if status == JobStatus::Running {
                meta.get("stage").and_then(|s| Stage::parse(s))
            } else {
                None
            },
            updated_at: meta
                .get("updated_at")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            error: if status == JobStatus::Failed {
                meta.get("error").cloned()
            } else {
                None
            },
        })
    }

    pub fn pending_count(&self, user: &str) -> usize {
        self.kv.zcard(&pending_key(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> JobStore {
        JobStore::new(Arc::new(MemoryKv::new()), Duration::from_secs(86_400), 500)
    }

    fn payload() -> JobPayload {
        JobPayload {
            title: "東京".into(),
            artist: "テスト".into(),
            lyrics: "東京に置いてきた\n涙を".into(),
        }
    }

    #[test]
    fn create_then_get() {
        let store = store();
        let id = store.create_job("u1", &payload());
        let view = store.get_job("u1", &id).unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.stage, None);
        assert!(view.result.is_none());
        assert_eq!(store.pending_count("u1"), 1);
    }

    #[test]
    fn ownership_mismatch_is_not_found() {
        let store = store();
        let id = store.create_job("u1", &payload());
        assert!(store.get_job("u2", &id).is_none());
        assert!(store.get_job("u1", "no-such-id").is_none());
    }

    #[test]
    fn stage_present_iff_running() {
        let store = store();
        let id = store.create_job("u1", &payload());

        store
            .transition(&id, JobStatus::Running, Some(Stage::Translating), None)
            .unwrap();
        let view = store.get_job("u1", &id).unwrap();
        assert_eq!(view.stage, Some(Stage::Translating));

        store.transition(&id, JobStatus::Succeeded, None, None).unwrap();
        let view = store.get_job("u1", &id).unwrap();
        assert_eq!(view.stage, None);
        assert_eq!(view.error, None);
    }

    #[test]
    fn error_present_iff_failed() {
        let store = store();
        let id = store.create_job("u1", &payload());
        store
            .transition(&id, JobStatus::Failed, None, Some("upstream exploded"))
            .unwrap();
        let view = store.get_job("u1", &id).unwrap();
        assert_eq!(view.error.as_deref(), Some("upstream exploded"));
        assert_eq!(view.stage, None);
    }

    #[test]
    fn terminal_transition_moves_between_indexes() {
        let store = store();
        let id = store.create_job("u1", &payload());
        assert_eq!(store.pending_count("u1"), 1);

        store.transition(&id, JobStatus::Succeeded, None, None).unwrap();
        assert_eq!(store.pending_count("u1"), 0);
        // The job is now visible only via the recent index.
        let changes = store.changes_since("u1", 0, 10);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].status, JobStatus::Succeeded);
    }

    #[test]
    fn updated_at_strictly_increases_across_rapid_transitions() {
        let store = store();
        let id = store.create_job("u1", &payload());
        let c1 = store
            .transition(&id, JobStatus::Running, Some(Stage::Translating), None)
            .unwrap();
        let c2 = store
            .transition(&id, JobStatus::Running, Some(Stage::LyricsData), None)
            .unwrap();
        let c3 = store
            .transition(&id, JobStatus::Running, Some(Stage::Finalizing), None)
            .unwrap();
        assert!(c1.updated_at < c2.updated_at);
        assert!(c2.updated_at < c3.updated_at);
    }

    #[test]
    fn changes_since_respects_cursor_and_limit() {
        let store = store();
        let a = store.create_job("u1", &payload());
        std::thread::sleep(Duration::from_millis(2));
        let b = store.create_job("u1", &payload());

        let all = store.changes_since("u1", 0, 10);
        assert_eq!(all.len(), 2);

        let cursor = all[0].updated_at;
        let after = store.changes_since("u1", cursor, 10);
        assert_eq!(after.len(), 1);

        let limited = store.changes_since("u1", 0, 1);
        assert_eq!(limited.len(), 1);

        // Other users see nothing.
        assert!(store.changes_since("u2", 0, 10).is_empty());
        let _ = (a, b);
    }

    #[test]
    fn ack_is_idempotent_and_keeps_metadata() {
        let store = store();
        let id = store.create_job("u1", &payload());
        store.transition(&id, JobStatus::Succeeded, None, None).unwrap();
        store.write_result(&id, &JobResult::default()).unwrap();

        assert!(store.ack("u1", &id));
        assert!(store.ack("u1", &id));
        let view = store.get_job("u1", &id).unwrap();
        // Metadata says succeeded but the result is gone.
        assert_eq!(view.status, JobStatus::Succeeded);
        assert!(view.result.is_none());
    }

    #[test]
    fn ack_checks_ownership() {
        let store = store();
        let id = store.create_job("u1", &payload());
        assert!(!store.ack("u2", &id));
    }

    #[test]
    fn recent_index_prunes_to_cap() {
        let store = JobStore::new(Arc::new(MemoryKv::new()), Duration::from_secs(86_400), 3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let id = store.create_job("u1", &payload());
            store.transition(&id, JobStatus::Succeeded, None, None).unwrap();
            ids.push(id);
        }
        let changes = store.changes_since("u1", 0, 100);
        assert_eq!(changes.len(), 3);
        // Oldest two were evicted.
        let kept: Vec<&str> = changes.iter().map(|c| c.job_id.as_str()).collect();
        assert!(!kept.contains(&ids[0].as_str()));
        assert!(!kept.contains(&ids[1].as_str()));
    }

    #[test]
    fn encode_error_is_not_reported_as_missing_job() {
        let encode_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err = StoreError::from(encode_err);
        assert!(matches!(err, StoreError::Encode(_)));
        assert!(err.to_string().contains("encode"));
        assert!(!err.to_string().contains("not found"));
    }

    #[test]
    fn transition_unknown_job_errors() {
        let store = store();
        let err = store
            .transition("ghost", JobStatus::Running, Some(Stage::Translating), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn succeeded_with_result_round_trips() {
        let store = store();
        let id = store.create_job("u1", &payload());
        let mut result = JobResult::default();
        result.translations.insert(0, "I left it in Tokyo".into());
        store.write_result(&id, &result).unwrap();
        store.transition(&id, JobStatus::Succeeded, None, None).unwrap();

        let view = store.get_job("u1", &id).unwrap();
        assert_eq!(view.result.unwrap().translations[&0], "I left it in Tokyo");
    }

    #[test]
    fn channel_name_round_trip() {
        assert_eq!(user_from_channel(&change_channel("u1")), Some("u1"));
        assert_eq!(user_from_channel("other:u1"), None);
    }
}
