// crates/kashi-server/src/store/kv.rs
//! In-memory key-value engine with the primitives the job store needs:
//! hashes, strings with TTL, sorted sets, and pub/sub channels.
//!
//! Expiry is lazy — a key past its deadline is dropped on the next access.
//! All operations take one lock and never hold it across an await point, so
//! a `std::sync::Mutex` suffices.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// A message published on a channel, as seen by the process-wide subscriber.
#[derive(Debug, Clone)]
pub struct KvEvent {
    pub channel: String,
    pub payload: String,
}

#[derive(Default)]
struct KvInner {
    hashes: HashMap<String, HashMap<String, String>>,
    strings: HashMap<String, String>,
    /// Member → score. Range queries sort on demand; cardinality is small
    /// (the recent index is capped at 500).
    zsets: HashMap<String, HashMap<String, i64>>,
    expiries: HashMap<String, Instant>,
}

impl KvInner {
    fn purge_if_expired(&mut self, key: &str) {
        if let Some(deadline) = self.expiries.get(key) {
            if Instant::now() >= *deadline {
                self.expiries.remove(key);
                self.hashes.remove(key);
                self.strings.remove(key);
                self.zsets.remove(key);
            }
        }
    }
}

/// The store engine. Constructed once at process start and injected into the
/// job store; cheap to share via `Arc`.
pub struct MemoryKv {
    inner: Mutex<KvInner>,
    events: broadcast::Sender<KvEvent>,
}

impl MemoryKv {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(KvInner::default()),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, KvInner> {
        // Lock poisoning would mean a panic while holding the store lock;
        // recover the data rather than cascade.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Hashes ──────────────────────────────────────────────────────────

    /// Set fields on a hash, creating it if absent.
    pub fn hset(&self, key: &str, fields: &[(&str, &str)]) {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.to_string());
        }
    }

    /// Remove fields from a hash.
    pub fn hdel(&self, key: &str, fields: &[&str]) {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        if let Some(hash) = inner.hashes.get_mut(key) {
            for field in fields {
                hash.remove(*field);
            }
        }
    }

    pub fn hgetall(&self, key: &str) -> Option<HashMap<String, String>> {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        inner.hashes.get(key).cloned()
    }

    // ── Strings ─────────────────────────────────────────────────────────

    /// Set a string value with a TTL.
    pub fn set_ex(&self, key: &str, value: &str, ttl: Duration) {
        let mut inner = self.lock();
        inner.strings.insert(key.to_string(), value.to_string());
        inner.expiries.insert(key.to_string(), Instant::now() + ttl);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        inner.strings.get(key).cloned()
    }

    pub fn del(&self, key: &str) -> bool {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        inner.expiries.remove(key);
        let had_hash = inner.hashes.remove(key).is_some();
        let had_string = inner.strings.remove(key).is_some();
        let had_zset = inner.zsets.remove(key).is_some();
        had_hash || had_string || had_zset
    }

    /// Attach a TTL to any existing key.
    pub fn expire(&self, key: &str, ttl: Duration) {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        let exists = inner.hashes.contains_key(key)
            || inner.strings.contains_key(key)
            || inner.zsets.contains_key(key);
        if exists {
            inner.expiries.insert(key.to_string(), Instant::now() + ttl);
        }
    }

    // ── Sorted sets ─────────────────────────────────────────────────────

    /// Add a member with a score, or update the score of an existing member.
    pub fn zadd(&self, key: &str, member: &str, score: i64) {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
    }

    pub fn zrem(&self, key: &str, member: &str) -> bool {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        inner
            .zsets
            .get_mut(key)
            .map(|z| z.remove(member).is_some())
            .unwrap_or(false)
    }

    pub fn zcard(&self, key: &str) -> usize {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        inner.zsets.get(key).map(|z| z.len()).unwrap_or(0)
    }

    /// Members with score strictly greater than `min`, ascending by score
    /// (ties broken by member for determinism).
    pub fn zrange_gt(&self, key: &str, min: i64) -> Vec<(String, i64)> {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        let mut out: Vec<(String, i64)> = inner
            .zsets
            .get(key)
            .map(|z| {
                z.iter()
                    .filter(|(_, score)| **score > min)
                    .map(|(m, s)| (m.clone(), *s))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Remove members with score strictly below `cutoff`. Returns how many.
    pub fn zrem_below(&self, key: &str, cutoff: i64) -> usize {
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        match inner.zsets.get_mut(key) {
            Some(z) => {
                let before = z.len();
                z.retain(|_, score| *score >= cutoff);
                before - z.len()
            }
            None => 0,
        }
    }

    /// Remove the `count` lowest-scored members. Returns how many.
    pub fn zrem_oldest(&self, key: &str, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut inner = self.lock();
        inner.purge_if_expired(key);
        match inner.zsets.get_mut(key) {
            Some(z) => {
                let mut scored: Vec<(i64, String)> =
                    z.iter().map(|(m, s)| (*s, m.clone())).collect();
                scored.sort();
                let victims: Vec<String> =
                    scored.into_iter().take(count).map(|(_, m)| m).collect();
                for m in &victims {
                    z.remove(m);
                }
                victims.len()
            }
            None => 0,
        }
    }

    // ── Pub/sub ─────────────────────────────────────────────────────────

    /// Publish a payload on a channel. Dropped silently when nobody listens,
    /// same as a fire-and-forget pub/sub.
    pub fn publish(&self, channel: &str, payload: &str) {
        let _ = self.events.send(KvEvent {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
    }

    /// Process-wide subscription to every channel.
    pub fn subscribe(&self) -> broadcast::Receiver<KvEvent> {
        self.events.subscribe()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_set_get_del() {
        let kv = MemoryKv::new();
        kv.hset("job:1", &[("status", "queued"), ("user", "u1")]);
        let hash = kv.hgetall("job:1").unwrap();
        assert_eq!(hash["status"], "queued");

        kv.hset("job:1", &[("status", "running")]);
        assert_eq!(kv.hgetall("job:1").unwrap()["status"], "running");
        assert_eq!(kv.hgetall("job:1").unwrap()["user"], "u1");

        kv.hdel("job:1", &["user"]);
        assert!(!kv.hgetall("job:1").unwrap().contains_key("user"));

        assert!(kv.del("job:1"));
        assert!(kv.hgetall("job:1").is_none());
    }

    #[test]
    fn string_ttl_expires() {
        let kv = MemoryKv::new();
        kv.set_ex("k", "v", Duration::from_millis(5));
        assert_eq!(kv.get("k").as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(kv.get("k"), None);
    }

    #[test]
    fn hash_ttl_expires() {
        let kv = MemoryKv::new();
        kv.hset("h", &[("a", "1")]);
        kv.expire("h", Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));
        assert!(kv.hgetall("h").is_none());
    }

    #[test]
    fn expire_on_missing_key_is_noop() {
        let kv = MemoryKv::new();
        kv.expire("nope", Duration::from_millis(5));
        assert_eq!(kv.get("nope"), None);
    }

    #[test]
    fn zset_range_strictly_greater() {
        let kv = MemoryKv::new();
        kv.zadd("z", "a", 10);
        kv.zadd("z", "b", 20);
        kv.zadd("z", "c", 30);
        let got = kv.zrange_gt("z", 10);
        assert_eq!(got, vec![("b".to_string(), 20), ("c".to_string(), 30)]);
        assert!(kv.zrange_gt("z", 30).is_empty());
    }

    #[test]
    fn zset_score_update_and_rem() {
        let kv = MemoryKv::new();
        kv.zadd("z", "a", 10);
        kv.zadd("z", "a", 50);
        assert_eq!(kv.zcard("z"), 1);
        assert_eq!(kv.zrange_gt("z", 0), vec![("a".to_string(), 50)]);
        assert!(kv.zrem("z", "a"));
        assert!(!kv.zrem("z", "a"));
    }

    #[test]
    fn zrem_below_prunes_old_scores() {
        let kv = MemoryKv::new();
        kv.zadd("z", "old", 100);
        kv.zadd("z", "new", 200);
        assert_eq!(kv.zrem_below("z", 150), 1);
        assert_eq!(kv.zcard("z"), 1);
    }

    #[test]
    fn zrem_oldest_evicts_lowest_scores_first() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            kv.zadd("z", &format!("m{i}"), i);
        }
        assert_eq!(kv.zrem_oldest("z", 2), 2);
        let left = kv.zrange_gt("z", i64::MIN);
        assert_eq!(left.first().map(|(_, s)| *s), Some(2));
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let kv = MemoryKv::new();
        let mut rx = kv.subscribe();
        kv.publish("changes:u1", "job-9");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel, "changes:u1");
        assert_eq!(event.payload, "job-9");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let kv = MemoryKv::new();
        kv.publish("changes:u1", "job-9");
    }
}
