// crates/kashi-server/src/broker.rs
//! Job event broker: bridges the change pub/sub channel into parked
//! long-poll waiters.
//!
//! Notifications are buffered per user for a short debounce window so a burst
//! of stage transitions milliseconds apart resolves waiters once, not three
//! times. Resolution is per-waiter cursor-based: two waiters for the same
//! user registered at different `since` cursors get different change sets
//! from the same flush.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use kashi_core::Change;

use crate::store::{user_from_channel, JobStore};

struct Waiter {
    id: u64,
    since: i64,
    limit: usize,
    tx: oneshot::Sender<Vec<Change>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    waiters: HashMap<String, Vec<Waiter>>,
    /// Job ids buffered per user awaiting a debounce flush. Presence of the
    /// user key doubles as the "flush scheduled" marker.
    buffered: HashMap<String, HashSet<String>>,
}

pub struct JobEventBroker {
    store: JobStore,
    debounce: Duration,
    inner: Mutex<Inner>,
}

impl JobEventBroker {
    pub fn new(store: JobStore, debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            debounce,
            inner: Mutex::new(Inner::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Park a long-poll request. The receiver resolves with this waiter's own
    /// cursor-scoped changes on the next flush for the user.
    pub fn register(&self, user: &str, since: i64, limit: usize) -> (u64, oneshot::Receiver<Vec<Change>>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.waiters.entry(user.to_string()).or_default().push(Waiter {
            id,
            since,
            limit,
            tx,
        });
        tracing::debug!(user = %user, waiter = id, since, "long-poll waiter registered");
        (id, rx)
    }

    /// De-register a waiter. Idempotent: timeout, disconnect and resolution
    /// can all call this without caring who won.
    pub fn remove(&self, user: &str, id: u64) {
        let mut inner = self.lock();
        if let Some(list) = inner.waiters.get_mut(user) {
            list.retain(|w| w.id != id);
            if list.is_empty() {
                inner.waiters.remove(user);
            }
        }
    }

    /// Waiters currently parked, all users. For the debug endpoint.
    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.values().map(Vec::len).sum()
    }

    /// Users with a flush pending. For the debug endpoint.
    pub fn buffered_users(&self) -> usize {
        self.lock().buffered.len()
    }

    /// Handle one raw notification: buffer the job id and schedule a flush
    /// for the user unless one is already pending.
    fn on_notification(self: &Arc<Self>, user: &str, job_id: &str) {
        let schedule = {
            let mut inner = self.lock();
            match inner.buffered.get_mut(user) {
                Some(set) => {
                    set.insert(job_id.to_string());
                    false
                }
                None => {
                    inner
                        .buffered
                        .insert(user.to_string(), HashSet::from([job_id.to_string()]));
                    true
                }
            }
        };
        if schedule {
            let broker = Arc::clone(self);
            let user = user.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(broker.debounce).await;
                broker.flush(&user);
            });
        }
    }

    /// Resolve every waiter for the user against its own cursor. The buffered
    /// job ids only gate scheduling; hydration always goes through the
    /// indexes so each waiter's `since`/`limit` is honored.
    fn flush(&self, user: &str) {
        let waiters = {
            let mut inner = self.lock();
            inner.buffered.remove(user);
            inner.waiters.remove(user).unwrap_or_default()
        };
        if waiters.is_empty() {
            return;
        }
        tracing::debug!(user = %user, count = waiters.len(), "flushing long-poll waiters");
        for waiter in waiters {
            let changes = self.store.changes_since(user, waiter.since, waiter.limit);
            // A dropped receiver means the client went away; nothing to do.
            let _ = waiter.tx.send(changes);
        }
    }

    /// Process-wide subscription loop. Spawned once at startup.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut rx = self.store.kv().subscribe();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(event) => {
                        if let Some(user) = user_from_channel(&event.channel) {
                            self.on_notification(user, &event.payload);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Waiters self-heal on the next notification; the
                        // catch-up scan covers anything missed.
                        tracing::warn!(missed = n, "change subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("job event broker stopped");
    }
}
