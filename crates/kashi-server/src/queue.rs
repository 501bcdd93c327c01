// crates/kashi-server/src/queue.rs
//! FIFO work queue between the submission handler and the workers.
//!
//! Handlers push, workers park on `pop`. Counters back `/debug/queue`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::Notify;

/// One unit of work: everything the worker needs without another round trip.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub job_id: String,
    pub user_id: String,
    pub lyrics: String,
}

/// Queue depth counters for the debug endpoint.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub depth: usize,
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct WorkQueue {
    tasks: Mutex<VecDeque<QueuedTask>>,
    notify: Notify,
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            enqueued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, task: QueuedTask) {
        self.lock().push_back(task);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Take the next task, waiting while the queue is empty.
    pub async fn pop(&self) -> QueuedTask {
        loop {
            let (task, more) = {
                let mut tasks = self.lock();
                let task = tasks.pop_front();
                (task, !tasks.is_empty())
            };
            if let Some(task) = task {
                // A single notify permit can cover several pushes; wake the
                // next worker if work remains.
                if more {
                    self.notify.notify_one();
                }
                return task;
            }
            self.notify.notified().await;
        }
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.lock().len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
