// crates/kashi-server/src/test_support.rs
//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::broker::JobEventBroker;
use crate::config::Config;
use crate::queue::WorkQueue;
use crate::state::AppState;
use crate::store::{JobStore, MemoryKv};

/// Fully wired application state over an in-memory store, dev bypass enabled.
pub fn test_state() -> Arc<AppState> {
    let config = Config::for_tests();
    let store = JobStore::new(Arc::new(MemoryKv::new()), config.retention, config.recent_cap);
    let queue = Arc::new(WorkQueue::new());
    let broker = JobEventBroker::new(store.clone(), config.debounce);
    AppState::new(config, store, queue, broker)
}
