// crates/kashi-server/src/state.rs
//! Application state for the Axum server.
//!
//! Every service object (store, queue, broker) is constructed once at process
//! start and injected here; handlers never reach for ambient globals.

use std::sync::Arc;
use std::time::Instant;

use crate::broker::JobEventBroker;
use crate::config::Config;
use crate::queue::WorkQueue;
use crate::store::JobStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: Config,
    pub store: JobStore,
    pub queue: Arc<WorkQueue>,
    pub broker: Arc<JobEventBroker>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: JobStore,
        queue: Arc<WorkQueue>,
        broker: Arc<JobEventBroker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            store,
            queue,
            broker,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
