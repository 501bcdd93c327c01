// crates/kashi-server/src/main.rs
//! Kashi server binary.
//!
//! Wires the in-memory store, work queue, event broker and worker pool
//! together, then serves the HTTP API until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kashi_core::HttpGenerator;
use kashi_server::broker::JobEventBroker;
use kashi_server::queue::WorkQueue;
use kashi_server::store::{JobStore, MemoryKv};
use kashi_server::worker::Worker;
use kashi_server::{create_app, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let kv = Arc::new(MemoryKv::new());
    let store = JobStore::new(Arc::clone(&kv), config.retention, config.recent_cap);
    let queue = Arc::new(WorkQueue::new());
    let broker = JobEventBroker::new(store.clone(), config.debounce);

    let generator: Arc<dyn kashi_core::Generator> = Arc::new(
        HttpGenerator::with_timeout(&config.gen_endpoint, &config.gen_api_key, config.gen_timeout)
            .context("building generation client")?,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(Arc::clone(&broker).run(shutdown.clone()));
    for slot in 0..config.workers {
        let worker = Worker::new(store.clone(), Arc::clone(&queue), Arc::clone(&generator));
        let token = shutdown.clone();
        tokio::spawn(async move {
            tracing::debug!(slot, "worker started");
            worker.run(token).await;
        });
    }

    let state = AppState::new(config.clone(), store, queue, broker);
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, workers = config.workers, "kashi server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        })
        .await
        .context("server error")?;

    Ok(())
}
