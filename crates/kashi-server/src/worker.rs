// crates/kashi-server/src/worker.rs
//! The worker: pulls tasks off the queue and runs the two generation passes.
//!
//! A task runs to completion or failure once dequeued — there is no
//! mid-flight cancellation. Failures mark the job `failed` and the loop
//! continues; nothing in here may crash the worker process.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use kashi_core::{
    annotation::{parse_annotations, parse_translations},
    GenError, Generator, JobResult, JobStatus, Stage, ANNOTATION_PROMPT, TRANSLATION_PROMPT,
};

use crate::queue::{QueuedTask, WorkQueue};
use crate::store::{JobStore, StoreError};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("lyrics contain no usable lines")]
    EmptyLyrics,

    #[error("job vanished from the store mid-task")]
    MissingMetadata,

    #[error(transparent)]
    Gen(#[from] GenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode line map: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Split lyrics into the shared line map: trailing whitespace trimmed,
/// empty lines dropped, indexed from zero.
pub fn split_lines(lyrics: &str) -> BTreeMap<u32, String> {
    lyrics
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, l)| (i as u32, l.to_string()))
        .collect()
}

pub struct Worker {
    store: JobStore,
    queue: Arc<WorkQueue>,
    generator: Arc<dyn Generator>,
}

impl Worker {
    pub fn new(store: JobStore, queue: Arc<WorkQueue>, generator: Arc<dyn Generator>) -> Self {
        Self {
            store,
            queue,
            generator,
        }
    }

    /// Pull loop. One task in flight per worker; scale by running more
    /// workers against the same queue.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("worker started");
        loop {
            let task = tokio::select! {
                _ = shutdown.cancelled() => break,
                task = self.queue.pop() => task,
            };
            self.handle(task).await;
        }
        tracing::info!("worker stopped");
    }

    async fn handle(&self, task: QueuedTask) {
        let job_id = task.job_id.clone();
        match self.process(task).await {
            Ok(()) => {
                self.queue.record_completed();
                tracing::info!(job_id = %job_id, "job succeeded");
            }
            Err(e) => {
                self.queue.record_failed();
                tracing::warn!(job_id = %job_id, error = %e, "job failed");
                // Terminal transition does the index move and publishes the
                // final change. If even that fails the job has expired and
                // nobody is left to tell.
                if let Err(te) =
                    self.store
                        .transition(&job_id, JobStatus::Failed, None, Some(&e.to_string()))
                {
                    tracing::error!(job_id = %job_id, error = %te, "could not record job failure");
                }
            }
        }
    }

    async fn process(&self, task: QueuedTask) -> Result<(), TaskError> {
        self.store
            .transition(&task.job_id, JobStatus::Running, Some(Stage::Translating), None)?;

        let lines = split_lines(&task.lyrics);
        if lines.is_empty() {
            return Err(TaskError::EmptyLyrics);
        }
        // Serialized once and reused as the shared input for both passes.
        let lines_json = serde_json::to_string(&lines)?;
        let (title, artist, _) = self
            .store
            .lyrics(&task.job_id)
            .ok_or(TaskError::MissingMetadata)?;

        let translation_raw = self
            .generator
            .call(
                TRANSLATION_PROMPT,
                &[
                    ("title", title.as_str()),
                    ("artist", artist.as_str()),
                    ("lines", lines_json.as_str()),
                ],
            )
            .await?;
        self.store
            .transition(&task.job_id, JobStatus::Running, Some(Stage::LyricsData), None)?;

        let annotation_raw = self
            .generator
            .call(ANNOTATION_PROMPT, &[("lines", lines_json.as_str())])
            .await?;
        self.store
            .transition(&task.job_id, JobStatus::Running, Some(Stage::Finalizing), None)?;

        let result = JobResult {
            translations: parse_translations(&translation_raw),
            annotations: parse_annotations(&annotation_raw),
        };
        self.store.write_result(&task.job_id, &result)?;
        self.store
            .transition(&task.job_id, JobStatus::Succeeded, None, None)?;
        Ok(())
    }
}
