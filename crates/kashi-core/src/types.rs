// crates/kashi-core/src/types.rs
//! Job lifecycle types shared by the API surface, the store, and the worker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotatedLine;

/// Status of an asynchronous translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued waiting for a worker.
    #[default]
    Queued,
    /// Job is actively being processed; `Stage` says how far along.
    Running,
    /// Job completed and a result was written.
    Succeeded,
    /// Job failed with an error message.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states receive no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sub-phase of a running job, for incremental progress reporting.
///
/// Present only while `status == running` — the store enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// First generation pass (translations) is in flight.
    Translating,
    /// Translations done; annotation pass is in flight.
    LyricsData,
    /// Both passes done; parsing and persisting the result.
    Finalizing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Translating => "translating",
            Stage::LyricsData => "lyrics_data",
            Stage::Finalizing => "finalizing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "translating" => Some(Stage::Translating),
            "lyrics_data" => Some(Stage::LyricsData),
            "finalizing" => Some(Stage::Finalizing),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Submission payload: what the client gives us at `POST /jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub lyrics: String,
}

/// One job-state notification, derived from job metadata at query time and
/// never stored independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Milliseconds since epoch; strictly increasing per job.
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-line annotation as stored in a result: either the decoded structured
/// form or a raw string (compact wire format, or literal text kept for
/// best-effort client-side recovery).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LineAnnotation {
    Structured(AnnotatedLine),
    Raw(String),
}

/// The product of a succeeded job: per-line translations and annotations,
/// keyed by zero-based line index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub translations: BTreeMap<u32, String>,
    pub annotations: BTreeMap<u32, LineAnnotation>,
}
