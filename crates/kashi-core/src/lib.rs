// crates/kashi-core/src/lib.rs
//! Core domain library for the kashi lyrics service.
//!
//! This crate holds everything the server shares with tooling and tests:
//! - job/status/change types
//! - the generation-API client adapter with retry
//! - the output sanitizer and both annotation decoders (structured JSON and
//!   the compact pipe-delimited wire format)
//! - mora segmentation for pitch-accent maps

pub mod annotation;
pub mod compact;
pub mod error;
pub mod generation;
pub mod mora;
pub mod retry;
pub mod sanitize;
pub mod types;

pub use annotation::{parse_annotation_line, AnnotatedLine, KanjiReading, Mora, WordAnnotation};
pub use compact::parse_compact_line;
pub use error::{CompactError, GenError};
pub use generation::{Generator, HttpGenerator, ANNOTATION_PROMPT, TRANSLATION_PROMPT};
pub use retry::RetryPolicy;
pub use types::{Change, JobPayload, JobResult, JobStatus, LineAnnotation, Stage};

/// Current epoch in milliseconds. All job timestamps and index scores use this.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
