// crates/kashi-core/src/error.rs
use thiserror::Error;

/// Errors from the generation-API client.
#[derive(Debug, Error)]
pub enum GenError {
    /// Provider returned a non-2xx status.
    #[error("generation API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider returned 2xx but the text was blank — typically a safety
    /// filter swallowing the completion.
    #[error("generation API returned an empty response")]
    EmptyResponse,

    /// Timeout, connection reset, or other transport failure.
    #[error("generation API network error: {0}")]
    Network(String),
}

impl GenError {
    /// Statuses worth retrying: rate limits and transient upstream failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            GenError::Network(_) => true,
            GenError::EmptyResponse => false,
        }
    }
}

/// Errors from the compact pipe-delimited annotation format.
#[derive(Debug, Error, PartialEq)]
pub enum CompactError {
    #[error("segment {segment}: expected 3 or 4 pipe-separated fields, got {got}")]
    FieldCount { segment: usize, got: usize },

    #[error("segment {segment}: empty surface")]
    EmptySurface { segment: usize },

    #[error("segment {segment}: reading and pitch bits must both be empty or both be set")]
    ReadingPitchMismatch { segment: usize },

    #[error("segment {segment}: non-binary pitch bits {bits:?}")]
    NonBinaryPitchBits { segment: usize, bits: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for status in [429u16, 500, 502, 503, 504] {
            let err = GenError::Api {
                status,
                message: "x".into(),
            };
            assert!(err.is_retryable(), "status {status} should be retryable");
        }
        for status in [400u16, 401, 403, 404, 422] {
            let err = GenError::Api {
                status,
                message: "x".into(),
            };
            assert!(!err.is_retryable(), "status {status} should not retry");
        }
        assert!(GenError::Network("timeout".into()).is_retryable());
        assert!(!GenError::EmptyResponse.is_retryable());
    }

    #[test]
    fn compact_error_display_names_segment() {
        let err = CompactError::NonBinaryPitchBits {
            segment: 2,
            bits: "01x".into(),
        };
        assert!(err.to_string().contains("segment 2"));
        assert!(err.to_string().contains("non-binary"));
    }
}
