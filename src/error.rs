//! Error taxonomy for the threat assessment engine.
//!
//! Degenerate inputs (zero fps, empty videos) are not errors: they are handled
//! with defined defaults by the sampler and never surface here.

use thiserror::Error;

pub type ThreatResult<T> = Result<T, ThreatError>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ThreatError {
    /// The image or frame source cannot be opened or read at all.
    #[error("{0}")]
    SourceUnavailable(String),

    /// The detection source reported a failure for one image or frame.
    #[error("Detection error: {0}")]
    DetectionFailure(String),

    /// Invalid engine parameters, rejected before any work starts.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The frame source failed after yielding frames.
    #[error("frame source failed after frame {frame_index}: {reason}")]
    TruncatedSource { frame_index: u64, reason: String },
}

impl ThreatError {
    pub fn source_unavailable(err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable(err.to_string())
    }

    pub fn detection(err: impl std::fmt::Display) -> Self {
        Self::DetectionFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_failure_message_is_prefixed() {
        let err = ThreatError::detection("model produced no outputs");
        assert_eq!(err.to_string(), "Detection error: model produced no outputs");
    }

    #[test]
    fn source_unavailable_keeps_reason_verbatim() {
        let err = ThreatError::source_unavailable("Failed to open video file");
        assert_eq!(err.to_string(), "Failed to open video file");
    }
}
