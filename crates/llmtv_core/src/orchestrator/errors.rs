//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Run → Stage → Segment → Service

use std::io;

use thiserror::Error;

use crate::models::PromptError;
use crate::services::ServiceError;

/// Top-level pipeline error with run context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed; no final video was produced.
    #[error("Run '{run_name}' failed at stage '{stage_name}'{}: {source}", segment_suffix(.segment))]
    StageFailed {
        run_name: String,
        stage_name: String,
        /// Segment that caused the failure, for per-segment stages.
        segment: Option<usize>,
        #[source]
        source: StageError,
    },

    /// Pipeline was cancelled.
    #[error("Run '{run_name}' was cancelled")]
    Cancelled { run_name: String },

    /// Failed to set up the run (working directory, logger).
    #[error("Run '{run_name}' setup failed: {message}")]
    SetupFailed { run_name: String, message: String },
}

fn segment_suffix(segment: &Option<usize>) -> String {
    match segment {
        Some(index) => format!(" (segment {})", index),
        None => String::new(),
    }
}

impl PipelineError {
    /// Create a stage failed error, lifting the segment index from the source.
    pub fn stage_failed(
        run_name: impl Into<String>,
        stage_name: impl Into<String>,
        source: StageError,
    ) -> Self {
        Self::StageFailed {
            run_name: run_name.into(),
            stage_name: stage_name.into(),
            segment: source.segment_index(),
            source,
        }
    }

    /// Create a setup failed error.
    pub fn setup_failed(run_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            run_name: run_name.into(),
            message: message.into(),
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(run_name: impl Into<String>) -> Self {
        Self::Cancelled {
            run_name: run_name.into(),
        }
    }

    /// Name of the failing stage, if a stage failed.
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage_name, .. } => Some(stage_name),
            _ => None,
        }
    }
}

/// Error from a pipeline stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// Invalid prompt or non-positive duration. Never retried.
    #[error("Invalid input: {0}")]
    Input(String),

    /// A retryable service failure persisted through every attempt.
    #[error("Gave up after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    /// Generated clip is shorter than the segment it must cover.
    #[error("Clip for segment {segment_index} is {native_secs:.3}s but {required_secs:.3}s are required")]
    ClipTooShort {
        segment_index: usize,
        native_secs: f64,
        required_secs: f64,
    },

    /// Assembled video and audio durations disagree beyond tolerance.
    #[error("Video duration {video_secs:.3}s differs from audio duration {audio_secs:.3}s by more than {tolerance_secs}s")]
    DurationMismatch {
        video_secs: f64,
        audio_secs: f64,
        tolerance_secs: f64,
    },

    /// Non-retryable service failure (credentials, content policy).
    #[error("{0}")]
    Fatal(#[source] ServiceError),

    /// Failure while producing one segment.
    #[error("Segment {index}: {source}")]
    Segment {
        index: usize,
        #[source]
        source: Box<StageError>,
    },

    /// Cancellation was requested while the stage was running.
    #[error("Cancelled")]
    Cancelled,

    /// Output validation failed.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Create an invalid output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create an I/O error with context.
    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Attach a segment index to an error.
    pub fn for_segment(index: usize, source: StageError) -> Self {
        match source {
            // Already tagged
            Self::Segment { .. } | Self::ClipTooShort { .. } => source,
            other => Self::Segment {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Classify a service failure that ended a call site's retry loop.
    pub fn from_service(error: ServiceError, attempts: u32) -> Self {
        if error.is_retryable() {
            Self::Transient {
                attempts,
                source: error,
            }
        } else {
            Self::Fatal(error)
        }
    }

    /// Segment the error relates to, if any.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            Self::Segment { index, .. } => Some(*index),
            Self::ClipTooShort { segment_index, .. } => Some(*segment_index),
            _ => None,
        }
    }

    /// Whether the error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Segment { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<PromptError> for StageError {
    fn from(error: PromptError) -> Self {
        Self::Input(error.to_string())
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_displays_context() {
        let err = StageError::ClipTooShort {
            segment_index: 2,
            native_secs: 6.0,
            required_secs: 8.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("segment 2"));
        assert!(msg.contains("6.000s"));
    }

    #[test]
    fn pipeline_error_chains_context() {
        let stage_err = StageError::for_segment(
            3,
            StageError::from_service(ServiceError::timeout("veo", 600), 3),
        );
        let pipeline_err = PipelineError::stage_failed("cats_run", "Clips", stage_err);

        let msg = pipeline_err.to_string();
        assert!(msg.contains("cats_run"));
        assert!(msg.contains("Clips"));
        assert!(msg.contains("(segment 3)"));
        assert_eq!(pipeline_err.stage_name(), Some("Clips"));
    }

    #[test]
    fn service_errors_are_classified() {
        let transient = StageError::from_service(ServiceError::rate_limited("replicate"), 3);
        assert!(matches!(transient, StageError::Transient { attempts: 3, .. }));

        let fatal = StageError::from_service(ServiceError::authentication("replicate", "bad key"), 1);
        assert!(matches!(fatal, StageError::Fatal(_)));
    }

    #[test]
    fn segment_tag_is_not_doubled() {
        let err = StageError::for_segment(1, StageError::for_segment(1, StageError::Cancelled));
        assert_eq!(err.segment_index(), Some(1));
        assert!(err.is_cancelled());
        assert!(matches!(err, StageError::Segment { ref source, .. } if matches!(**source, StageError::Cancelled)));
    }
}
