//! Per-segment progress reporting.

use std::sync::Arc;
use std::time::Duration;

/// Something that happened to one segment's clip.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    /// Waiting for a free request slot.
    Queued,
    /// A request to the video service started.
    AttemptStarted { attempt: u32, max_attempts: u32 },
    /// The last attempt failed and another follows after `delay`.
    Retrying {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// The clip was generated and trimmed.
    Completed { duration_secs: f64 },
    /// The segment failed for good.
    Failed { reason: String },
}

/// Progress of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentProgress {
    pub segment_index: usize,
    pub event: SegmentEvent,
}

impl std::fmt::Display for SegmentProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.event {
            SegmentEvent::Queued => write!(f, "queued"),
            SegmentEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => write!(f, "attempt {}/{} started", attempt, max_attempts),
            SegmentEvent::Retrying {
                attempt,
                delay,
                reason,
            } => write!(
                f,
                "attempt {} failed ({}), retrying in {:.1}s",
                attempt,
                reason,
                delay.as_secs_f64()
            ),
            SegmentEvent::Completed { duration_secs } => {
                write!(f, "completed ({:.2}s)", duration_secs)
            }
            SegmentEvent::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Receives segment progress; shared between concurrent segment tasks.
pub type SegmentProgressCallback = Arc<dyn Fn(&SegmentProgress) + Send + Sync>;
