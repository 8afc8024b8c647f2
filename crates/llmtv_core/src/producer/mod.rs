//! Segment clip production.
//!
//! One clip is requested per segment from the video service, checked
//! against the segment's duration, and trimmed (never extended) to fit.
//!
//! # Example
//!
//! ```ignore
//! use llmtv_core::producer::{ClipProducer, TrimAnchor};
//!
//! let producer = ClipProducer::from_settings(services.video.clone(), work_dir.join("clips"), &settings.clips);
//! let clips = producer.produce_all(&plans, &cancel).await?;
//! ```

mod clip_producer;
mod progress;
mod trim;

pub use clip_producer::ClipProducer;
pub use progress::{SegmentEvent, SegmentProgress, SegmentProgressCallback};
pub use trim::{trim_clip, TrimAnchor, DURATION_EPSILON};
