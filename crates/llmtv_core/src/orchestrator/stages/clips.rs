//! Clips stage - generates and trims one clip per segment.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{ClipDescriptor, Segment};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::PipelineStage;
use crate::orchestrator::types::{Context, RunState};
use crate::producer::{ClipProducer, SegmentEvent, SegmentProgress};

pub struct ClipsStage;

impl ClipsStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClipsStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for ClipsStage {
    fn name(&self) -> &str {
        "Clips"
    }

    fn description(&self) -> &str {
        "Generating video clips"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        let segments = state.require_segments()?;
        let descriptors = state.require_descriptors()?;
        if segments.is_empty() {
            return Err(StageError::input("no segments to produce"));
        }
        if segments.len() != descriptors.len() {
            return Err(StageError::input(format!(
                "{} descriptors for {} segments",
                descriptors.len(),
                segments.len()
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let plans: Vec<(Segment, ClipDescriptor)> = state
            .require_segments()?
            .iter()
            .copied()
            .zip(state.require_descriptors()?.iter().cloned())
            .collect();

        let logger = Arc::clone(&ctx.logger);
        let forward = ctx.segment_callback();
        let total = plans.len() as u32;
        let completed = AtomicU32::new(0);
        let producer = ClipProducer::from_settings(
            Arc::clone(&ctx.services.video),
            ctx.clips_dir(),
            &ctx.settings.clips,
        )
        .with_progress(Arc::new(move |progress: &SegmentProgress| {
            logger.segment(progress.segment_index, &progress.to_string());
            match &progress.event {
                SegmentEvent::Retrying { reason, .. } | SegmentEvent::Failed { reason } => {
                    logger.remember(&format!("segment {}: {}", progress.segment_index, reason));
                }
                SegmentEvent::Completed { .. } => {
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    logger.progress(done * 100 / total.max(1));
                }
                _ => {}
            }
            if let Some(ref callback) = forward {
                callback(progress);
            }
        }));

        ctx.logger.section(&format!("{} segments", plans.len()));
        ctx.logger.info(&format!(
            "Requesting {} clips from {} ({} at a time)",
            plans.len(),
            ctx.services.video.name(),
            ctx.settings.clips.max_concurrent.max(1)
        ));

        let clips = producer.produce_all(&plans, &ctx.cancel).await?;
        state.record_clips(clips)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        let segments = state.require_segments()?;
        let clips = state.require_clips()?;
        if clips.len() != segments.len() {
            return Err(StageError::invalid_output(format!(
                "{} clips for {} segments",
                clips.len(),
                segments.len()
            )));
        }
        Ok(())
    }
}
