//! Align stage - partitions the song and describes each segment's clip.

use async_trait::async_trait;

use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::PipelineStage;
use crate::orchestrator::types::{Context, RunState};
use crate::timing::{align, is_partition, plan_segments};

pub struct AlignStage;

impl AlignStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AlignStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for AlignStage {
    fn name(&self) -> &str {
        "Align"
    }

    fn description(&self) -> &str {
        "Aligning segments"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        state.require_audio()?;
        state.require_transcript()?;
        Ok(())
    }

    async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let duration = state.require_audio()?.duration_secs;
        let max_segment = ctx.settings.timing.max_segment_duration_secs;

        let segments = align(duration, max_segment)?;
        let descriptors = plan_segments(
            &segments,
            state.require_transcript()?,
            state.style.as_deref(),
        );

        ctx.logger.info(&format!(
            "{} segments over {:.2}s",
            segments.len(),
            duration
        ));
        for (segment, descriptor) in segments.iter().zip(&descriptors) {
            ctx.logger
                .debug(&format!("{}: \"{}\"", segment, descriptor.lyrics));
        }

        state.record_segments(segments, descriptors)
    }

    fn validate_output(&self, ctx: &Context, state: &RunState) -> StageResult<()> {
        let duration = state.require_audio()?.duration_secs;
        let segments = state.require_segments()?;
        let descriptors = state.require_descriptors()?;

        if !is_partition(segments, duration, ctx.settings.timing.max_segment_duration_secs) {
            return Err(StageError::invalid_output(
                "segments do not partition the song",
            ));
        }
        if descriptors.len() != segments.len() {
            return Err(StageError::invalid_output(format!(
                "{} clip descriptors for {} segments",
                descriptors.len(),
                segments.len()
            )));
        }
        Ok(())
    }
}
