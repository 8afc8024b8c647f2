//! Assemble stage - joins the clips under the song.

use std::sync::Arc;

use async_trait::async_trait;

use crate::assembler::Assembler;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::PipelineStage;
use crate::orchestrator::types::{Context, RunState};

pub struct AssembleStage;

impl AssembleStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AssembleStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for AssembleStage {
    fn name(&self) -> &str {
        "Assemble"
    }

    fn description(&self) -> &str {
        "Assembling final video"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        state.require_audio()?;
        state.require_segments()?;
        state.require_clips()?;
        Ok(())
    }

    async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let assembler = Assembler::new(
            Arc::clone(&ctx.services.assembly),
            ctx.settings.timing.duration_tolerance_secs,
        )
        .with_log(ctx.logger.clone());
        let dest = ctx.output_dir.join(&ctx.settings.assembly.final_file_name);
        let expected = state.require_segments()?.len();
        let clips = state.require_clips()?.to_vec();
        let audio = state.require_audio()?.clone();

        ctx.logger.info(&format!(
            "Assembling {} clips with {} into {}",
            clips.len(),
            ctx.services.assembly.name(),
            dest.display()
        ));

        let video = assembler.assemble(clips, &audio, expected, &dest).await?;

        ctx.logger.info(&format!(
            "Final video: {} ({:.2}s)",
            video.path.display(),
            video.duration_secs
        ));
        state.record_final_video(video)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        let video = state
            .final_video
            .as_ref()
            .ok_or_else(|| StageError::invalid_output("final video not recorded"))?;
        if !video.path.exists() {
            return Err(StageError::invalid_output(format!(
                "final video missing: {}",
                video.path.display()
            )));
        }
        Ok(())
    }
}
