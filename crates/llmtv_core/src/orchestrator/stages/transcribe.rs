//! Transcribe stage - timestamps the sung words.

use async_trait::async_trait;

use crate::models::Transcript;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::PipelineStage;
use crate::orchestrator::types::{Context, RunState};

use super::call_with_retry;

pub struct TranscribeStage;

impl TranscribeStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TranscribeStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for TranscribeStage {
    fn name(&self) -> &str {
        "Transcribe"
    }

    fn description(&self) -> &str {
        "Transcribing song"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        state.require_audio().map(|_| ())
    }

    async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let audio = state.require_audio()?.clone();
        let service = ctx.services.transcription.as_ref();
        ctx.logger
            .info(&format!("Transcribing with {}", service.name()));

        let raw =
            call_with_retry(ctx, service.name(), "transcribe", |_| service.transcribe(&audio)).await?;

        let transcript = Transcript::from_raw(&raw, audio.duration_secs)
            .map_err(|e| StageError::invalid_output(format!("unusable transcription: {}", e)))?;

        ctx.logger.info(&format!(
            "Transcript ready: {} spans",
            transcript.spans().len()
        ));
        state.record_transcript(transcript)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        let transcript = state.require_transcript()?;
        if !transcript.is_contiguous() {
            return Err(StageError::invalid_output(
                "transcript spans do not cover the song without gaps",
            ));
        }
        Ok(())
    }
}
