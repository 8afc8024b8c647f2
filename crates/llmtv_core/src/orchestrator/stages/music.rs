//! Music stage - turns the lyrics into a song.

use async_trait::async_trait;

use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::PipelineStage;
use crate::orchestrator::types::{Context, RunState};

use super::call_with_retry;

/// File name of the generated song inside the output directory.
pub const SONG_FILE: &str = "song.mp3";

pub struct MusicStage;

impl MusicStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MusicStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for MusicStage {
    fn name(&self) -> &str {
        "Music"
    }

    fn description(&self) -> &str {
        "Generating music"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        state.require_lyrics().map(|_| ())
    }

    async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let lyrics = state.require_lyrics()?.clone();
        let style = ctx.prompt.style_or_default().to_string();
        let dest = ctx.output_dir.join(SONG_FILE);

        tokio::fs::create_dir_all(&ctx.output_dir)
            .await
            .map_err(|e| StageError::io_error("creating output directory", e))?;

        let service = ctx.services.music.as_ref();
        ctx.logger
            .info(&format!("Generating '{}' song with {}", style, service.name()));

        let audio = call_with_retry(ctx, service.name(), "generate song", |_| {
            service.generate(&lyrics, &style, &dest)
        })
        .await?;

        if !audio.has_valid_duration() {
            return Err(StageError::input(format!(
                "song duration {} is not positive",
                audio.duration_secs
            )));
        }

        ctx.logger.info(&format!(
            "Song ready: {} ({:.2}s)",
            audio.path.display(),
            audio.duration_secs
        ));
        state.record_audio(style, audio)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        let audio = state.require_audio()?;
        if !audio.path.exists() {
            return Err(StageError::invalid_output(format!(
                "song file missing: {}",
                audio.path.display()
            )));
        }
        Ok(())
    }
}
