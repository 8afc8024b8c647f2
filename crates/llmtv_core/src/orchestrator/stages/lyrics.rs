//! Lyrics stage - writes structured lyrics for the prompt.

use async_trait::async_trait;

use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::PipelineStage;
use crate::orchestrator::types::{Context, RunState};

use super::call_with_retry;

pub struct LyricsStage;

impl LyricsStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LyricsStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for LyricsStage {
    fn name(&self) -> &str {
        "Lyrics"
    }

    fn description(&self) -> &str {
        "Writing lyrics"
    }

    fn validate_input(&self, _ctx: &Context, _state: &RunState) -> StageResult<()> {
        // Prompt is validated when it is constructed
        Ok(())
    }

    async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
        let service = ctx.services.lyrics.as_ref();
        ctx.logger.info(&format!(
            "Writing lyrics about '{}' with {}",
            ctx.prompt.concept(),
            service.name()
        ));

        let lyrics = call_with_retry(ctx, service.name(), "generate lyrics", |_| {
            service.generate(&ctx.prompt)
        })
        .await?;

        ctx.logger
            .info(&format!("Lyrics ready: {} lines", lyrics.lines().len()));
        for line in lyrics.lines() {
            ctx.logger
                .debug(&format!("[{}] {}", line.role.tag(), line.text));
        }

        state.record_lyrics(lyrics)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
        state.require_lyrics().map(|_| ())
    }
}
