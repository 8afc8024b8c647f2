//! Pipeline stage implementations.
//!
//! Each stage is a separate module implementing the `PipelineStage` trait.
//!
//! # Stages
//!
//! 1. **Lyrics** - write structured lyrics for the prompt
//! 2. **Music** - turn the lyrics into a song
//! 3. **Transcribe** - timestamp the sung words
//! 4. **Align** - cut the song into segments and describe each clip
//! 5. **Clips** - generate and trim one clip per segment
//! 6. **Assemble** - join the clips under the song

mod align;
mod assemble;
mod clips;
mod lyrics;
mod music;
mod transcribe;

use std::future::Future;

pub use align::AlignStage;
pub use assemble::AssembleStage;
pub use clips::ClipsStage;
pub use lyrics::LyricsStage;
pub use music::{MusicStage, SONG_FILE};
pub use transcribe::TranscribeStage;

use crate::services::{retry_with_backoff, RetryEvent, ServiceResult};

use super::errors::StageResult;
use super::types::Context;

/// Call a single collaborator under the `[services]` retry budget.
///
/// Each attempt is logged as a command; failure reasons land in the run
/// log's tail so they are shown again if the run fails.
async fn call_with_retry<T, F, Fut>(
    ctx: &Context,
    service: &str,
    action: &str,
    call: F,
) -> StageResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let policy = ctx.settings.services.retry_policy();
    let result = retry_with_backoff(
        &policy,
        &ctx.cancel,
        service,
        |event| match event {
            RetryEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                if attempt > 1 {
                    ctx.logger.command(&format!(
                        "{} {} (attempt {}/{})",
                        service, action, attempt, max_attempts
                    ));
                } else {
                    ctx.logger.command(&format!("{} {}", service, action));
                }
            }
            RetryEvent::Retrying {
                attempt,
                error,
                delay,
            } => {
                ctx.logger.remember(&format!("{}: {}", service, error));
                ctx.logger.warn(&format!(
                    "{}: attempt {} failed ({}), retrying in {:.1}s",
                    service,
                    attempt,
                    error,
                    delay.as_secs_f64()
                ));
            }
        },
        call,
    )
    .await;

    if let Err(ref e) = result {
        if !e.is_cancelled() {
            ctx.logger.remember(&format!("{}: {}", service, e));
        }
    }
    result
}
