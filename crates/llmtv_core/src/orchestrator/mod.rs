//! Pipeline orchestrator for coordinating a generation run.
//!
//! A run is a strict sequence of stages. Each stage validates its input,
//! calls one collaborator (or, for clips, one per segment), and records
//! its artifact in the write-once `RunState`.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── Stage: Lyrics
//!     ├── Stage: Music
//!     ├── Stage: Transcribe
//!     ├── Stage: Align
//!     ├── Stage: Clips
//!     └── Stage: Assemble
//! ```
//!
//! # Example
//!
//! ```ignore
//! use llmtv_core::orchestrator::RunProcessor;
//!
//! let processor = RunProcessor::new(settings, services);
//! let outcome = processor.run(prompt).await;
//! match outcome.result {
//!     Ok(video) => println!("{}", video.path.display()),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

mod errors;
mod pipeline;
mod runner;
mod stage;
pub mod stages;
mod types;

pub use errors::{PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use runner::{RunCallbacks, RunOutcome, RunProcessor};
pub use stage::PipelineStage;
pub use stages::{
    AlignStage, AssembleStage, ClipsStage, LyricsStage, MusicStage, TranscribeStage, SONG_FILE,
};
pub use types::{Context, ProgressCallback, RunState, RUN_STATE_FILE};

/// Create the standard pipeline with all stages in order.
///
/// 1. Lyrics - write lyrics for the prompt
/// 2. Music - generate the song
/// 3. Transcribe - timestamp the lyrics in the song
/// 4. Align - partition the song into segments of at most 8s
/// 5. Clips - generate and trim one clip per segment, concurrently
/// 6. Assemble - join the clips under the song
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_stage(LyricsStage::new())
        .with_stage(MusicStage::new())
        .with_stage(TranscribeStage::new())
        .with_stage(AlignStage::new())
        .with_stage(ClipsStage::new())
        .with_stage(AssembleStage::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_pipeline_order() {
        assert_eq!(
            create_standard_pipeline().stage_names(),
            vec!["Lyrics", "Music", "Transcribe", "Align", "Clips", "Assemble"]
        );
    }
}
