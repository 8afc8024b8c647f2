//! External collaborators behind fixed contracts.
//!
//! Each generative capability (lyrics, music, transcription, video clips)
//! and the final encoder is reached through an object-safe async trait.
//! The pipeline only ever sees these traits; vendor-specific adapters
//! live in the submodules and are chosen once, when the [`Services`]
//! bundle is built.
//!
//! # Example
//!
//! ```ignore
//! use llmtv_core::services::Services;
//!
//! let services = Services::from_settings(&settings)?;
//! let services = services.with_cache(cache);
//! ```

mod error;
mod http;
mod openai;
mod probe;
mod replicate;
mod retry;
#[cfg(any(test, feature = "test-util"))]
pub mod stub;
mod veo;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::assembler::{AssemblyPlan, FfmpegAssemblyEngine};
use crate::cache::{
    ArtifactCache, CachedLyricsService, CachedMusicService, CachedTranscriptionService,
    CachedVideoClipService,
};
use crate::config::Settings;
use crate::models::{AudioTrack, ClipDescriptor, LyricsDocument, Prompt, RawTranscription, VideoClip};

pub use error::{ServiceError, ServiceResult};
pub use openai::{ChatProvider, OpenAiLyricsService};
pub use probe::probe_duration;
pub use replicate::{ReplicateClient, ReplicateMusicService, ReplicateTranscriptionService};
pub use retry::{retry_with_backoff, RetryEvent};
pub use veo::VeoClipService;

/// Writes structured song lyrics for a prompt.
#[async_trait]
pub trait LyricsService: Send + Sync {
    /// Identifier used in logs and cache keys (typically the model).
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> ServiceResult<LyricsDocument>;
}

/// Turns lyrics and a style into a song.
#[async_trait]
pub trait MusicService: Send + Sync {
    fn name(&self) -> &str;

    /// Generate the song and write it to `dest`.
    async fn generate(
        &self,
        lyrics: &LyricsDocument,
        style: &str,
        dest: &Path,
    ) -> ServiceResult<AudioTrack>;
}

/// Produces timestamped text for an audio track.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &AudioTrack) -> ServiceResult<RawTranscription>;
}

/// Generates one fixed-length clip for a segment.
#[async_trait]
pub trait VideoClipService: Send + Sync {
    fn name(&self) -> &str;

    /// Generate the clip and write it to `dest`.
    ///
    /// Implementations that wait on remote work should stop waiting once
    /// `cancel` fires.
    async fn generate(
        &self,
        descriptor: &ClipDescriptor,
        dest: &Path,
        cancel: CancellationToken,
    ) -> ServiceResult<VideoClip>;
}

/// Sink for the command lines and raw output of external tools.
pub trait ToolLog: Send + Sync {
    fn command(&self, command: &str);
    fn output_line(&self, line: &str, is_stderr: bool);
}

/// Tool output sent to `tracing` only, for use outside a run.
pub struct TracingToolLog;

impl ToolLog for TracingToolLog {
    fn command(&self, command: &str) {
        tracing::info!("$ {}", command);
    }

    fn output_line(&self, line: &str, is_stderr: bool) {
        if is_stderr {
            tracing::warn!("{}", line);
        } else {
            tracing::debug!("{}", line);
        }
    }
}

/// Encodes an assembly plan into a single video file.
#[async_trait]
pub trait AssemblyEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Render the plan to `dest` and return the rendered duration in seconds.
    ///
    /// The tool invocation and its output go to `log`.
    async fn render(&self, plan: &AssemblyPlan, dest: &Path, log: &dyn ToolLog) -> ServiceResult<f64>;
}

/// One implementation of every collaborator, threaded through a run.
#[derive(Clone)]
pub struct Services {
    pub lyrics: Arc<dyn LyricsService>,
    pub music: Arc<dyn MusicService>,
    pub transcription: Arc<dyn TranscriptionService>,
    pub video: Arc<dyn VideoClipService>,
    pub assembly: Arc<dyn AssemblyEngine>,
}

impl Services {
    /// Build the hosted adapters from settings.
    ///
    /// Credentials are read here, from the environment variables named in
    /// `[services]`, and nowhere else.
    pub fn from_settings(settings: &Settings) -> ServiceResult<Self> {
        let svc = &settings.services;
        let replicate = ReplicateClient::from_settings(svc)?;

        Ok(Self {
            lyrics: Arc::new(OpenAiLyricsService::from_settings(svc)?),
            music: Arc::new(ReplicateMusicService::new(
                replicate.clone(),
                &svc.music_model,
                &settings.assembly.ffprobe_path,
            )),
            transcription: Arc::new(ReplicateTranscriptionService::new(
                replicate,
                &svc.transcription_version,
            )),
            video: Arc::new(VeoClipService::from_settings(
                svc,
                &settings.clips,
                &settings.assembly.ffprobe_path,
            )?),
            assembly: Arc::new(FfmpegAssemblyEngine::new(settings.assembly.clone())),
        })
    }

    /// Wrap the four generative services with the artifact cache.
    ///
    /// The assembly engine is never cached.
    pub fn with_cache(self, cache: Arc<ArtifactCache>) -> Self {
        Self {
            lyrics: Arc::new(CachedLyricsService::new(self.lyrics, Arc::clone(&cache))),
            music: Arc::new(CachedMusicService::new(self.music, Arc::clone(&cache))),
            transcription: Arc::new(CachedTranscriptionService::new(
                self.transcription,
                Arc::clone(&cache),
            )),
            video: Arc::new(CachedVideoClipService::new(self.video, cache)),
            assembly: self.assembly,
        }
    }
}
