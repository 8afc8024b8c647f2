//! Core types for the orchestrator pipeline.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::logging::RunLogger;
use crate::models::{
    AudioTrack, ClipDescriptor, FinalVideo, LyricsDocument, Prompt, Segment, Transcript,
    TrimmedClip,
};
use crate::producer::SegmentProgressCallback;
use crate::services::Services;

use super::errors::{StageError, StageResult};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (stage_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// File name of the state snapshot inside the working directory.
pub const RUN_STATE_FILE: &str = "run_state.json";

/// Read-only context passed to pipeline stages.
///
/// Holds the run's input, configuration and collaborators. Everything a
/// stage produces goes in [`RunState`].
pub struct Context {
    /// The user's request.
    pub prompt: Prompt,
    pub settings: Settings,
    pub run_name: String,
    /// Working directory owned by this run.
    pub work_dir: PathBuf,
    /// Where the song and the final video are written.
    pub output_dir: PathBuf,
    pub logger: Arc<RunLogger>,
    pub services: Services,
    /// Fires when the run is cancelled.
    pub cancel: CancellationToken,
    progress_callback: Option<ProgressCallback>,
    segment_callback: Option<SegmentProgressCallback>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prompt: Prompt,
        settings: Settings,
        run_name: impl Into<String>,
        work_dir: PathBuf,
        output_dir: PathBuf,
        logger: Arc<RunLogger>,
        services: Services,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            prompt,
            settings,
            run_name: run_name.into(),
            work_dir,
            output_dir,
            logger,
            services,
            cancel,
            progress_callback: None,
            segment_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Receive per-segment events during clip production.
    pub fn with_segment_callback(mut self, callback: SegmentProgressCallback) -> Self {
        self.segment_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, stage_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(stage_name, percent, message);
        }
    }

    pub fn segment_callback(&self) -> Option<SegmentProgressCallback> {
        self.segment_callback.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Directory the raw clips are downloaded to.
    pub fn clips_dir(&self) -> PathBuf {
        self.work_dir.join("clips")
    }

    pub fn state_path(&self) -> PathBuf {
        self.work_dir.join(RUN_STATE_FILE)
    }
}

/// Write-once manifest of everything the run has produced.
///
/// Each slot is filled by exactly one stage; recording into a filled slot
/// is an error, so no stage can replace an earlier stage's artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub started_at: Option<String>,
    pub prompt: Prompt,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<LyricsDocument>,
    /// Style actually used for the song.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptors: Option<Vec<ClipDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clips: Option<Vec<TrimmedClip>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video: Option<FinalVideo>,
}

fn record<T>(slot: &mut Option<T>, value: T, what: &str) -> StageResult<()> {
    if slot.is_some() {
        return Err(StageError::invalid_output(format!(
            "{} already recorded for this run",
            what
        )));
    }
    *slot = Some(value);
    Ok(())
}

fn require<'a, T>(slot: &'a Option<T>, what: &str) -> StageResult<&'a T> {
    slot.as_ref()
        .ok_or_else(|| StageError::input(format!("no {} recorded yet", what)))
}

impl RunState {
    pub fn new(run_id: impl Into<String>, prompt: Prompt) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            prompt,
            lyrics: None,
            style: None,
            audio: None,
            transcript: None,
            segments: None,
            descriptors: None,
            clips: None,
            final_video: None,
        }
    }

    pub fn record_lyrics(&mut self, lyrics: LyricsDocument) -> StageResult<()> {
        record(&mut self.lyrics, lyrics, "lyrics")
    }

    pub fn record_audio(&mut self, style: String, audio: AudioTrack) -> StageResult<()> {
        record(&mut self.audio, audio, "audio")?;
        self.style = Some(style);
        Ok(())
    }

    pub fn record_transcript(&mut self, transcript: Transcript) -> StageResult<()> {
        record(&mut self.transcript, transcript, "transcript")
    }

    pub fn record_segments(
        &mut self,
        segments: Vec<Segment>,
        descriptors: Vec<ClipDescriptor>,
    ) -> StageResult<()> {
        record(&mut self.segments, segments, "segments")?;
        record(&mut self.descriptors, descriptors, "clip descriptors")
    }

    pub fn record_clips(&mut self, clips: Vec<TrimmedClip>) -> StageResult<()> {
        record(&mut self.clips, clips, "clips")
    }

    pub fn record_final_video(&mut self, video: FinalVideo) -> StageResult<()> {
        record(&mut self.final_video, video, "final video")
    }

    pub fn require_lyrics(&self) -> StageResult<&LyricsDocument> {
        require(&self.lyrics, "lyrics")
    }

    pub fn require_audio(&self) -> StageResult<&AudioTrack> {
        require(&self.audio, "audio")
    }

    pub fn require_transcript(&self) -> StageResult<&Transcript> {
        require(&self.transcript, "transcript")
    }

    pub fn require_segments(&self) -> StageResult<&[Segment]> {
        require(&self.segments, "segments").map(Vec::as_slice)
    }

    pub fn require_descriptors(&self) -> StageResult<&[ClipDescriptor]> {
        require(&self.descriptors, "clip descriptors").map(Vec::as_slice)
    }

    pub fn require_clips(&self) -> StageResult<&[TrimmedClip]> {
        require(&self.clips, "clips").map(Vec::as_slice)
    }

    /// Write the state as pretty JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Read a previously saved state.
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
