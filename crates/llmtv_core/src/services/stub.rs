//! Deterministic in-process collaborators.
//!
//! Used by the test suites to drive the pipeline end to end without
//! network access or ffmpeg. Each stub can be scripted to fail a number
//! of times before it succeeds.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::assembler::AssemblyPlan;
use crate::models::{
    AudioTrack, ClipDescriptor, LyricLine, LyricsDocument, Prompt, RawChunk, RawTranscription,
    SectionRole, VideoClip,
};

use super::error::{ServiceError, ServiceResult};
use super::{
    AssemblyEngine, LyricsService, MusicService, Services, ToolLog, TranscriptionService,
    VideoClipService,
};

/// Errors handed out, in order, before a stub starts succeeding.
#[derive(Default)]
struct FailureScript {
    queue: Mutex<VecDeque<ServiceError>>,
}

impl FailureScript {
    fn push(&self, error: ServiceError) {
        self.queue.lock().push_back(error);
    }

    fn next(&self) -> Option<ServiceError> {
        self.queue.lock().pop_front()
    }
}

fn write_placeholder(service: &str, dest: &Path, content: &[u8]) -> ServiceResult<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ServiceError::failed(service, e.to_string()))?;
    }
    std::fs::write(dest, content).map_err(|e| ServiceError::failed(service, e.to_string()))
}

/// Fixed three-line lyrics used by the default stubs.
pub fn sample_lyrics() -> LyricsDocument {
    let lines = vec![
        LyricLine {
            text: "Neon cats on the midnight train".to_string(),
            role: SectionRole::Verse,
        },
        LyricLine {
            text: "Purring loud through the silver rain".to_string(),
            role: SectionRole::Verse,
        },
        LyricLine {
            text: "We ride, we ride, we never sleep".to_string(),
            role: SectionRole::Chorus,
        },
    ];
    // Three lines are never empty
    LyricsDocument::new(lines).unwrap_or_else(|| unreachable!())
}

/// Returns a fixed document.
pub struct StubLyricsService {
    document: LyricsDocument,
    failures: FailureScript,
    calls: AtomicUsize,
}

impl StubLyricsService {
    pub fn new(document: LyricsDocument) -> Self {
        Self {
            document,
            failures: FailureScript::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_with(self, error: ServiceError) -> Self {
        self.failures.push(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LyricsService for StubLyricsService {
    fn name(&self) -> &str {
        "stub-lyrics"
    }

    async fn generate(&self, _prompt: &Prompt) -> ServiceResult<LyricsDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.next() {
            return Err(error);
        }
        Ok(self.document.clone())
    }
}

/// Writes a placeholder song of a fixed duration.
pub struct StubMusicService {
    duration_secs: f64,
    failures: FailureScript,
    calls: AtomicUsize,
}

impl StubMusicService {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            failures: FailureScript::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_with(self, error: ServiceError) -> Self {
        self.failures.push(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MusicService for StubMusicService {
    fn name(&self) -> &str {
        "stub-music"
    }

    async fn generate(
        &self,
        lyrics: &LyricsDocument,
        style: &str,
        dest: &Path,
    ) -> ServiceResult<AudioTrack> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.next() {
            return Err(error);
        }
        let content = format!("{}\n{}", style, lyrics.to_tagged_text());
        write_placeholder("stub-music", dest, content.as_bytes())?;
        Ok(AudioTrack::new(dest, self.duration_secs))
    }
}

/// Returns a fixed raw transcription.
pub struct StubTranscriptionService {
    raw: RawTranscription,
    failures: FailureScript,
    calls: AtomicUsize,
}

impl StubTranscriptionService {
    pub fn new(raw: RawTranscription) -> Self {
        Self {
            raw,
            failures: FailureScript::default(),
            calls: AtomicUsize::new(0),
        }
    }

    /// One chunk per lyric line, spread evenly over `duration_secs`.
    pub fn evenly_spaced(lyrics: &LyricsDocument, duration_secs: f64) -> Self {
        let lines = lyrics.lines();
        let step = duration_secs / lines.len().max(1) as f64;
        let chunks = lines
            .iter()
            .enumerate()
            .map(|(i, line)| RawChunk {
                text: line.text.clone(),
                timestamp: (Some(i as f64 * step), Some((i + 1) as f64 * step)),
            })
            .collect();
        let text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self::new(RawTranscription { text, chunks })
    }

    pub fn fail_with(self, error: ServiceError) -> Self {
        self.failures.push(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionService for StubTranscriptionService {
    fn name(&self) -> &str {
        "stub-transcription"
    }

    async fn transcribe(&self, _audio: &AudioTrack) -> ServiceResult<RawTranscription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.next() {
            return Err(error);
        }
        Ok(self.raw.clone())
    }
}

/// Writes placeholder clips of a fixed native duration.
///
/// Tracks how many requests were in flight at once so tests can check
/// the concurrency bound.
pub struct StubVideoClipService {
    native_duration_secs: f64,
    overrides: HashMap<usize, f64>,
    failures: Mutex<HashMap<usize, VecDeque<ServiceError>>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubVideoClipService {
    pub fn new(native_duration_secs: f64) -> Self {
        Self {
            native_duration_secs,
            overrides: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Produce a different native duration for one segment.
    pub fn with_duration_for(mut self, segment_index: usize, secs: f64) -> Self {
        self.overrides.insert(segment_index, secs);
        self
    }

    /// Fail the next request for `segment_index` with `error`.
    pub fn fail_segment(self, segment_index: usize, error: ServiceError) -> Self {
        self.failures
            .lock()
            .entry(segment_index)
            .or_default()
            .push_back(error);
        self
    }

    /// Simulated generation latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Prompt texts received, in request order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl VideoClipService for StubVideoClipService {
    fn name(&self) -> &str {
        "stub-video"
    }

    async fn generate(
        &self,
        descriptor: &ClipDescriptor,
        dest: &Path,
        cancel: CancellationToken,
    ) -> ServiceResult<VideoClip> {
        let index = descriptor.segment_index;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(descriptor.prompt_text());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let waited = if self.delay.is_zero() {
            true
        } else {
            tokio::select! {
                _ = cancel.cancelled() => false,
                _ = tokio::time::sleep(self.delay) => true,
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if !waited {
            return Err(ServiceError::failed("stub-video", "abandoned on cancellation"));
        }

        let scripted = self
            .failures
            .lock()
            .get_mut(&index)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        write_placeholder("stub-video", dest, descriptor.prompt_text().as_bytes())?;

        Ok(VideoClip {
            segment_index: index,
            path: dest.to_path_buf(),
            native_duration_secs: self
                .overrides
                .get(&index)
                .copied()
                .unwrap_or(self.native_duration_secs),
        })
    }
}

/// Writes a placeholder file and reports a rendered duration.
///
/// Without an explicit duration it reports the plan's total clip
/// duration, as a faithful encoder would.
pub struct StubAssemblyEngine {
    rendered_duration: Option<f64>,
    failures: FailureScript,
    plans: Mutex<Vec<AssemblyPlan>>,
}

impl StubAssemblyEngine {
    pub fn new() -> Self {
        Self {
            rendered_duration: None,
            failures: FailureScript::default(),
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rendered_duration(mut self, secs: f64) -> Self {
        self.rendered_duration = Some(secs);
        self
    }

    pub fn fail_with(self, error: ServiceError) -> Self {
        self.failures.push(error);
        self
    }

    /// Plans received, in call order.
    pub fn plans(&self) -> Vec<AssemblyPlan> {
        self.plans.lock().clone()
    }
}

impl Default for StubAssemblyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssemblyEngine for StubAssemblyEngine {
    fn name(&self) -> &str {
        "stub-assembly"
    }

    async fn render(&self, plan: &AssemblyPlan, dest: &Path, log: &dyn ToolLog) -> ServiceResult<f64> {
        self.plans.lock().push(plan.clone());
        log.command(&format!("stub-assembly {} clips -> {}", plan.clips.len(), dest.display()));
        if let Some(error) = self.failures.next() {
            // Leave a partial file behind, as a crashed encoder would
            write_placeholder("stub-assembly", dest, b"partial")?;
            log.output_line(&error.to_string(), true);
            return Err(error);
        }
        write_placeholder("stub-assembly", dest, b"stub video")?;
        let rendered = self
            .rendered_duration
            .unwrap_or_else(|| plan.total_clip_duration());
        log.output_line(&format!("{}: {:.3}s", dest.display(), rendered), false);
        Ok(rendered)
    }
}

/// Stubs wired into one bundle, with handles kept for assertions.
pub struct StubServices {
    pub lyrics: Arc<StubLyricsService>,
    pub music: Arc<StubMusicService>,
    pub transcription: Arc<StubTranscriptionService>,
    pub video: Arc<StubVideoClipService>,
    pub assembly: Arc<StubAssemblyEngine>,
}

impl StubServices {
    /// Sample lyrics, a song of `duration_secs`, and 8s clips.
    pub fn standard(duration_secs: f64) -> Self {
        let lyrics = sample_lyrics();
        Self {
            transcription: Arc::new(StubTranscriptionService::evenly_spaced(
                &lyrics,
                duration_secs,
            )),
            lyrics: Arc::new(StubLyricsService::new(lyrics)),
            music: Arc::new(StubMusicService::new(duration_secs)),
            video: Arc::new(StubVideoClipService::new(8.0)),
            assembly: Arc::new(StubAssemblyEngine::new()),
        }
    }

    pub fn with_video(mut self, video: StubVideoClipService) -> Self {
        self.video = Arc::new(video);
        self
    }

    pub fn with_assembly(mut self, assembly: StubAssemblyEngine) -> Self {
        self.assembly = Arc::new(assembly);
        self
    }

    pub fn with_music(mut self, music: StubMusicService) -> Self {
        self.music = Arc::new(music);
        self
    }

    /// The bundle the pipeline consumes.
    pub fn services(&self) -> Services {
        Services {
            lyrics: Arc::clone(&self.lyrics) as Arc<dyn LyricsService>,
            music: Arc::clone(&self.music) as Arc<dyn MusicService>,
            transcription: Arc::clone(&self.transcription) as Arc<dyn TranscriptionService>,
            video: Arc::clone(&self.video) as Arc<dyn VideoClipService>,
            assembly: Arc::clone(&self.assembly) as Arc<dyn AssemblyEngine>,
        }
    }
}
