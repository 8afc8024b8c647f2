//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::models::MAX_SEGMENT_DURATION;
use crate::producer::TrimAnchor;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Segment timing.
    #[serde(default)]
    pub timing: TimingSettings,

    /// Clip production (concurrency, retries, trimming).
    #[serde(default)]
    pub clips: ClipSettings,

    /// External service endpoints, models and retry budget.
    #[serde(default)]
    pub services: ServiceSettings,

    /// Final encoding.
    #[serde(default)]
    pub assembly: AssemblySettings,

    /// Result caching.
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Output, working, log and cache directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Receives the final video and the generated song.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Root for per-run working directories.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Folder for cached service results.
    #[serde(default = "default_cache_folder")]
    pub cache_folder: String,

    /// Keep the run's working directory after a successful run.
    #[serde(default)]
    pub keep_intermediates: bool,
}

fn default_output_folder() -> String {
    "downloads".to_string()
}

fn default_temp_root() -> String {
    "temp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_cache_folder() -> String {
    "cache".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            temp_root: default_temp_root(),
            logs_folder: default_logs_folder(),
            cache_folder: default_cache_folder(),
            keep_intermediates: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of service output lines to show on failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Minimum level for the run log.
    #[serde(default)]
    pub level: LogLevel,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            level: LogLevel::default(),
        }
    }
}

/// Segment timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Longest segment; equals the clip length the video service produces.
    #[serde(default = "default_max_segment")]
    pub max_segment_duration_secs: f64,

    /// Allowed difference between total video and audio duration.
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_secs: f64,
}

fn default_max_segment() -> f64 {
    MAX_SEGMENT_DURATION
}

fn default_duration_tolerance() -> f64 {
    0.1
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            max_segment_duration_secs: default_max_segment(),
            duration_tolerance_secs: default_duration_tolerance(),
        }
    }
}

/// Clip production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipSettings {
    /// Clip requests in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per segment before the run fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_clip_backoff")]
    pub initial_backoff_secs: u64,

    /// Maximum wait for one clip attempt.
    #[serde(default = "default_clip_timeout")]
    pub attempt_timeout_secs: u64,

    /// Interval between status polls of a clip generation.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Reference point kept when a clip is longer than its segment.
    #[serde(default)]
    pub trim_anchor: TrimAnchor,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_clip_backoff() -> u64 {
    5
}

fn default_clip_timeout() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_clip_backoff(),
            attempt_timeout_secs: default_clip_timeout(),
            poll_interval_secs: default_poll_interval(),
            trim_anchor: TrimAnchor::default(),
        }
    }
}

impl ClipSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }
}

/// External services.
///
/// Credentials are never stored here, only the names of the environment
/// variables that hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Attempts per call for the lyrics, music and transcription stages.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_clip_backoff")]
    pub initial_backoff_secs: u64,

    /// Maximum wait for one call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Chat model used for lyrics, as `provider/model`.
    #[serde(default = "default_lyrics_model")]
    pub lyrics_model: String,

    #[serde(default = "default_lyrics_temperature")]
    pub lyrics_temperature: f64,

    /// Lyrics longer than this are cut; the music model rejects longer input.
    #[serde(default = "default_max_lyrics_chars")]
    pub max_lyrics_chars: usize,

    /// Chat completions base URL for `openai/` models.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    #[serde(default = "default_llm_api_key_env")]
    pub llm_api_key_env: String,

    /// OpenAI-compatible base URL for `anthropic/` models.
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,

    #[serde(default = "default_anthropic_key_env")]
    pub anthropic_api_key_env: String,

    #[serde(default = "default_replicate_base_url")]
    pub replicate_base_url: String,

    #[serde(default = "default_replicate_token_env")]
    pub replicate_api_token_env: String,

    /// Replicate model used for music.
    #[serde(default = "default_music_model")]
    pub music_model: String,

    /// Replicate model version used for transcription.
    #[serde(default = "default_transcription_version")]
    pub transcription_version: String,

    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    #[serde(default = "default_gemini_key_env")]
    pub gemini_api_key_env: String,

    /// Video generation model.
    #[serde(default = "default_video_model")]
    pub video_model: String,
}

fn default_call_timeout() -> u64 {
    900
}

fn default_lyrics_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_lyrics_temperature() -> f64 {
    0.8
}

fn default_max_lyrics_chars() -> usize {
    599
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_replicate_base_url() -> String {
    "https://api.replicate.com/v1".to_string()
}

fn default_replicate_token_env() -> String {
    "REPLICATE_API_TOKEN".to_string()
}

fn default_music_model() -> String {
    "minimax/music-1.5".to_string()
}

fn default_transcription_version() -> String {
    "3ab86df6c8f54c11309d4d1f930ac292bad43ace52d10c80d87eb258b3c9f79c".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_video_model() -> String {
    "veo-3.1-fast-generate-preview".to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_clip_backoff(),
            call_timeout_secs: default_call_timeout(),
            lyrics_model: default_lyrics_model(),
            lyrics_temperature: default_lyrics_temperature(),
            max_lyrics_chars: default_max_lyrics_chars(),
            llm_base_url: default_llm_base_url(),
            llm_api_key_env: default_llm_api_key_env(),
            anthropic_base_url: default_anthropic_base_url(),
            anthropic_api_key_env: default_anthropic_key_env(),
            replicate_base_url: default_replicate_base_url(),
            replicate_api_token_env: default_replicate_token_env(),
            music_model: default_music_model(),
            transcription_version: default_transcription_version(),
            gemini_base_url: default_gemini_base_url(),
            gemini_api_key_env: default_gemini_key_env(),
            video_model: default_video_model(),
        }
    }
}

impl ServiceSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            attempt_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

/// Final encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySettings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_preset")]
    pub preset: String,

    /// File name of the final video inside the output folder.
    #[serde(default = "default_final_name")]
    pub final_file_name: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_fps() -> u32 {
    24
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_final_name() -> String {
    "final_video.mp4".to_string()
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            fps: default_fps(),
            preset: default_preset(),
            final_file_name: default_final_name(),
        }
    }
}

/// Result caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Reuse cached lyrics, music, transcripts and clips.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Bounded retry with exponential backoff and a per-attempt time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Delay before the given retry (attempt 2 waits `initial_backoff`).
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(2).min(16);
        self.initial_backoff.saturating_mul(1 << doublings)
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Timing,
    Clips,
    Services,
    Assembly,
    Cache,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 7] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Timing,
        ConfigSection::Clips,
        ConfigSection::Services,
        ConfigSection::Assembly,
        ConfigSection::Cache,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Timing => "timing",
            ConfigSection::Clips => "clips",
            ConfigSection::Services => "services",
            ConfigSection::Assembly => "assembly",
            ConfigSection::Cache => "cache",
        }
    }

    /// Comment written above the section.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Output, working, log and cache directories",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Timing => "Segment timing",
            ConfigSection::Clips => "Video clip generation",
            ConfigSection::Services => "External services (credentials are read from the named env vars)",
            ConfigSection::Assembly => "Final video encoding",
            ConfigSection::Cache => "Service result caching",
        }
    }
}
