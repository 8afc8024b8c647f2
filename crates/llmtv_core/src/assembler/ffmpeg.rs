//! ffmpeg command building and execution.
//!
//! One invocation does the whole assembly: every clip is an input, its
//! kept window is cut with `trim`, the windows are joined with `concat`
//! in segment order, and the song is mapped as the only audio stream.
//! Clip audio is discarded. The output is never cut to the shortest
//! stream, so a duration disagreement shows up in the rendered file
//! instead of being hidden.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::AssemblySettings;
use crate::services::{probe_duration, AssemblyEngine, ServiceError, ServiceResult, ToolLog};

use super::plan::AssemblyPlan;

const SERVICE: &str = "ffmpeg";
const STDERR_TAIL_LINES: usize = 20;

/// Builder for the ffmpeg command line of an assembly plan.
pub struct FfmpegCommandBuilder<'a> {
    plan: &'a AssemblyPlan,
    settings: &'a AssemblySettings,
    output_path: &'a Path,
}

impl<'a> FfmpegCommandBuilder<'a> {
    pub fn new(plan: &'a AssemblyPlan, settings: &'a AssemblySettings, output_path: &'a Path) -> Self {
        Self {
            plan,
            settings,
            output_path,
        }
    }

    /// Build the argument tokens (without the program name).
    pub fn build(&self) -> Vec<String> {
        let mut tokens = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
        ];

        // Inputs: clips first, audio last
        for clip in &self.plan.clips {
            tokens.push("-i".to_string());
            tokens.push(clip.source.to_string_lossy().to_string());
        }
        tokens.push("-i".to_string());
        tokens.push(self.plan.audio.path.to_string_lossy().to_string());

        tokens.push("-filter_complex".to_string());
        tokens.push(self.filter_graph());

        let audio_input = self.plan.clips.len();
        tokens.push("-map".to_string());
        tokens.push("[outv]".to_string());
        tokens.push("-map".to_string());
        tokens.push(format!("{}:a:0", audio_input));

        self.add_encoding_options(&mut tokens);

        tokens.push(self.output_path.to_string_lossy().to_string());
        tokens
    }

    /// Per-clip trim chains followed by the concat node.
    fn filter_graph(&self) -> String {
        let fps = self.settings.fps.max(1);
        let mut chains: Vec<String> = self
            .plan
            .clips
            .iter()
            .enumerate()
            .map(|(i, clip)| {
                format!(
                    "[{i}:v]trim=start={start:.6}:duration={dur:.6},setpts=PTS-STARTPTS,fps={fps},setsar=1[v{i}]",
                    i = i,
                    start = clip.offset_secs,
                    dur = clip.duration_secs,
                    fps = fps
                )
            })
            .collect();

        let labels: String = (0..self.plan.clips.len())
            .map(|i| format!("[v{}]", i))
            .collect();
        chains.push(format!(
            "{}concat=n={}:v=1:a=0[outv]",
            labels,
            self.plan.clips.len()
        ));

        chains.join(";")
    }

    fn add_encoding_options(&self, tokens: &mut Vec<String>) {
        tokens.push("-c:v".to_string());
        tokens.push(self.settings.video_codec.clone());
        if !self.settings.preset.is_empty() {
            tokens.push("-preset".to_string());
            tokens.push(self.settings.preset.clone());
        }
        tokens.push("-pix_fmt".to_string());
        tokens.push("yuv420p".to_string());
        tokens.push("-c:a".to_string());
        tokens.push(self.settings.audio_codec.clone());
        tokens.push("-movflags".to_string());
        tokens.push("+faststart".to_string());
    }
}

/// Assembly engine that shells out to ffmpeg and probes the result.
pub struct FfmpegAssemblyEngine {
    settings: AssemblySettings,
}

impl FfmpegAssemblyEngine {
    pub fn new(settings: AssemblySettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl AssemblyEngine for FfmpegAssemblyEngine {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn render(&self, plan: &AssemblyPlan, dest: &Path, log: &dyn ToolLog) -> ServiceResult<f64> {
        if plan.clips.is_empty() {
            return Err(ServiceError::failed(SERVICE, "nothing to assemble"));
        }

        let tokens = FfmpegCommandBuilder::new(plan, &self.settings, dest).build();
        log.command(&format!("{} {}", self.settings.ffmpeg_path, tokens.join(" ")));

        let output = Command::new(&self.settings.ffmpeg_path)
            .args(&tokens)
            .output()
            .await
            .map_err(|e| {
                ServiceError::failed(
                    SERVICE,
                    format!("failed to run {}: {}", self.settings.ffmpeg_path, e),
                )
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        for line in &lines {
            log.output_line(line, true);
        }

        if !output.status.success() {
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(ServiceError::failed(
                SERVICE,
                format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    tail
                ),
            ));
        }

        let rendered = probe_duration(&self.settings.ffprobe_path, dest).await?;
        log.output_line(&format!("{}: {:.3}s", dest.display(), rendered), false);
        Ok(rendered)
    }
}
