//! Precondition checks and atomic output around the assembly engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{AudioTrack, FinalVideo, TrimmedClip};
use crate::orchestrator::{StageError, StageResult};
use crate::services::{AssemblyEngine, ToolLog, TracingToolLog};

use super::plan::AssemblyPlan;

/// Joins trimmed clips under the song and writes the final video.
///
/// The output is either complete at `dest` or absent: rendering goes to
/// a partial file that is renamed only after its duration checks out.
pub struct Assembler {
    engine: Arc<dyn AssemblyEngine>,
    tolerance_secs: f64,
    log: Arc<dyn ToolLog>,
}

impl Assembler {
    pub fn new(engine: Arc<dyn AssemblyEngine>, tolerance_secs: f64) -> Self {
        Self {
            engine,
            tolerance_secs: tolerance_secs.abs(),
            log: Arc::new(TracingToolLog),
        }
    }

    /// Send the engine's command line and output to `log`.
    pub fn with_log(mut self, log: Arc<dyn ToolLog>) -> Self {
        self.log = log;
        self
    }

    pub fn tolerance_secs(&self) -> f64 {
        self.tolerance_secs
    }

    /// Path the engine renders to before the final rename.
    pub fn partial_path(dest: &Path) -> PathBuf {
        dest.with_extension("partial.mp4")
    }

    /// Assemble `clips` (any order) over `audio` into `dest`.
    ///
    /// `expected_segments` is the segment count from alignment.
    pub async fn assemble(
        &self,
        mut clips: Vec<TrimmedClip>,
        audio: &AudioTrack,
        expected_segments: usize,
        dest: &Path,
    ) -> StageResult<FinalVideo> {
        clips.sort_by_key(|c| c.segment_index);
        self.check_preconditions(&clips, audio, expected_segments)?;

        let plan = AssemblyPlan {
            clips,
            audio: audio.clone(),
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StageError::io_error("creating output directory", e))?;
        }

        let partial = Self::partial_path(dest);
        remove_if_exists(&partial).await;

        match self.render_checked(&plan, &partial).await {
            Ok(rendered) => {
                if let Err(e) = tokio::fs::rename(&partial, dest).await {
                    remove_if_exists(&partial).await;
                    return Err(StageError::io_error("moving final video into place", e));
                }

                Ok(FinalVideo {
                    path: dest.to_path_buf(),
                    audio_path: audio.path.clone(),
                    duration_secs: rendered,
                    segment_boundaries: plan.boundaries(),
                })
            }
            Err(e) => {
                remove_if_exists(&partial).await;
                Err(e)
            }
        }
    }

    fn check_preconditions(
        &self,
        clips: &[TrimmedClip],
        audio: &AudioTrack,
        expected_segments: usize,
    ) -> StageResult<()> {
        if !audio.has_valid_duration() {
            return Err(StageError::input(format!(
                "audio duration {} is not positive",
                audio.duration_secs
            )));
        }

        if clips.len() != expected_segments {
            return Err(StageError::input(format!(
                "expected {} clips, got {}",
                expected_segments,
                clips.len()
            )));
        }

        if let Some((position, clip)) = clips
            .iter()
            .enumerate()
            .find(|(i, c)| c.segment_index != *i)
        {
            return Err(StageError::input(format!(
                "clip sequence is not contiguous: position {} holds segment {}",
                position, clip.segment_index
            )));
        }

        let total: f64 = clips.iter().map(|c| c.duration_secs).sum();
        self.check_duration(total, audio.duration_secs)
    }

    fn check_duration(&self, video_secs: f64, audio_secs: f64) -> StageResult<()> {
        if (video_secs - audio_secs).abs() > self.tolerance_secs {
            return Err(StageError::DurationMismatch {
                video_secs,
                audio_secs,
                tolerance_secs: self.tolerance_secs,
            });
        }
        Ok(())
    }

    async fn render_checked(&self, plan: &AssemblyPlan, partial: &Path) -> StageResult<f64> {
        let rendered = self
            .engine
            .render(plan, partial, self.log.as_ref())
            .await
            .map_err(|e| StageError::from_service(e, 1))?;

        self.check_duration(rendered, plan.audio.duration_secs)?;

        if !partial.exists() {
            return Err(StageError::invalid_output(format!(
                "{} reported success but wrote no file",
                self.engine.name()
            )));
        }

        Ok(rendered)
    }
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stub::StubAssemblyEngine;
    use crate::services::ServiceError;
    use tempfile::tempdir;

    fn window(index: usize, duration: f64) -> TrimmedClip {
        TrimmedClip {
            segment_index: index,
            source: format!("segment_{:03}.mp4", index).into(),
            offset_secs: 0.0,
            duration_secs: duration,
        }
    }

    fn assembler(engine: StubAssemblyEngine) -> (Assembler, Arc<StubAssemblyEngine>) {
        let engine = Arc::new(engine);
        (Assembler::new(engine.clone(), 0.1), engine)
    }

    #[tokio::test]
    async fn assembles_in_index_order() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out").join("final_video.mp4");
        let (assembler, engine) = assembler(StubAssemblyEngine::new());

        let clips = vec![window(2, 4.0), window(0, 8.0), window(1, 8.0)];
        let audio = AudioTrack::new(dir.path().join("song.mp3"), 20.0);

        let video = assembler.assemble(clips, &audio, 3, &dest).await.unwrap();

        assert!(dest.exists());
        assert!(!Assembler::partial_path(&dest).exists());
        assert_eq!(video.segment_boundaries, vec![0.0, 8.0, 16.0, 20.0]);
        assert_eq!(video.duration_secs, 20.0);

        let plans = engine.plans();
        let order: Vec<usize> = plans[0].clips.iter().map(|c| c.segment_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn total_duration_mismatch_is_rejected_before_rendering() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("final_video.mp4");
        let (assembler, engine) = assembler(StubAssemblyEngine::new());

        // Each clip could match some segment, but together they run long
        let clips = vec![window(0, 8.0), window(1, 8.0), window(2, 8.0)];
        let audio = AudioTrack::new("song.mp3", 20.0);

        let err = assembler.assemble(clips, &audio, 3, &dest).await.unwrap_err();
        assert!(matches!(err, StageError::DurationMismatch { .. }));
        assert!(engine.plans().is_empty());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn small_rounding_is_tolerated() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("final_video.mp4");
        let (assembler, _) = assembler(StubAssemblyEngine::new().with_rendered_duration(20.04));

        let clips = vec![window(0, 8.0), window(1, 8.0), window(2, 4.05)];
        let audio = AudioTrack::new("song.mp3", 20.0);

        assert!(assembler.assemble(clips, &audio, 3, &dest).await.is_ok());
    }

    #[tokio::test]
    async fn rendered_mismatch_leaves_no_artifact() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("final_video.mp4");
        let (assembler, _) = assembler(StubAssemblyEngine::new().with_rendered_duration(17.5));

        let clips = vec![window(0, 8.0), window(1, 8.0), window(2, 4.0)];
        let audio = AudioTrack::new("song.mp3", 20.0);

        let err = assembler.assemble(clips, &audio, 3, &dest).await.unwrap_err();
        assert!(matches!(err, StageError::DurationMismatch { video_secs, .. } if video_secs == 17.5));
        assert!(!dest.exists());
        assert!(!Assembler::partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn engine_failure_removes_partial() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("final_video.mp4");
        let (assembler, _) = assembler(
            StubAssemblyEngine::new().fail_with(ServiceError::failed("stub-assembly", "disk full")),
        );

        let clips = vec![window(0, 8.0)];
        let audio = AudioTrack::new("song.mp3", 8.0);

        let err = assembler.assemble(clips, &audio, 1, &dest).await.unwrap_err();
        assert!(matches!(err, StageError::Fatal(_)));
        assert!(!Assembler::partial_path(&dest).exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn missing_or_duplicate_segments_are_rejected() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("final_video.mp4");
        let (assembler, _) = assembler(StubAssemblyEngine::new());
        let audio = AudioTrack::new("song.mp3", 16.0);

        let missing = vec![window(0, 8.0)];
        assert!(matches!(
            assembler.assemble(missing, &audio, 2, &dest).await,
            Err(StageError::Input(_))
        ));

        let duplicate = vec![window(0, 8.0), window(0, 8.0)];
        assert!(matches!(
            assembler.assemble(duplicate, &audio, 2, &dest).await,
            Err(StageError::Input(_))
        ));
    }
}
