//! Run processor: one prompt in, one final video (or a tagged error) out.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::logging::{LogConfig, RunLogCallback, RunLogger};
use crate::models::{FinalVideo, Prompt};
use crate::producer::SegmentProgressCallback;
use crate::services::Services;

use super::create_standard_pipeline;
use super::errors::{PipelineError, StageError};
use super::pipeline::CancelHandle;
use super::types::{Context, ProgressCallback, RunState};

/// Longest concept prefix kept in a run id.
const RUN_SLUG_MAX: usize = 32;

/// Observers for a single run. All optional.
#[derive(Default)]
pub struct RunCallbacks {
    /// Receives every formatted run log line.
    pub log: Option<RunLogCallback>,
    /// Receives stage-level progress.
    pub progress: Option<ProgressCallback>,
    /// Receives per-segment clip events.
    pub segment: Option<SegmentProgressCallback>,
}

/// Result of processing a single run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    /// Working directory; removed after success unless intermediates are kept.
    pub work_dir: PathBuf,
    /// Run log, if the logger could be created.
    pub log_path: Option<PathBuf>,
    pub result: Result<FinalVideo, PipelineError>,
}

impl RunOutcome {
    fn setup_failure(run_id: String, work_dir: PathBuf, message: String) -> Self {
        Self {
            result: Err(PipelineError::setup_failed(&run_id, message)),
            run_id,
            work_dir,
            log_path: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn final_video(&self) -> Option<&FinalVideo> {
        self.result.as_ref().ok()
    }
}

/// Runs prompts through the standard pipeline.
///
/// Every run gets its own working directory (`<temp_root>/<run_id>`) and
/// output directory (`<output_folder>/<run_id>`), so runs never share
/// intermediate files.
///
/// # Example
///
/// ```ignore
/// let processor = RunProcessor::new(settings, services);
/// let cancel = processor.cancel_handle();
/// let outcome = processor.run(Prompt::new("neon cats", None)?).await;
/// ```
pub struct RunProcessor {
    settings: Settings,
    services: Services,
    cancel: CancelHandle,
}

impl RunProcessor {
    pub fn new(settings: Settings, services: Services) -> Self {
        Self {
            settings,
            services,
            cancel: CancelHandle::new(),
        }
    }

    /// Handle that cancels every run started by this processor.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run(&self, prompt: Prompt) -> RunOutcome {
        self.run_with_callbacks(prompt, RunCallbacks::default()).await
    }

    /// Run one prompt, reporting through `callbacks`.
    pub async fn run_with_callbacks(&self, prompt: Prompt, callbacks: RunCallbacks) -> RunOutcome {
        let run_id = make_run_id(prompt.concept());
        let work_dir = PathBuf::from(&self.settings.paths.temp_root).join(&run_id);
        let output_dir = PathBuf::from(&self.settings.paths.output_folder).join(&run_id);
        let log_dir = PathBuf::from(&self.settings.paths.logs_folder);

        if let Err(e) = std::fs::create_dir_all(&work_dir) {
            return RunOutcome::setup_failure(
                run_id,
                work_dir,
                format!("Failed to create work directory: {}", e),
            );
        }

        let logger = match RunLogger::new(
            &run_id,
            &log_dir,
            LogConfig::from(&self.settings.logging),
            callbacks.log,
        ) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                return RunOutcome::setup_failure(
                    run_id,
                    work_dir,
                    format!("Failed to create logger: {}", e),
                );
            }
        };

        let mut ctx = Context::new(
            prompt.clone(),
            self.settings.clone(),
            &run_id,
            work_dir.clone(),
            output_dir,
            Arc::clone(&logger),
            self.services.clone(),
            self.cancel.child_token(),
        );
        if let Some(callback) = callbacks.progress {
            ctx = ctx.with_progress_callback(callback);
        }
        if let Some(callback) = callbacks.segment {
            ctx = ctx.with_segment_callback(callback);
        }

        let mut state = RunState::new(&run_id, prompt);
        let pipeline = create_standard_pipeline();

        logger.info(&format!("Starting run: {}", run_id));
        logger.info(&format!("Concept: {}", ctx.prompt.concept()));
        logger.info(&format!("Style: {}", ctx.prompt.style_or_default()));
        logger.debug(&format!("Working directory: {}", work_dir.display()));

        let result = match pipeline.run(&ctx, &mut state).await {
            Ok(_) => state.final_video.clone().ok_or_else(|| {
                PipelineError::stage_failed(
                    &run_id,
                    "Assemble",
                    StageError::invalid_output("final video not recorded"),
                )
            }),
            Err(e) => Err(e),
        };

        match &result {
            Ok(video) => {
                logger.success(&format!("Run completed: {}", video.path.display()));
                if !self.settings.paths.keep_intermediates {
                    if let Err(e) = std::fs::remove_dir_all(&work_dir) {
                        logger.warn(&format!(
                            "Could not remove working directory {}: {}",
                            work_dir.display(),
                            e
                        ));
                    }
                }
            }
            Err(e) => {
                logger.error(&format!("Run failed: {}", e));
                logger.show_tail("Recent service output");
                logger.info(&format!(
                    "Working directory preserved at {}",
                    work_dir.display()
                ));
            }
        }

        let log_path = logger.log_path().to_path_buf();
        logger.close();

        RunOutcome {
            run_id,
            work_dir,
            log_path: Some(log_path),
            result,
        }
    }
}

/// Timestamp plus a filesystem-safe slug of the concept.
fn make_run_id(concept: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    format!("{}_{}", timestamp, slugify(concept))
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(RUN_SLUG_MAX);
    let mut last_was_sep = true;

    for c in text.chars() {
        if slug.len() >= RUN_SLUG_MAX {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }

    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "run".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(slugify("Neon Cats, on a Train!"), "neon_cats_on_a_train");
        assert_eq!(slugify("  ***  "), "run");
        assert_eq!(slugify("日本語"), "run");
        assert!(slugify(&"a".repeat(100)).len() <= RUN_SLUG_MAX);
    }

    #[test]
    fn run_ids_carry_the_concept() {
        let id = make_run_id("neon cats");
        assert!(id.ends_with("_neon_cats"));
    }

    #[test]
    fn setup_failure_outcome() {
        let outcome =
            RunOutcome::setup_failure("r".into(), PathBuf::from("/tmp/r"), "nope".into());
        assert!(!outcome.is_success());
        assert!(outcome.final_video().is_none());
        assert!(matches!(outcome.result, Err(PipelineError::SetupFailed { .. })));
    }
}
