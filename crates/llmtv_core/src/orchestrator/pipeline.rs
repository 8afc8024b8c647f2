//! Pipeline runner that executes stages in sequence.

use tokio_util::sync::CancellationToken;

use super::errors::{PipelineError, PipelineResult};
use super::stage::PipelineStage;
use super::types::{Context, RunState};

/// Pipeline that runs a sequence of stages.
///
/// Stages run strictly in order with validation before and after each.
/// Cancellation is checked at every stage boundary; a stage that is
/// interrupted mid-flight reports the run as cancelled rather than failed.
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn add_stage<S: PipelineStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Add a stage (builder pattern).
    pub fn with_stage<S: PipelineStage + 'static>(mut self, stage: S) -> Self {
        self.add_stage(stage);
        self
    }

    /// Run every stage against `state`.
    ///
    /// After each completed stage the state is written to
    /// `<work_dir>/run_state.json`; a failed snapshot is only logged.
    pub async fn run(&self, ctx: &Context, state: &mut RunState) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            stages_completed: Vec::new(),
        };

        let total_stages = self.stages.len().max(1);

        for (i, stage) in self.stages.iter().enumerate() {
            let stage_name = stage.name();

            if ctx.is_cancelled() {
                ctx.logger
                    .warn(&format!("Pipeline cancelled before stage '{}'", stage_name));
                return Err(PipelineError::cancelled(&ctx.run_name));
            }

            ctx.logger.stage(stage_name);

            let percent = ((i as f64 / total_stages as f64) * 100.0) as u32;
            ctx.report_progress(stage_name, percent, stage.description());

            ctx.logger
                .debug(&format!("Validating input for '{}'", stage_name));
            if let Err(e) = stage.validate_input(ctx, state) {
                ctx.logger.error(&format!("Input validation failed: {}", e));
                return Err(PipelineError::stage_failed(&ctx.run_name, stage_name, e));
            }

            if let Err(e) = stage.execute(ctx, state).await {
                if e.is_cancelled() {
                    ctx.logger
                        .warn(&format!("Pipeline cancelled during stage '{}'", stage_name));
                    return Err(PipelineError::cancelled(&ctx.run_name));
                }
                ctx.logger.error(&format!("{} failed: {}", stage_name, e));
                return Err(PipelineError::stage_failed(&ctx.run_name, stage_name, e));
            }

            if let Err(e) = stage.validate_output(ctx, state) {
                ctx.logger.error(&format!("Output validation failed: {}", e));
                return Err(PipelineError::stage_failed(&ctx.run_name, stage_name, e));
            }

            if let Err(e) = state.save(&ctx.state_path()) {
                ctx.logger.warn(&format!("Could not write run state: {}", e));
            }

            ctx.logger.success(&format!("{} completed", stage_name));
            result.stages_completed.push(stage_name.to_string());
        }

        ctx.report_progress("Complete", 100, "Pipeline finished");
        ctx.logger.success("Pipeline completed successfully");

        Ok(result)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage names in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for cancelling a running pipeline.
///
/// Cancelling stops new external requests at once and abandons in-flight
/// waits; the pipeline then stops at the current stage.
#[derive(Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for a single run; cancelled whenever this handle is.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    pub stages_completed: Vec<String>,
}
