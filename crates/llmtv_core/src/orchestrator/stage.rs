//! Pipeline stage trait definition.

use async_trait::async_trait;

use super::errors::StageResult;
use super::types::{Context, RunState};

/// One step of the generation pipeline.
///
/// The pipeline calls, in order:
///
/// 1. `validate_input` - the artifacts this stage consumes are present
/// 2. `execute` - call the collaborator and record the artifact in `state`
/// 3. `validate_output` - the recorded artifact is usable by the next stage
///
/// Stages never skip. Each stage's output is the next stage's required
/// input, so a stage that cannot produce it fails the run.
///
/// # Example
///
/// ```ignore
/// struct AlignStage;
///
/// #[async_trait]
/// impl PipelineStage for AlignStage {
///     fn name(&self) -> &str { "Align" }
///
///     fn validate_input(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
///         state.require_audio().map(|_| ())
///     }
///
///     async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()> {
///         let segments = align(state.require_audio()?.duration_secs, 8.0)?;
///         state.record_segments(segments)
///     }
///
///     fn validate_output(&self, _ctx: &Context, state: &RunState) -> StageResult<()> {
///         state.require_segments().map(|_| ())
///     }
/// }
/// ```
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name, used in logs and in stage-tagged errors.
    fn name(&self) -> &str;

    /// Check preconditions before execution.
    fn validate_input(&self, ctx: &Context, state: &RunState) -> StageResult<()>;

    /// Perform the stage's work and record the result in `state`.
    async fn execute(&self, ctx: &Context, state: &mut RunState) -> StageResult<()>;

    /// Verify the recorded output after execution.
    fn validate_output(&self, ctx: &Context, state: &RunState) -> StageResult<()>;

    /// Human-readable description of what this stage does.
    fn description(&self) -> &str {
        self.name()
    }
}
