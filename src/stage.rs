use crate::ctx::Ctx;
use crate::error::StageError;

/// The result of running a stage: a new state plus what to do next.
pub type StageResult<S> = Result<(S, Outcome), StageError>;

/// A sync stage that transforms pipeline state one step at a time.
///
/// Implement this trait on your own structs and register them into a
/// [`crate::Pipeline`].
pub trait Stage<S>: Send + 'static {
    /// A unique name for this stage, used for routing with [`Outcome::Next`].
    fn name(&self) -> &'static str;

    /// Run one step. Returns the updated state and an [`Outcome`] that tells
    /// the runner what to do next.
    fn run(&mut self, state: S, ctx: &mut Ctx) -> StageResult<S>;
}

/// Control flow for the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Follow the pipeline's default next stage (set via `.then()`).
    Continue,
    /// Pipeline complete, return the final state.
    Done,
    /// Jump to a specific stage by name.
    Next(&'static str),
}
