//! Reflective chart generation.
//!
//! A generation model writes a chart script, a sandbox renders it to V1, a
//! reflection model looks at the V1 image and writes a better script, and
//! the sandbox renders that to V2. [`ChartWorkflow`] runs the whole thing.
//!
//! The workflow is built from small pieces that are usable on their own:
//! [`Stage`]s wired into a [`Pipeline`] and driven by a [`Runner`], sharing
//! a [`Ctx`] that carries the chat model and a run log.
//!
//! # Quick start
//!
//! ```rust
//! use chart_reflect::{Ctx, Outcome, Pipeline, Runner, Stage, StageResult};
//!
//! #[derive(Clone)]
//! struct State { n: i32 }
//!
//! struct AddOne;
//! impl Stage<State> for AddOne {
//!     fn name(&self) -> &'static str { "add_one" }
//!     fn run(&mut self, state: State, _ctx: &mut Ctx) -> StageResult<State> {
//!         Ok((State { n: state.n + 1 }, Outcome::Done))
//!     }
//! }
//!
//! let mut ctx = Ctx::new();
//! let pipeline = Pipeline::builder("demo")
//!     .register(AddOne)
//!     .build()
//!     .unwrap();
//!
//! let result = Runner::new(pipeline).run(State { n: 0 }, &mut ctx).unwrap();
//! assert_eq!(result.n, 1);
//! ```

mod ctx;
mod error;
mod pipeline;
mod runner;
mod stage;

pub mod chartgen;
pub mod config;
pub mod dataset;
pub mod extract;
pub mod llm;
pub mod render;
pub mod script;

pub use chartgen::{ChartWorkflow, RoundStatus, RunRequest, RunResult};
pub use config::Config;
pub use ctx::Ctx;
pub use error::{RoundId, StageError};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError};
pub use runner::{ErrorEvent, Runner, StepEvent};
pub use stage::{Outcome, Stage, StageResult};
