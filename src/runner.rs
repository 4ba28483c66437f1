use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::{Ctx, Outcome, Pipeline, StageError};

/// Passed to the `on_step` hook after each successful stage.
pub struct StepEvent<'a> {
    pub stage: &'a str,
    pub outcome: &'a Outcome,
    pub duration: Duration,
    pub step_number: usize,
}

/// Passed to the `on_error` hook when a stage errors or a limit is exceeded.
pub struct ErrorEvent<'a> {
    pub stage: &'a str,
    pub error: &'a StageError,
    pub step_number: usize,
}

pub struct Runner<S: Clone + 'static> {
    pipeline: Pipeline<S>,
    max_steps: usize,
    on_step: Option<Box<dyn FnMut(&StepEvent)>>,
    on_error: Option<Box<dyn FnMut(&ErrorEvent)>>,
}

impl<S: Clone + 'static> Runner<S> {
    pub fn new(pipeline: Pipeline<S>) -> Self {
        Self {
            pipeline,
            max_steps: 1_000,
            on_step: None,
            on_error: None,
        }
    }

    /// Prevent accidental infinite loops.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Register a callback that fires after each successful stage.
    pub fn on_step(mut self, cb: impl FnMut(&StepEvent) + 'static) -> Self {
        self.on_step = Some(Box::new(cb));
        self
    }

    /// Register a callback that fires when a stage errors or a limit is exceeded.
    pub fn on_error(mut self, cb: impl FnMut(&ErrorEvent) + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Set both hooks to emit `tracing` events for transitions and errors.
    pub fn with_tracing(self) -> Self {
        let pipeline = self.pipeline.name();
        self.on_step(move |e| {
            info!(
                pipeline,
                step = e.step_number,
                stage = e.stage,
                outcome = ?e.outcome,
                secs = e.duration.as_secs_f64(),
                "stage finished"
            );
        })
        .on_error(move |e| {
            error!(pipeline, step = e.step_number, stage = e.stage, error = %e.error, "stage failed");
        })
    }

    fn report(&mut self, stage: &str, error: &StageError, step_number: usize) {
        if let Some(cb) = &mut self.on_error {
            cb(&ErrorEvent {
                stage,
                error,
                step_number,
            });
        }
    }

    pub fn run(&mut self, mut state: S, ctx: &mut Ctx) -> Result<S, StageError> {
        let mut current = self.pipeline.start();
        let mut step_number: usize = 0;

        for _ in 0..self.max_steps {
            step_number += 1;

            let stage = self
                .pipeline
                .stage_mut(current)
                .ok_or_else(|| StageError::invalid(format!("unknown stage: {current}")))?;

            let start = Instant::now();
            let result = stage.run(state, ctx);
            let duration = start.elapsed();

            let (next_state, outcome) = match result {
                Ok(ok) => ok,
                Err(err) => {
                    self.report(current, &err, step_number);
                    return Err(err);
                }
            };

            if let Some(cb) = &mut self.on_step {
                cb(&StepEvent {
                    stage: current,
                    outcome: &outcome,
                    duration,
                    step_number,
                });
            }

            state = next_state;

            match outcome {
                Outcome::Done => return Ok(state),
                Outcome::Next(stage) => current = stage,
                Outcome::Continue => {
                    let Some(next) = self.pipeline.default_next(current) else {
                        return Err(StageError::invalid(format!(
                            "stage '{current}' returned Continue but no default next stage is configured"
                        )));
                    };
                    current = next;
                }
            }
        }

        let err = StageError::invalid(format!(
            "max_steps exceeded (possible infinite loop) in pipeline {}",
            self.pipeline.name()
        ));
        self.report(current, &err, step_number);
        Err(err)
    }
}
