use std::collections::HashMap;

use crate::{Stage, StageError};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("duplicate stage name: {0}")]
    DuplicateStage(&'static str),
    #[error("unknown stage: {0}")]
    UnknownStage(&'static str),
    #[error("pipeline missing start stage")]
    MissingStart,
}

impl From<PipelineError> for StageError {
    fn from(e: PipelineError) -> Self {
        StageError::Invalid(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// PipelineBuilder
// ---------------------------------------------------------------------------

pub struct PipelineBuilder<S: Clone + 'static> {
    name: &'static str,
    start: Option<&'static str>,
    chain_last: Option<&'static str>,
    stages: HashMap<&'static str, Box<dyn Stage<S>>>,
    default_next: HashMap<&'static str, &'static str>,
    duplicate: Option<&'static str>,
}

impl<S: Clone + 'static> PipelineBuilder<S> {
    pub fn register<T: Stage<S>>(mut self, stage: T) -> Self {
        let name = stage.name();
        if self.stages.contains_key(name) {
            self.duplicate.get_or_insert(name);
        }
        self.stages.insert(name, Box::new(stage));

        if self.start.is_none() {
            self.start = Some(name);
        }
        if self.chain_last.is_none() {
            self.chain_last = Some(name);
        }

        self
    }

    pub fn start_at(mut self, stage: &'static str) -> Self {
        self.start = Some(stage);
        self.chain_last = Some(stage);
        self
    }

    /// Chain the next stage: current(chain_last) -> next
    pub fn then(mut self, next: &'static str) -> Self {
        let Some(current) = self.chain_last else {
            self.start = Some(next);
            self.chain_last = Some(next);
            return self;
        };

        self.default_next.insert(current, next);
        self.chain_last = Some(next);
        self
    }

    pub fn build(self) -> Result<Pipeline<S>, PipelineError> {
        if let Some(name) = self.duplicate {
            return Err(PipelineError::DuplicateStage(name));
        }

        let start = self.start.ok_or(PipelineError::MissingStart)?;
        if !self.stages.contains_key(start) {
            return Err(PipelineError::UnknownStage(start));
        }

        for &target in self.default_next.values() {
            if !self.stages.contains_key(target) {
                return Err(PipelineError::UnknownStage(target));
            }
        }

        Ok(Pipeline {
            name: self.name,
            start,
            stages: self.stages,
            default_next: self.default_next,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline (validated, only constructed via build())
// ---------------------------------------------------------------------------

pub struct Pipeline<S: Clone + 'static> {
    name: &'static str,
    start: &'static str,
    stages: HashMap<&'static str, Box<dyn Stage<S>>>,
    default_next: HashMap<&'static str, &'static str>,
}

impl<S: Clone + 'static> Pipeline<S> {
    pub fn builder(name: &'static str) -> PipelineBuilder<S> {
        PipelineBuilder {
            name,
            start: None,
            chain_last: None,
            stages: HashMap::new(),
            default_next: HashMap::new(),
            duplicate: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // --- used by the runner ---
    pub(crate) fn start(&self) -> &'static str {
        self.start
    }

    pub(crate) fn stage_mut(&mut self, name: &'static str) -> Option<&mut Box<dyn Stage<S>>> {
        self.stages.get_mut(name)
    }

    pub(crate) fn default_next(&self, from: &'static str) -> Option<&'static str> {
        self.default_next.get(from).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ctx, Outcome, StageResult};

    #[derive(Clone)]
    struct S;

    struct FakeStage(&'static str);

    impl Stage<S> for FakeStage {
        fn name(&self) -> &'static str {
            self.0
        }
        fn run(&mut self, state: S, _ctx: &mut Ctx) -> StageResult<S> {
            Ok((state, Outcome::Done))
        }
    }

    #[test]
    fn build_valid_pipeline() {
        let p = Pipeline::builder("test")
            .register(FakeStage("a"))
            .register(FakeStage("b"))
            .start_at("a")
            .then("b")
            .build()
            .unwrap();

        assert_eq!(p.name(), "test");
        assert_eq!(p.start(), "a");
        assert_eq!(p.default_next("a"), Some("b"));
    }

    #[test]
    fn chain_and_side_stage() {
        let p = Pipeline::builder("chart")
            .register(FakeStage("load"))
            .register(FakeStage("execute"))
            .register(FakeStage("skip"))
            .register(FakeStage("reflect"))
            .start_at("load")
            .then("execute")
            .then("reflect")
            .build()
            .unwrap();

        assert_eq!(p.start(), "load");
        assert_eq!(p.default_next("load"), Some("execute"));
        assert_eq!(p.default_next("execute"), Some("reflect"));
        assert_eq!(p.default_next("reflect"), None);
        assert_eq!(p.default_next("skip"), None);
    }

    #[test]
    fn missing_start_on_empty_builder() {
        let err = Pipeline::<S>::builder("test").build().err().unwrap();
        assert!(matches!(err, PipelineError::MissingStart));
    }

    #[test]
    fn unknown_start_at_stage() {
        let err = Pipeline::builder("test")
            .register(FakeStage("a"))
            .start_at("missing")
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, PipelineError::UnknownStage("missing")));
    }

    #[test]
    fn unknown_then_target() {
        let err = Pipeline::builder("test")
            .register(FakeStage("a"))
            .start_at("a")
            .then("missing")
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, PipelineError::UnknownStage("missing")));
    }

    #[test]
    fn duplicate_stage_rejected() {
        let err = Pipeline::builder("test")
            .register(FakeStage("a"))
            .register(FakeStage("a"))
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, PipelineError::DuplicateStage("a")));
        assert_eq!(err.to_string(), "duplicate stage name: a");
    }
}
