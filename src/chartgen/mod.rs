//! The reflective chart workflow.
//!
//! Five stages run in order on one [`Pipeline`]:
//!
//! 1. `load_dataset` reads and prepares the CSV.
//! 2. `generate_v1` asks the generation model for a chart script.
//! 3. `execute_v1` runs it in the sandbox, producing `<base>_v1.<ext>`.
//! 4. `reflect_v1` shows the V1 image to the reflection model and collects
//!    feedback plus a refined script.
//! 5. `execute_v2` runs the refined script, producing `<base>_v2.<ext>`.
//!
//! If V1 does not render, the run stops after step 3 and V2 is marked
//! [`RoundStatus::Skipped`].

mod prompts;
mod stages;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

pub use prompts::LANGUAGE_GUIDE;
pub use stages::parse_reflection;

use crate::config::Config;
use crate::dataset::Frame;
use crate::error::RoundId;
use crate::{Ctx, Pipeline, Runner, StageError};
use stages::{ExecuteRound, GenerateChart, LoadDataset, Reflect, SkipReflection};

/// Where the two rounds write their images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePaths {
    pub v1: PathBuf,
    pub v2: PathBuf,
}

impl ImagePaths {
    /// `<base>_v1.<ext>` and `<base>_v2.<ext>`.
    pub fn from_basename(base: &str, ext: &str) -> Self {
        let path = |round: RoundId| PathBuf::from(format!("{base}_{}.{ext}", round.suffix()));
        Self {
            v1: path(RoundId::V1),
            v2: path(RoundId::V2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub dataset_path: PathBuf,
    pub instructions: String,
    pub generation_model: String,
    pub reflection_model: String,
    pub image_basename: String,
}

impl RunRequest {
    pub fn new(dataset_path: impl Into<PathBuf>, instructions: impl Into<String>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            instructions: instructions.into(),
            generation_model: "gpt-4o-mini".into(),
            reflection_model: "o4-mini".into(),
            image_basename: "chart".into(),
        }
    }

    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }

    pub fn reflection_model(mut self, model: impl Into<String>) -> Self {
        self.reflection_model = model.into();
        self
    }

    pub fn image_basename(mut self, base: impl Into<String>) -> Self {
        self.image_basename = base.into();
        self
    }
}

/// How a round ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RoundStatus {
    #[default]
    Pending,
    Rendered,
    /// The response carried no delimited block.
    NoBlock,
    /// The script ran but never saved.
    NoImage,
    Failed(String),
    /// Not attempted because V1 did not render.
    Skipped,
}

/// One generation round: model output, extracted script, target image.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub response: String,
    pub snippet: Option<String>,
    pub image: PathBuf,
    pub status: RoundStatus,
}

impl Round {
    pub fn new(image: PathBuf) -> Self {
        Self {
            response: String::new(),
            snippet: None,
            image,
            status: RoundStatus::Pending,
        }
    }
}

/// State threaded through the stages.
#[derive(Debug, Clone)]
pub struct ChartState {
    pub request: RunRequest,
    pub frame: Option<Arc<Frame>>,
    pub v1: Round,
    pub feedback: String,
    pub v2: Round,
}

impl ChartState {
    pub fn new(request: RunRequest, paths: ImagePaths) -> Self {
        Self {
            request,
            frame: None,
            v1: Round::new(paths.v1),
            feedback: String::new(),
            v2: Round::new(paths.v2),
        }
    }

    fn frame(&self) -> Result<&Arc<Frame>, StageError> {
        self.frame
            .as_ref()
            .ok_or_else(|| StageError::invalid("dataset not loaded"))
    }

    fn round_mut(&mut self, id: RoundId) -> &mut Round {
        match id {
            RoundId::V1 => &mut self.v1,
            RoundId::V2 => &mut self.v2,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    /// Raw V1 response.
    pub code_v1: String,
    pub snippet_v1: Option<String>,
    pub chart_v1: PathBuf,
    pub status_v1: RoundStatus,
    pub feedback: String,
    /// Raw V2 code: the `refined_code` field, or the whole reflection answer.
    pub code_v2: String,
    pub snippet_v2: Option<String>,
    pub chart_v2: PathBuf,
    pub status_v2: RoundStatus,
}

impl From<ChartState> for RunResult {
    fn from(state: ChartState) -> Self {
        Self {
            code_v1: state.v1.response,
            snippet_v1: state.v1.snippet,
            chart_v1: state.v1.image,
            status_v1: state.v1.status,
            feedback: state.feedback,
            code_v2: state.v2.response,
            snippet_v2: state.v2.snippet,
            chart_v2: state.v2.image,
            status_v2: state.v2.status,
        }
    }
}

impl RunResult {
    pub fn chart_v1_exists(&self) -> bool {
        self.status_v1 == RoundStatus::Rendered && self.chart_v1.exists()
    }

    pub fn chart_v2_exists(&self) -> bool {
        self.status_v2 == RoundStatus::Rendered && self.chart_v2.exists()
    }
}

/// Generate, render, critique and regenerate a chart.
///
/// ```no_run
/// use chart_reflect::{ChartWorkflow, Config, Ctx, RunRequest};
/// use chart_reflect::llm::OpenAiClient;
///
/// let config = Config::load(None)?;
/// let client = OpenAiClient::from_config(&config.llm);
/// let mut ctx = Ctx::with_model(client);
///
/// let request = RunRequest::new("coffee_sales.csv", "Compare Q1 2024 and Q1 2025 sales by drink")
///     .image_basename("drink_sales");
/// let result = ChartWorkflow::new(config).run(&mut ctx, request)?;
/// println!("{}", result.feedback);
/// # Ok::<(), chart_reflect::StageError>(())
/// ```
pub struct ChartWorkflow {
    config: Config,
}

impl ChartWorkflow {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The five-stage pipeline this workflow runs.
    pub fn pipeline(&self) -> Result<Pipeline<ChartState>, StageError> {
        let workflow = &self.config.workflow;
        let render = self.config.render;
        let pipeline = Pipeline::builder("chart_reflect")
            .register(LoadDataset)
            .register(GenerateChart {
                config: workflow.clone(),
            })
            .register(ExecuteRound {
                round: RoundId::V1,
                config: workflow.clone(),
                render,
            })
            .register(Reflect {
                config: workflow.clone(),
            })
            .register(ExecuteRound {
                round: RoundId::V2,
                config: workflow.clone(),
                render,
            })
            .register(SkipReflection)
            .start_at("load_dataset")
            .then("generate_v1")
            .then("execute_v1")
            .then("reflect_v1")
            .then("execute_v2")
            .build()?;
        Ok(pipeline)
    }

    pub fn run(&self, ctx: &mut Ctx, request: RunRequest) -> Result<RunResult, StageError> {
        if request.instructions.trim().is_empty() {
            return Err(StageError::invalid("instructions are empty"));
        }
        let paths = ImagePaths::from_basename(&request.image_basename, &self.config.workflow.image_ext);
        let state = ChartState::new(request, paths);
        let state = Runner::new(self.pipeline()?)
            .with_tracing()
            .run(state, ctx)?;
        Ok(state.into())
    }
}
