use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::prompts::{
    GENERATE_SYSTEM, REFLECT_SYSTEM, generation_prompt, reflection_prompt,
};
use super::{ChartState, Round, RoundStatus};
use crate::config::{MissingBlockPolicy, RenderConfig, ScriptErrorPolicy, WorkflowConfig};
use crate::dataset;
use crate::error::RoundId;
use crate::extract::{extract_block, extract_json, strip_block};
use crate::script::Sandbox;
use crate::{Ctx, Outcome, Stage, StageError, StageResult};

// ---------------------------------------------------------------------------
// load_dataset
// ---------------------------------------------------------------------------

const SAMPLE_ROWS: usize = 5;

pub struct LoadDataset;

impl Stage<ChartState> for LoadDataset {
    fn name(&self) -> &'static str {
        "load_dataset"
    }

    fn run(&mut self, mut state: ChartState, ctx: &mut Ctx) -> StageResult<ChartState> {
        let path = state.request.dataset_path.clone();
        let frame = dataset::load_and_prepare(&path)?;
        info!(path = %path.display(), rows = frame.len(), columns = frame.columns().len(), "dataset loaded");
        ctx.log(format!(
            "load_dataset: {} rows, columns: {}",
            frame.len(),
            frame.columns().join(", ")
        ));
        for row in frame.sample_rows(SAMPLE_ROWS) {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            ctx.log(format!("load_dataset: sample: {}", cells.join(", ")));
        }
        state.frame = Some(Arc::new(frame));
        Ok((state, Outcome::Continue))
    }
}

// ---------------------------------------------------------------------------
// generate_v1
// ---------------------------------------------------------------------------

pub struct GenerateChart {
    pub config: WorkflowConfig,
}

impl Stage<ChartState> for GenerateChart {
    fn name(&self) -> &'static str {
        "generate_v1"
    }

    fn run(&mut self, mut state: ChartState, ctx: &mut Ctx) -> StageResult<ChartState> {
        let schema = state.frame()?.schema_summary();
        let prompt = generation_prompt(
            &state.request.instructions,
            &schema,
            &state.v1.image,
            &self.config,
        );
        debug!(model = %state.request.generation_model, %prompt, "generation prompt");

        let response = ctx
            .llm()
            .model(&state.request.generation_model)
            .system(GENERATE_SYSTEM)
            .user(prompt)
            .send()?;
        debug!(%response, "generation response");
        ctx.log(format!(
            "generate_v1: {} answered ({} chars)",
            state.request.generation_model,
            response.len()
        ));

        accept_response(&mut state.v1, response, RoundId::V1, &self.config, ctx)?;
        Ok((state, Outcome::Continue))
    }
}

// ---------------------------------------------------------------------------
// execute_v1 / execute_v2
// ---------------------------------------------------------------------------

pub struct ExecuteRound {
    pub round: RoundId,
    pub config: WorkflowConfig,
    pub render: RenderConfig,
}

impl Stage<ChartState> for ExecuteRound {
    fn name(&self) -> &'static str {
        match self.round {
            RoundId::V1 => "execute_v1",
            RoundId::V2 => "execute_v2",
        }
    }

    fn run(&mut self, mut state: ChartState, ctx: &mut Ctx) -> StageResult<ChartState> {
        let frame = Arc::clone(state.frame()?);
        let round = state.round_mut(self.round);
        discard_image(&round.image)?;

        if let Some(code) = round.snippet.as_deref() {
            let sandbox = Sandbox::new(frame, self.render);
            round.status = match sandbox.run(code, &round.image) {
                Ok(exec) if exec.saved.is_some() && round.image.exists() => {
                    info!(round = %self.round, path = %round.image.display(), "chart rendered");
                    ctx.log(format!(
                        "{}: rendered {}",
                        self.name(),
                        round.image.display()
                    ));
                    RoundStatus::Rendered
                }
                Ok(_) => {
                    warn!(round = %self.round, "script finished without saving a chart");
                    ctx.log(format!("{}: script saved no image", self.name()));
                    RoundStatus::NoImage
                }
                Err(e) => {
                    warn!(round = %self.round, error = %e, "chart script failed");
                    ctx.log(format!("{}: script failed: {e}", self.name()));
                    discard_image(&round.image)?;
                    if self.config.on_script_error == ScriptErrorPolicy::Abort {
                        return Err(StageError::Script {
                            round: self.round,
                            message: e.to_string(),
                        });
                    }
                    RoundStatus::Failed(e.to_string())
                }
            };
        }

        match self.round {
            RoundId::V1 if state.v1.status != RoundStatus::Rendered => {
                Ok((state, Outcome::Next("skip_v2")))
            }
            RoundId::V1 => Ok((state, Outcome::Continue)),
            RoundId::V2 => Ok((state, Outcome::Done)),
        }
    }
}

// ---------------------------------------------------------------------------
// skip_v2
// ---------------------------------------------------------------------------

/// Reached instead of `reflect_v1` when V1 produced no chart.
pub struct SkipReflection;

impl Stage<ChartState> for SkipReflection {
    fn name(&self) -> &'static str {
        "skip_v2"
    }

    fn run(&mut self, mut state: ChartState, ctx: &mut Ctx) -> StageResult<ChartState> {
        info!(v1 = ?state.v1.status, "V1 did not render, skipping reflection");
        ctx.log("reflect_v1: skipped, no V1 chart to critique");
        discard_image(&state.v2.image)?;
        state.v2.status = RoundStatus::Skipped;
        Ok((state, Outcome::Done))
    }
}

/// Remove an image left at `path` by an earlier run.
fn discard_image(path: &Path) -> Result<(), StageError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale image");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// reflect_v1
// ---------------------------------------------------------------------------

pub struct Reflect {
    pub config: WorkflowConfig,
}

impl Stage<ChartState> for Reflect {
    fn name(&self) -> &'static str {
        "reflect_v1"
    }

    fn run(&mut self, mut state: ChartState, ctx: &mut Ctx) -> StageResult<ChartState> {
        if state.v1.status != RoundStatus::Rendered {
            return Err(StageError::invalid(
                "reflection requires a rendered V1 chart",
            ));
        }
        let png = std::fs::read(&state.v1.image)?;
        let schema = state.frame()?.schema_summary();
        let prompt = reflection_prompt(
            &state.request.instructions,
            &state.v1.response,
            &schema,
            &state.v2.image,
            &self.config,
        );
        debug!(model = %state.request.reflection_model, %prompt, bytes = png.len(), "reflection prompt");

        let response = ctx
            .llm()
            .model(&state.request.reflection_model)
            .system(REFLECT_SYSTEM)
            .user(prompt)
            .image_png(&png)
            .send()?;
        debug!(%response, "reflection response");

        let (feedback, code) = parse_reflection(&response, &self.config);
        ctx.log(format!("reflect_v1: feedback: {feedback}"));
        state.feedback = feedback;

        accept_response(&mut state.v2, code, RoundId::V2, &self.config, ctx)?;
        Ok((state, Outcome::Continue))
    }
}

/// Split a reflection answer into feedback and V2 code.
///
/// The expected shape is `{"feedback": ..., "refined_code": ...}`. Anything
/// else is read as prose: the feedback is the text around the block and the
/// whole answer is kept as the code.
pub fn parse_reflection(response: &str, config: &WorkflowConfig) -> (String, String) {
    if let Some(json) = extract_json(response)
        && let Some(code) = json.get("refined_code").and_then(|v| v.as_str())
    {
        let feedback = json
            .get("feedback")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        return (feedback, code.to_string());
    }
    let feedback = strip_block(response, &config.block_start, &config.block_end);
    (feedback, response.to_string())
}

/// Store a model response on `round` and pull out its block.
fn accept_response(
    round: &mut Round,
    response: String,
    id: RoundId,
    config: &WorkflowConfig,
    ctx: &mut Ctx,
) -> Result<(), StageError> {
    round.snippet = extract_block(&response, &config.block_start, &config.block_end)
        .map(str::to_string);
    round.response = response;

    if round.snippet.is_none() {
        warn!(round = %id, "response has no {} block", config.block_start);
        ctx.log(format!("{id}: no {} block in response", config.block_start));
        if config.on_missing_block == MissingBlockPolicy::Abort {
            return Err(StageError::MissingBlock(id));
        }
        round.status = RoundStatus::NoBlock;
    }
    Ok(())
}
