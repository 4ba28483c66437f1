use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chart_reflect::config::{MissingBlockPolicy, ScriptErrorPolicy};
use chart_reflect::llm::{ChatModel, ChatRequest, ScriptedModel};
use chart_reflect::{ChartWorkflow, Config, Ctx, RoundId, RoundStatus, RunRequest, StageError};
use tempfile::TempDir;

const CSV: &str = "\
date,coffee_name,money
2024-01-10,Latte,38.7
2024-02-03,Mocha,33.8
2025-01-15,Latte,35.8
2025-03-01,Americano,28.9
";

struct Fixture {
    dir: TempDir,
    dataset: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("coffee_sales.csv");
        std::fs::write(&dataset, CSV).unwrap();
        Self { dir, dataset }
    }

    fn base(&self) -> String {
        self.dir.path().join("chart").display().to_string()
    }

    fn v1(&self) -> PathBuf {
        self.dir.path().join("chart_v1.png")
    }

    fn v2(&self) -> PathBuf {
        self.dir.path().join("chart_v2.png")
    }

    fn request(&self) -> RunRequest {
        RunRequest::new(&self.dataset, "Compare Q1 2024 and Q1 2025 sales by drink")
            .image_basename(self.base())
    }
}

fn block(body: &str) -> String {
    format!("<execute_python>\n{body}\n</execute_python>")
}

fn save_line(path: &Path) -> String {
    format!("save {:?}", path.display().to_string())
}

fn reflection(feedback: &str, code: &str) -> String {
    serde_json::json!({ "feedback": feedback, "refined_code": code }).to_string()
}

#[test]
fn end_to_end_with_placeholder_images() {
    let fx = Fixture::new();
    let v1 = block(&format!("size 1 1\n{}", save_line(&fx.v1())));
    let v2 = block(&format!("size 1 1\nlegend\n{}", save_line(&fx.v2())));
    let model = ScriptedModel::new([v1.clone(), reflection("add legend", &v2)]);
    let log = model.log();
    let mut ctx = Ctx::with_model(model);

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.feedback, "add legend");
    assert_eq!(result.code_v1, v1);
    assert_eq!(result.code_v2, v2);
    assert_eq!(result.status_v1, RoundStatus::Rendered);
    assert_eq!(result.status_v2, RoundStatus::Rendered);
    assert!(fx.v1().exists());
    assert!(fx.v2().exists());
    assert!(result.chart_v1_exists() && result.chart_v2_exists());

    let requests = log.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, "gpt-4o-mini");
    assert!(!requests[0].has_image());
    assert_eq!(requests[1].model, "o4-mini");
    assert!(requests[1].has_image());
    assert!(requests[1].user_text().contains(&v1));
}

#[test]
fn charts_from_real_aggregates() {
    let fx = Fixture::new();
    let v1 = block(&format!(
        "let q1 = df | where quarter == 1\nchart bar\nsize 320 200\nseries \"2024\" q1 | where year == 2024 | sum money by coffee_name\n{}",
        save_line(&fx.v1())
    ));
    let v2 = block(&format!(
        "let q1 = df | where quarter == 1\nchart bar\nsize 320 200\ntitle \"Q1 sales\"\nseries \"2024\" q1 | where year == 2024 | sum money by coffee_name\nseries \"2025\" q1 | where year == 2025 | sum money by coffee_name\nlegend\n{}",
        save_line(&fx.v2())
    ));
    let model = ScriptedModel::new([v1, reflection("compare both years", &v2)]);
    let mut ctx = Ctx::with_model(model);

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.status_v2, RoundStatus::Rendered);
    let img = image::open(fx.v2()).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (320, 200));
}

#[test]
fn missing_block_writes_no_image_and_is_not_an_error() {
    let fx = Fixture::new();
    let model = ScriptedModel::new(["Sorry, I can't plot that."]);
    let log = model.log();
    let mut ctx = Ctx::with_model(model);

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.status_v1, RoundStatus::NoBlock);
    assert_eq!(result.status_v2, RoundStatus::Skipped);
    assert!(result.snippet_v1.is_none());
    assert!(!fx.v1().exists());
    assert!(!fx.v2().exists());
    assert_eq!(log.len(), 1);
}

#[test]
fn image_names_follow_basename() {
    let fx = Fixture::new();
    let mut ctx = Ctx::with_model(ScriptedModel::new(["no code"]));

    let result = ChartWorkflow::new(Config::default())
        .run(
            &mut ctx,
            RunRequest::new(&fx.dataset, "plot sales").image_basename("drink_sales"),
        )
        .unwrap();

    assert_eq!(result.chart_v1, PathBuf::from("drink_sales_v1.png"));
    assert_eq!(result.chart_v2, PathBuf::from("drink_sales_v2.png"));
}

/// Fails the reflection call unless the V1 image is already on disk.
struct OrderCheckingModel {
    v1: PathBuf,
    responses: Mutex<Vec<String>>,
    seen_v1_before_reflection: Arc<Mutex<Option<bool>>>,
}

impl ChatModel for OrderCheckingModel {
    fn complete(&self, request: &ChatRequest) -> Result<String, StageError> {
        if request.has_image() {
            *self.seen_v1_before_reflection.lock().unwrap() = Some(self.v1.exists());
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(StageError::model("out of responses"));
        }
        Ok(responses.remove(0))
    }
}

#[test]
fn reflection_only_sees_a_written_v1() {
    let fx = Fixture::new();
    let seen = Arc::new(Mutex::new(None));
    let model = OrderCheckingModel {
        v1: fx.v1(),
        responses: Mutex::new(vec![
            block(&format!("size 1 1\n{}", save_line(&fx.v1()))),
            reflection("ok", &block(&format!("size 1 1\n{}", save_line(&fx.v2())))),
        ]),
        seen_v1_before_reflection: Arc::clone(&seen),
    };
    let mut ctx = Ctx::with_model(model);

    ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), Some(true));
}

#[test]
fn v1_bindings_are_not_visible_to_v2() {
    let fx = Fixture::new();
    let v1 = block(&format!(
        "let leaked = df | sum money by coffee_name\nsize 1 1\n{}",
        save_line(&fx.v1())
    ));
    let v2 = block(&format!("series \"x\" leaked\n{}", save_line(&fx.v2())));
    let mut ctx = Ctx::with_model(ScriptedModel::new([v1, reflection("reuse it", &v2)]));

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.status_v1, RoundStatus::Rendered);
    match &result.status_v2 {
        RoundStatus::Failed(msg) => assert!(msg.contains("unknown binding `leaked`"), "{msg}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!fx.v2().exists());
}

#[test]
fn script_that_never_saves_skips_reflection() {
    let fx = Fixture::new();
    let model = ScriptedModel::new([block("chart line\ntitle \"draft\"")]);
    let log = model.log();
    let mut ctx = Ctx::with_model(model);

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.status_v1, RoundStatus::NoImage);
    assert_eq!(result.status_v2, RoundStatus::Skipped);
    assert_eq!(log.len(), 1);
}

#[test]
fn prose_reflection_still_yields_v2() {
    let fx = Fixture::new();
    let v1 = block(&format!("size 1 1\n{}", save_line(&fx.v1())));
    let prose = format!(
        "The chart has no title.\n{}",
        block(&format!("size 1 1\ntitle \"Sales\"\n{}", save_line(&fx.v2())))
    );
    let mut ctx = Ctx::with_model(ScriptedModel::new([v1, prose.clone()]));

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.feedback, "The chart has no title.");
    assert_eq!(result.code_v2, prose);
    assert_eq!(result.status_v2, RoundStatus::Rendered);
}

#[test]
fn missing_block_aborts_when_configured() {
    let fx = Fixture::new();
    let mut config = Config::default();
    config.workflow.on_missing_block = MissingBlockPolicy::Abort;
    let mut ctx = Ctx::with_model(ScriptedModel::new(["no code"]));

    let err = ChartWorkflow::new(config)
        .run(&mut ctx, fx.request())
        .unwrap_err();

    assert!(matches!(err, StageError::MissingBlock(RoundId::V1)));
}

#[test]
fn script_error_aborts_when_configured() {
    let fx = Fixture::new();
    let mut config = Config::default();
    config.workflow.on_script_error = ScriptErrorPolicy::Abort;
    let mut ctx = Ctx::with_model(ScriptedModel::new([block("save \"/tmp/elsewhere.png\"")]));

    let err = ChartWorkflow::new(config)
        .run(&mut ctx, fx.request())
        .unwrap_err();

    assert!(matches!(err, StageError::Script { round: RoundId::V1, .. }));
    assert!(!fx.v1().exists());
}

#[test]
fn missing_dataset_is_fatal_before_any_model_call() {
    let fx = Fixture::new();
    let model = ScriptedModel::new(Vec::<String>::new());
    let log = model.log();
    let mut ctx = Ctx::with_model(model);

    let err = ChartWorkflow::new(Config::default())
        .run(
            &mut ctx,
            RunRequest::new(fx.dir.path().join("missing.csv"), "plot it"),
        )
        .unwrap_err();

    assert!(matches!(err, StageError::Dataset(_)));
    assert!(log.is_empty());
}

#[test]
fn model_failure_is_fatal() {
    let fx = Fixture::new();
    let mut ctx = Ctx::with_model(ScriptedModel::new(Vec::<String>::new()));

    let err = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap_err();

    assert!(err.is_model());
}

#[test]
fn run_log_records_each_stage() {
    let fx = Fixture::new();
    let v1 = block(&format!("size 1 1\n{}", save_line(&fx.v1())));
    let v2 = block(&format!("size 1 1\n{}", save_line(&fx.v2())));
    let mut ctx = Ctx::with_model(ScriptedModel::new([v1, reflection("fine", &v2)]));

    ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    let logs = ctx.logs().join("\n");
    for stage in ["load_dataset", "generate_v1", "execute_v1", "reflect_v1", "execute_v2"] {
        assert!(logs.contains(stage), "missing {stage} in:\n{logs}");
    }
    assert!(logs.contains("load_dataset: sample: 2024-01-10, Latte, 38.7"), "{logs}");
}

#[test]
fn failing_line_after_save_leaves_no_image() {
    let fx = Fixture::new();
    let v1 = block(&format!("size 1 1\n{}\nseries \"s\" nope", save_line(&fx.v1())));
    let model = ScriptedModel::new([v1]);
    let log = model.log();
    let mut ctx = Ctx::with_model(model);

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert!(matches!(result.status_v1, RoundStatus::Failed(_)));
    assert_eq!(result.status_v2, RoundStatus::Skipped);
    assert!(!fx.v1().exists());
    assert!(!result.chart_v1_exists());
    assert_eq!(log.len(), 1);
}

#[test]
fn images_from_an_earlier_run_are_removed() {
    let fx = Fixture::new();
    std::fs::write(fx.v1(), b"old v1").unwrap();
    std::fs::write(fx.v2(), b"old v2").unwrap();
    let mut ctx = Ctx::with_model(ScriptedModel::new(["no chart this time"]));

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.status_v1, RoundStatus::NoBlock);
    assert_eq!(result.status_v2, RoundStatus::Skipped);
    assert!(!fx.v1().exists());
    assert!(!fx.v2().exists());
}

#[test]
fn failed_v2_does_not_keep_an_earlier_v2() {
    let fx = Fixture::new();
    std::fs::write(fx.v2(), b"old v2").unwrap();
    let v1 = block(&format!("size 1 1\n{}", save_line(&fx.v1())));
    let v2 = block(&format!("size 1 1\n{}\nseries \"s\" nope", save_line(&fx.v2())));
    let mut ctx = Ctx::with_model(ScriptedModel::new([v1, reflection("retry", &v2)]));

    let result = ChartWorkflow::new(Config::default())
        .run(&mut ctx, fx.request())
        .unwrap();

    assert_eq!(result.status_v1, RoundStatus::Rendered);
    assert!(matches!(result.status_v2, RoundStatus::Failed(_)));
    assert!(!fx.v2().exists());
}
