//! `chart-reflect`: generate a chart, critique it, regenerate it.

use std::path::PathBuf;
use std::process::ExitCode;

use chart_reflect::llm::OpenAiClient;
use chart_reflect::{ChartWorkflow, Config, Ctx, RunRequest, RunResult, StageError};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chart-reflect", version, about)]
struct Cli {
    /// CSV file to chart.
    #[arg(long)]
    dataset: PathBuf,

    /// What the chart should show.
    #[arg(long)]
    instruction: String,

    #[arg(long, default_value = "gpt-4o-mini")]
    generation_model: String,

    #[arg(long, default_value = "o4-mini")]
    reflection_model: String,

    /// Images are written to `<base>_v1.<ext>` and `<base>_v2.<ext>`.
    #[arg(long, default_value = "chart")]
    image_basename: String,

    /// Optional TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the result as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), StageError> {
    let config = Config::load(cli.config.as_deref())?;
    let client = OpenAiClient::from_config(&config.llm);
    let mut ctx = Ctx::with_model(client).with_max_tokens(config.llm.max_tokens);

    let request = RunRequest::new(cli.dataset, cli.instruction)
        .generation_model(cli.generation_model)
        .reflection_model(cli.reflection_model)
        .image_basename(cli.image_basename);

    let result = ChartWorkflow::new(config).run(&mut ctx, request)?;

    if cli.json {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| StageError::invalid(format!("serialize result: {e}")))?;
        println!("{json}");
        return Ok(());
    }

    println!("== run log");
    for line in ctx.logs() {
        println!("  {line}");
    }
    print_result(&result);
    Ok(())
}

fn print_result(result: &RunResult) {
    println!("\n== V1 response ({:?})\n{}", result.status_v1, result.code_v1);
    println!("\n== feedback\n{}", result.feedback);
    println!("\n== V2 response ({:?})\n{}", result.status_v2, result.code_v2);
    println!("\n== images");
    println!("  V1: {}", result.chart_v1.display());
    println!("  V2: {}", result.chart_v2.display());
}
