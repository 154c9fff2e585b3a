//! CLI command definitions for archforge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::agents::{
    CodegenAgent, CodegenConfig, DiagramSource, DiagramVisionAgent, EvaluationRubric,
    EvaluatorConfig, ManualStepAgent, QualityEvaluatorAgent, VisionAgentConfig,
};
use crate::llm::{ChatClient, LlmProvider};
use crate::pipeline::{
    ExecutionSummary, Orchestrator, OrchestratorConfig, PipelineStep, StepStatus,
};
use crate::report::RunReporter;

/// Multi-agent pipeline that turns architecture diagrams into
/// infrastructure code.
#[derive(Parser)]
#[command(name = "archforge")]
#[command(about = "Turn architecture diagrams into deployable infrastructure code")]
#[command(version)]
#[command(
    long_about = "archforge coordinates vision, evaluation and code-generation agents through a \
fixed six-step pipeline, gating progression on quality scores.\n\nExample usage:\n  archforge run \
diagrams/serverless.png --threshold 80"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline against a single diagram.
    Run(RunArgs),

    /// Run the pipeline against several diagrams.
    ///
    /// Runs execute concurrently when parallel execution is enabled; each
    /// run owns its own orchestrator and context either way.
    Batch(BatchArgs),
}

/// Arguments for `archforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the architecture diagram image.
    pub diagram: PathBuf,

    /// Minimum score a gated evaluation step must reach.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum invocation attempts per step.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-attempt timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Vision model for diagram parsing.
    #[arg(long)]
    pub vision_model: Option<String>,

    /// Model for the two evaluation steps.
    #[arg(long)]
    pub evaluator_model: Option<String>,

    /// Model for code generation.
    #[arg(long)]
    pub codegen_model: Option<String>,

    /// Output directory for generated files and run reports.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Skip writing the run report to disk.
    #[arg(long)]
    pub no_report: bool,
}

/// Arguments for `archforge batch`.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Paths to the architecture diagram images.
    #[arg(required = true)]
    pub diagrams: Vec<PathBuf>,

    /// Minimum score a gated evaluation step must reach.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Force sequential execution even when parallel execution is enabled.
    #[arg(long)]
    pub sequential: bool,

    /// Output directory for generated files and run reports.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Parses CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the CLI with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_single(args).await,
        Commands::Batch(args) => run_batch(args).await,
    }
}

/// Builds the orchestrator configuration from the environment plus CLI
/// overrides.
fn build_config(
    threshold: Option<f64>,
    max_retries: Option<u32>,
    timeout_secs: Option<u64>,
    vision_model: Option<String>,
    evaluator_model: Option<String>,
    codegen_model: Option<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::from_env().context("invalid environment configuration")?;

    if let Some(threshold) = threshold {
        config.evaluation_threshold = threshold;
    }
    if let Some(max_retries) = max_retries {
        config.max_retries = max_retries;
    }
    if let Some(secs) = timeout_secs {
        config.timeout = std::time::Duration::from_secs(secs);
    }
    if let Some(model) = vision_model {
        config.vision_model = model;
    }
    if let Some(model) = evaluator_model {
        config.evaluator_model = model;
    }
    if let Some(model) = codegen_model {
        config.codegen_model = model;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Creates an orchestrator with the production agent bindings.
fn build_orchestrator(
    config: OrchestratorConfig,
    provider: Arc<dyn LlmProvider>,
) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(config.clone());

    orchestrator.bind_agent(
        PipelineStep::ImageParsing,
        Arc::new(DiagramVisionAgent::new(
            Arc::clone(&provider),
            VisionAgentConfig::new(&config.vision_model),
        )),
    );
    orchestrator.bind_agent(
        PipelineStep::ModelEvaluation1,
        Arc::new(QualityEvaluatorAgent::new(
            Arc::clone(&provider),
            EvaluatorConfig::new(&config.evaluator_model),
            EvaluationRubric::DiagramParsing,
        )),
    );
    orchestrator.bind_agent(
        PipelineStep::TerraformCreation,
        Arc::new(CodegenAgent::new(
            Arc::clone(&provider),
            CodegenConfig::new(config.output_dir.join("terraform"))
                .with_model(&config.codegen_model),
        )),
    );
    orchestrator.bind_agent(
        PipelineStep::ModelEvaluation2,
        Arc::new(QualityEvaluatorAgent::new(
            Arc::clone(&provider),
            EvaluatorConfig::new(&config.evaluator_model),
            EvaluationRubric::GeneratedCode,
        )),
    );
    orchestrator.bind_agent(
        PipelineStep::TerraformExecution,
        Arc::new(ManualStepAgent::terraform_execution()),
    );
    orchestrator.bind_agent(
        PipelineStep::InfrastructureDeployment,
        Arc::new(ManualStepAgent::infrastructure_deployment()),
    );

    orchestrator
}

/// Executes one pipeline run and optionally persists its report.
async fn execute_run(
    config: OrchestratorConfig,
    provider: Arc<dyn LlmProvider>,
    diagram: PathBuf,
    save_report: bool,
) -> anyhow::Result<ExecutionSummary> {
    anyhow::ensure!(diagram.exists(), "diagram not found at {}", diagram.display());

    let mut orchestrator = build_orchestrator(config.clone(), provider);
    orchestrator.initialize_agents()?;

    // Ctrl-C cancels the run between steps / attempts
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let summary = orchestrator
        .execute_full_process(DiagramSource::Path(diagram))
        .await?;

    if save_report {
        let reporter = RunReporter::new(config.output_dir.join("runs"));
        match reporter.save(&summary, &config).await {
            Ok(paths) => info!(report = %paths.markdown.display(), "Run report written"),
            Err(err) => warn!(error = %err, "Failed to write run report"),
        }
    }

    Ok(summary)
}

/// Handles `archforge run`.
async fn run_single(args: RunArgs) -> anyhow::Result<()> {
    let config = build_config(
        args.threshold,
        args.max_retries,
        args.timeout_secs,
        args.vision_model,
        args.evaluator_model,
        args.codegen_model,
        args.output,
    )?;
    let provider: Arc<dyn LlmProvider> = Arc::new(ChatClient::from_env()?);

    let summary = execute_run(config, provider, args.diagram, !args.no_report).await?;
    print_summary(&summary);

    if let Some(reason) = &summary.halt_reason {
        anyhow::bail!("run halted: {reason}");
    }
    Ok(())
}

/// Handles `archforge batch`.
async fn run_batch(args: BatchArgs) -> anyhow::Result<()> {
    let config = build_config(args.threshold, None, None, None, None, None, args.output)?;
    let provider: Arc<dyn LlmProvider> = Arc::new(ChatClient::from_env()?);

    let parallel = config.enable_parallel_execution && !args.sequential;
    info!(
        diagram_count = args.diagrams.len(),
        parallel, "Starting batch"
    );

    let summaries: Vec<anyhow::Result<ExecutionSummary>> = if parallel {
        // Every run owns an independent orchestrator and context
        let futures: Vec<_> = args
            .diagrams
            .into_iter()
            .map(|diagram| execute_run(config.clone(), Arc::clone(&provider), diagram, true))
            .collect();
        futures::future::join_all(futures).await
    } else {
        let mut results = Vec::new();
        for diagram in args.diagrams {
            results.push(execute_run(config.clone(), Arc::clone(&provider), diagram, true).await);
        }
        results
    };

    let mut halted = 0usize;
    for result in &summaries {
        match result {
            Ok(summary) => {
                print_summary(summary);
                if summary.halt_reason.is_some() {
                    halted += 1;
                }
            }
            Err(err) => {
                halted += 1;
                println!("Run failed to start: {err}");
            }
        }
    }

    if halted > 0 {
        anyhow::bail!("{halted} of {} runs did not complete", summaries.len());
    }
    Ok(())
}

/// Prints the per-step outcome of one run.
fn print_summary(summary: &ExecutionSummary) {
    println!("\nRun {} summary:", summary.run_id);
    println!("{}", "-".repeat(50));

    for result in &summary.steps {
        let mut line = format!(
            "Step {}: {} - {}",
            result.step.number(),
            result.step.display_name(),
            result.status
        );
        if let Some(score) = result.score() {
            let verdict = if score >= summary.evaluation_threshold {
                "passed"
            } else {
                "failed"
            };
            line.push_str(&format!(
                " (score {:.1}, threshold {:.0} {})",
                score, summary.evaluation_threshold, verdict
            ));
        }
        println!("{line}");
        if result.status != StepStatus::Skipped {
            println!(
                "        attempts: {}, duration: {:.2}s",
                result.attempts, result.duration_seconds
            );
        }
    }

    println!(
        "\nSuccessful steps: {}/{}",
        summary.successful_steps(),
        summary.steps.len()
    );
    println!("Total duration: {:.2}s", summary.total_duration_seconds);
    match &summary.halt_reason {
        None => println!("Overall: completed"),
        Some(reason) => println!("Overall: halted ({reason})"),
    }
}
