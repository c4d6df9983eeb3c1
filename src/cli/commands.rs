//! CLI command definitions for circuit-forge.
//!
//! Generates circuit datasets from templates, routes them through
//! registered autorouters and exports the web tier's seed fixture.

use crate::autorouter::{
    AutorouterOrchestrator, AutorouterRegistry, HttpAutorouterClient, RunReport,
    DEFAULT_SERVER_URL,
};
use crate::config::ForgeConfig;
use crate::convert::CircuitConverter;
use crate::evaluator::SandboxEvaluator;
use crate::export::{generate_seed_database, write_seed_database};
use crate::pipeline::{CancelFlag, DatasetReport, DatasetRunner};
use crate::sample::{SampleProducer, SampleRange};
use crate::storage::{ArtifactStore, FsArtifactStore, SqliteArtifactStore};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Default dataset id for `generate`.
const DEFAULT_DATASET_ID: &str = "dataset-1";

/// Default location of the generated seed fixture.
const DEFAULT_SEED_OUTPUT: &str = "tests/fixtures/seed-database.generated.json";

/// Template evaluated for the seed fixture's samples.
const SEED_TEMPLATE: &str = "keyboard";

/// Circuit dataset generator and autorouting runner.
#[derive(Parser)]
#[command(name = "circuit-forge")]
#[command(about = "Generate PCB circuit datasets and run autorouters against them")]
#[command(version)]
#[command(
    long_about = "circuit-forge evaluates parameterized circuit templates into dataset samples.\n\nEach sample is stored as unrouted_circuit.json, unrouted_simple_route.json, unrouted.dsn and unrouted_pcb.svg, and can be routed by any registered autorouter.\n\nExample usage:\n  circuit-forge generate --template keyboard --start 1 --end 3\n  circuit-forge run-autorouter --input ./sample-1/unrouted_circuit.json --autorouter freerouting"
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
    /// Generate dataset samples for a range of sample numbers.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Route a single unrouted circuit file.
    ///
    /// The output is written next to the input, under
    /// `outputs/<autorouter>_routed_circuit.json`.
    RunAutorouter(RunAutorouterArgs),

    /// Route every sample of a materialized dataset directory.
    Route(RouteArgs),

    /// List the registered autorouters.
    Autorouters(AutoroutersArgs),

    /// Generate the seed database fixture for the web tier.
    Seed(SeedArgs),
}

/// Arguments for the `generate` command.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Circuit type to evaluate (e.g. "keyboard").
    #[arg(short, long)]
    pub template: String,

    /// First sample number (inclusive, starting at 1).
    #[arg(short, long)]
    pub start: String,

    /// Last sample number (inclusive).
    #[arg(short, long)]
    pub end: String,

    /// Dataset the samples belong to.
    #[arg(long, default_value = DEFAULT_DATASET_ID)]
    pub dataset_id: String,

    /// Output root; samples land in `<output>/<dataset_id>/<sample_id>/`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// SQLite database URL; stores artifacts in the database instead of files.
    #[arg(long)]
    pub database_url: Option<String>,

    /// Autorouter to run inline after each sample (repeatable).
    #[arg(short, long = "autorouter")]
    pub autorouters: Vec<String>,

    /// Number of samples evaluated at once.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `run-autorouter` command.
#[derive(Parser, Debug)]
pub struct RunAutorouterArgs {
    /// Path to an unrouted circuit JSON file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Autorouter id (see `circuit-forge autorouters`).
    #[arg(short, long)]
    pub autorouter: String,

    /// Autorouting service base URL.
    #[arg(long, env = "FORGE_AUTOROUTER_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,
}

/// Arguments for the `route` command.
#[derive(Parser, Debug)]
pub struct RouteArgs {
    /// Dataset directory containing one sub-directory per sample.
    #[arg(short, long)]
    pub dataset_dir: PathBuf,

    /// Autorouters to run against every sample.
    #[arg(short, long = "autorouter", required = true)]
    pub autorouters: Vec<String>,

    /// Autorouting service base URL.
    #[arg(long, env = "FORGE_AUTOROUTER_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,
}

/// Arguments for the `autorouters` command.
#[derive(Parser, Debug)]
pub struct AutoroutersArgs {
    /// Print the registry as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `seed` command.
#[derive(Parser, Debug)]
pub struct SeedArgs {
    /// Where to write the seed database JSON.
    #[arg(short, long, default_value = DEFAULT_SEED_OUTPUT)]
    pub output: PathBuf,
}

/// JSON output structure for a dataset run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub dataset_id: String,
    pub status: String,
    pub samples_completed: usize,
    pub samples_degraded: usize,
    pub routing: Vec<RoutingOutput>,
    pub total_duration_ms: u64,
}

/// JSON output structure for one autorouter run.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingOutput {
    pub sample_id: String,
    pub autorouter_id: String,
    pub state: String,
    pub file_path: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl From<&RunReport> for RoutingOutput {
    fn from(report: &RunReport) -> Self {
        Self {
            sample_id: report.sample_id().to_string(),
            autorouter_id: report.autorouter_id().to_string(),
            state: report.state().to_string(),
            file_path: report.artifact.as_ref().map(|a| a.file_path.clone()),
            error: report.error.as_ref().map(|e| e.to_string()),
            duration_ms: report.duration.as_millis() as u64,
        }
    }
}

impl From<&DatasetReport> for GenerationOutput {
    fn from(report: &DatasetReport) -> Self {
        Self {
            dataset_id: report.dataset_id.clone(),
            status: report.status.to_string(),
            samples_completed: report.samples_completed,
            samples_degraded: report.samples_degraded,
            routing: report.routing.iter().map(RoutingOutput::from).collect(),
            total_duration_ms: report.duration.as_millis() as u64,
        }
    }
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await?,
        Commands::RunAutorouter(args) => run_autorouter_command(args).await?,
        Commands::Route(args) => run_route_command(args).await?,
        Commands::Autorouters(args) => run_autorouters_command(args)?,
        Commands::Seed(args) => run_seed_command(args).await?,
    }
    Ok(())
}

fn build_producer(config: &ForgeConfig) -> SampleProducer {
    SampleProducer::new(
        Arc::new(SandboxEvaluator::new(config.sandbox_config())),
        Arc::new(CircuitConverter::default()),
    )
}

fn build_orchestrator(server_url: &str, config: &ForgeConfig) -> anyhow::Result<AutorouterOrchestrator> {
    let client = HttpAutorouterClient::new(server_url, config.autorouter_timeout)?;
    Ok(AutorouterOrchestrator::new(
        AutorouterRegistry::builtin(),
        Arc::new(client),
    ))
}

async fn open_store(
    config: &ForgeConfig,
    dataset_id: &str,
) -> anyhow::Result<Arc<dyn ArtifactStore>> {
    match &config.database_url {
        Some(url) => {
            info!(database_url = %url, dataset_id, "Using SQLite artifact store");
            let store = SqliteArtifactStore::open(url).await?;
            Ok(Arc::new(store.for_dataset(dataset_id)))
        }
        None => {
            let root = config.output_dir.join(dataset_id);
            info!(root = %root.display(), "Using filesystem artifact store");
            Ok(Arc::new(FsArtifactStore::new(root)))
        }
    }
}

/// Generates one dataset.
async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = ForgeConfig::from_env()?;
    if let Some(output) = args.output.clone() {
        config = config.with_output_dir(output);
    }
    if let Some(url) = args.database_url.clone() {
        config = config.with_database_url(url);
    }
    if let Some(n) = args.concurrency {
        config = config.with_max_concurrent_samples(n);
    }
    config.validate()?;

    let range = SampleRange::parse(&args.start, &args.end)?;
    let template = config.template_catalog()?.resolve(&args.template)?;
    let store = open_store(&config, &args.dataset_id).await?;

    let mut runner = DatasetRunner::new(build_producer(&config), store)
        .with_concurrency(config.max_concurrent_samples);
    if !args.autorouters.is_empty() {
        let orchestrator = build_orchestrator(&config.autorouter_server_url, &config)?;
        runner = runner.with_autorouting(Arc::new(orchestrator), args.autorouters.clone())?;
    }

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current sample");
            on_interrupt.cancel();
        }
    });

    let report = runner
        .run(&args.dataset_id, &template, range, &cancel)
        .await?;
    let output = GenerationOutput::from(&report);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Dataset {} {}: {} samples ({} without preview) in {:.1}s",
            output.dataset_id,
            output.status,
            output.samples_completed,
            output.samples_degraded,
            report.duration.as_secs_f64()
        );
        for run in &output.routing {
            match &run.error {
                None => println!("  {} / {}: {}", run.sample_id, run.autorouter_id, run.state),
                Some(e) => println!(
                    "  {} / {}: {} ({})",
                    run.sample_id, run.autorouter_id, run.state, e
                ),
            }
        }
    }

    if report.routing_failures() > 0 {
        warn!(
            failures = report.routing_failures(),
            "Some inline autorouter runs failed"
        );
    }
    Ok(())
}

/// Routes one circuit file.
async fn run_autorouter_command(args: RunAutorouterArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::from_env()?;
    let orchestrator = build_orchestrator(&args.server_url, &config)?;

    let artifact = orchestrator
        .run_on_file(&args.input, &args.autorouter)
        .await?
        .into_result()?;

    let written = output_path_for(&args.input, &artifact.file_path);
    println!("Routed circuit written to {}", written.display());
    Ok(())
}

fn output_path_for(input: &Path, file_path: &str) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(file_path))
        .unwrap_or_else(|| PathBuf::from(file_path))
}

/// Routes every sample of a dataset directory.
async fn run_route_command(args: RouteArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::from_env()?;
    let orchestrator = build_orchestrator(&args.server_url, &config)?;
    let store = FsArtifactStore::new(&args.dataset_dir);

    let sample_ids: Vec<String> = store
        .list_samples()
        .await?
        .into_iter()
        .map(|s| s.sample_id)
        .collect();
    if sample_ids.is_empty() {
        anyhow::bail!("No samples found in {}", args.dataset_dir.display());
    }

    let reports = orchestrator
        .route_all(&store, &sample_ids, &args.autorouters)
        .await?;

    let mut failures = 0usize;
    for report in &reports {
        let run = RoutingOutput::from(report);
        match &run.error {
            None => println!("{} / {}: {}", run.sample_id, run.autorouter_id, run.state),
            Some(e) => {
                failures += 1;
                println!("{} / {}: {} ({})", run.sample_id, run.autorouter_id, run.state, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} autorouter runs failed", failures, reports.len());
    }
    Ok(())
}

/// Lists the autorouter registry.
fn run_autorouters_command(args: AutoroutersArgs) -> anyhow::Result<()> {
    let registry = AutorouterRegistry::builtin();
    if args.json {
        let entries: Vec<_> = registry.iter().collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for descriptor in registry.iter() {
        let capabilities: Vec<String> = descriptor
            .capabilities
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "{:<20} {:<28} {:<8} {:<5} {}",
            descriptor.id,
            descriptor.name,
            descriptor.version,
            descriptor.license,
            capabilities.join(",")
        );
    }
    Ok(())
}

/// Writes the seed database fixture.
async fn run_seed_command(args: SeedArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::from_env()?;
    let template = config.template_catalog()?.resolve(SEED_TEMPLATE)?;

    let db = generate_seed_database(
        &build_producer(&config),
        &template,
        &AutorouterRegistry::builtin(),
    )
    .await?;
    write_seed_database(&db, &args.output).await?;

    println!(
        "Seed database written to {} ({} samples, {} files)",
        args.output.display(),
        db.samples.len(),
        db.sample_files.len()
    );
    Ok(())
}
