use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use common::Configuration;
use common::storage::create_strategy_stores;
use eliminator::pipeline::PipelineStores;
use eliminator::query::SelectQuery;
use eliminator::store::{
    BinaryStore, Dataset, InMemoryAccessionRegister, InMemoryArchive, InMemoryReportStore,
};
use eliminator::{EliminationMode, EliminationPipeline, EliminationRequest, PipelineState};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lethe")]
#[command(about = "Lethe - elimination of archive units whose retention has expired")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an elimination over an archive dataset
    Run(RunArgs),
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, help = "JSON dataset of units, object groups and inherited rules")]
    dataset: PathBuf,

    #[arg(long, value_enum, default_value_t = Mode::Analysis)]
    mode: Mode,

    #[arg(long, help = "Reference date for rule end dates (YYYY-MM-DD)")]
    expiration_date: String,

    #[arg(long, help = "Operation id, generated when absent")]
    operation_id: Option<String>,

    #[arg(long, help = "Selection query as JSON, selects every unit when absent")]
    query: Option<String>,

    #[arg(long, help = "Requested threshold, overrides the configured default")]
    threshold: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Analysis,
    Action,
}

impl From<Mode> for EliminationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Analysis => EliminationMode::Analysis,
            Mode::Action => EliminationMode::Action,
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Configuration> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            Configuration::load_from_path(path).context("Failed to load configuration")
        }
        None => Configuration::load().context("Failed to load configuration"),
    }
}

fn display_config(config: &Configuration, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration to JSON")?;
        println!("{json}");
        return Ok(());
    }

    println!("Lethe Configuration:");
    println!("====================");
    let mut strategies: Vec<_> = config.storage.strategies.iter().collect();
    strategies.sort_by_key(|(id, _)| id.as_str());
    for (id, strategy) in strategies {
        println!("Storage strategy {id}: {}", strategy.dsn);
    }
    println!("Report strategy: {}", config.storage.report_strategy);
    println!("Report prefix: {}", config.elimination.report_prefix);
    println!("Analysis threshold: {}", config.elimination.analysis_threshold);
    println!("Action threshold: {}", config.elimination.action_threshold);
    println!(
        "Batch sizes: scroll {}, report flush {}, deletion {}",
        config.elimination.scroll_batch_size,
        config.elimination.report_flush_size,
        config.elimination.distribution_batch_size
    );
    println!("Workspace directory: {:?}", config.elimination.workspace_dir);
    Ok(())
}

async fn run(config: &Configuration, args: RunArgs) -> Result<()> {
    let raw = tokio::fs::read(&args.dataset)
        .await
        .with_context(|| format!("Failed to read dataset {}", args.dataset.display()))?;
    let dataset: Dataset = serde_json::from_slice(&raw).context("Failed to parse dataset")?;
    tracing::info!(
        units = dataset.units.len(),
        object_groups = dataset.object_groups.len(),
        "Loaded dataset"
    );

    let mut query = match &args.query {
        Some(query) => {
            serde_json::from_str::<SelectQuery>(query).context("Failed to parse selection query")?
        }
        None => SelectQuery::default(),
    };
    if let Some(threshold) = args.threshold {
        query = query.with_threshold(threshold);
    }

    let stores = create_strategy_stores(&config.storage)?;
    let pipeline = EliminationPipeline::new(
        config,
        PipelineStores::in_memory(
            Arc::new(InMemoryArchive::from_dataset(dataset)),
            Arc::new(InMemoryReportStore::new()),
            Arc::new(InMemoryAccessionRegister::new()),
            BinaryStore::new(stores),
        ),
    )?;

    let operation_id = args
        .operation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = EliminationRequest::new(operation_id, args.expiration_date, query);
    let today = chrono::Utc::now().date_naive();

    let outcome = pipeline.run(&request, args.mode.into(), today).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize run outcome")?
    );

    if outcome.state == PipelineState::Failed {
        anyhow::bail!(
            "Elimination {} failed with status {}",
            outcome.operation_id,
            outcome.status
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Config { json } => display_config(&config, json),
        Command::Validate => {
            config.validate().context("Invalid configuration")?;
            tracing::info!("Configuration validation passed");
            Ok(())
        }
    }
}
