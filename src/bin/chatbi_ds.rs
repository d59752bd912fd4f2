use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chatbi_dataset_cache::app::App;
use chatbi_dataset_cache::config::{ConfigLoader, ResolvedConfig};
use chatbi_dataset_cache::error::DatasetError;
use chatbi_dataset_cache::http::HttpDatasetSource;
use chatbi_dataset_cache::observer::CacheEvent;
use chatbi_dataset_cache::output::{JsonOutput, OutputMode, TextOutput};
use chatbi_dataset_cache::poller::StatusPoller;
use chatbi_dataset_cache::store::DatasetStore;

#[derive(Parser)]
#[command(name = "chatbi-ds")]
#[command(about = "Inspect Chat-BI datasets and their processing pipeline")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Query the dataset collection")]
    Datasets(DatasetsArgs),
}

#[derive(Args)]
struct DatasetsArgs {
    #[command(subcommand)]
    command: DatasetsCommand,
}

#[derive(Subcommand)]
enum DatasetsCommand {
    #[command(about = "List datasets with their stage statuses")]
    List(ListArgs),
    #[command(about = "Show one dataset")]
    Info(InfoArgs),
    #[command(about = "Show completed/processing/failed counts")]
    Stats,
    #[command(about = "Poll in-progress datasets until they settle")]
    Watch(WatchArgs),
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    refresh: bool,
}

#[derive(Args)]
struct InfoArgs {
    id: String,
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(long)]
    max_rounds: Option<u32>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<DatasetError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DatasetError) -> u8 {
    match error {
        DatasetError::DatasetNotFound(_)
        | DatasetError::ConfigRead(_)
        | DatasetError::ConfigParse(_)
        | DatasetError::InvalidConfig(_) => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    match cli.command {
        Commands::Datasets(args) => runtime.block_on(run_datasets(args.command, config, output_mode)),
    }
}

async fn run_datasets(
    command: DatasetsCommand,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let (interval, max_rounds) = match &command {
        DatasetsCommand::Watch(args) => (
            args.interval_ms
                .map(Duration::from_millis)
                .unwrap_or(config.poll_interval),
            args.max_rounds.unwrap_or(config.max_poll_rounds),
        ),
        _ => (config.poll_interval, config.max_poll_rounds),
    };

    let source = HttpDatasetSource::from_config(&config)?;
    let store = DatasetStore::builder(source).ttl(config.cache_ttl).build();
    store.subscribe(|event: &CacheEvent| debug!(?event, "dataset cache event"));
    let app = App::new(store, StatusPoller::new(interval, max_rounds));

    match command {
        DatasetsCommand::List(args) => {
            let result = app.list(args.refresh).await?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result),
                OutputMode::Text => TextOutput::print_list(&result),
            }
            .into_diagnostic()
        }
        DatasetsCommand::Info(args) => {
            let result = app.info(&args.id).await?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_info(&result),
                OutputMode::Text => TextOutput::print_info(&result),
            }
            .into_diagnostic()
        }
        DatasetsCommand::Stats => {
            let result = app.stats().await?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_stats(&result),
                OutputMode::Text => TextOutput::print_stats(&result),
            }
            .into_diagnostic()
        }
        DatasetsCommand::Watch(_) => {
            let result = app.watch().await?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_watch(&result),
                OutputMode::Text => TextOutput::print_watch(&result),
            }
            .into_diagnostic()
        }
    }
}
