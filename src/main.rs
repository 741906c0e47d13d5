use std::path::PathBuf;
use std::time::Duration;

use appscrap::apps::AppListFetcher;
use appscrap::checkpoint::CheckpointStore;
use appscrap::config::Config;
use appscrap::entity::{load_entities, save_entities};
use appscrap::process::{Collector, RunConfig};
use appscrap::request::HttpClient;
use appscrap::sink::CsvSink;
use appscrap::sources::Source;
use appscrap::{info_time, logging, Error, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shell convention for termination by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "appscrap")]
#[command(about = "Collect per-app data in resumable batches")]
struct Cli {
    /// JSON config file; defaults are used for anything it leaves out
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the app list from SteamSpy
    Apps {
        /// Number of `request=all` pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Collect records for one data source, resuming from its checkpoint
    Collect {
        #[arg(value_enum)]
        source: Source,
        /// Start index; defaults to the stored checkpoint
        #[arg(long)]
        begin: Option<usize>,
        /// End index (exclusive); defaults to the end of the app list
        #[arg(long)]
        end: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Seconds to wait after each request
        #[arg(long)]
        pause: Option<f64>,
        /// Reset the checkpoint and start over
        #[arg(long)]
        reset: bool,
    },
    /// Reset a source's checkpoint to 0
    Reset {
        #[arg(value_enum)]
        source: Source,
    },
    /// Show checkpoint and row count for every source
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let start_time = Local::now();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Apps { pages } => build_app_list(&config, pages).await?,
        Commands::Collect {
            source,
            begin,
            end,
            batch_size,
            pause,
            reset,
        } => {
            let overrides = Overrides {
                begin,
                end,
                batch_size,
                pause,
                reset,
            };
            collect(&config, source, overrides).await?;
        }
        Commands::Reset { source } => {
            let checkpoint = checkpoint_for(&config, source)?;
            checkpoint.reset().await?;
            info!(source = source.name(), "Checkpoint reset");
        }
        Commands::Status => status(&config).await?,
    }

    info_time!(start_time, "Full program time:");
    Ok(())
}

struct Overrides {
    begin: Option<usize>,
    end: Option<usize>,
    batch_size: Option<usize>,
    pause: Option<f64>,
    reset: bool,
}

async fn build_app_list(config: &Config, pages: u32) -> Result<()> {
    let client = HttpClient::new(config.retry.clone())?;
    let apps = AppListFetcher::new(&client).fetch(pages).await?;

    let path = config.app_list_path();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    save_entities(&path, &apps)?;
    info!(count = apps.len(), path = ?path, "Saved app list");
    Ok(())
}

async fn collect(config: &Config, source: Source, overrides: Overrides) -> Result<()> {
    let source_config = config.source(source.name())?;
    let entities = load_entities(config.app_list_path())?;
    info!(count = entities.len(), "Loaded app list");

    let sink = CsvSink::new(config.data_path(source_config), source.columns().iter().copied());
    let checkpoint = checkpoint_for(config, source)?;
    if overrides.reset {
        checkpoint.reset().await?;
    }

    let strategy = source.strategy(HttpClient::new(config.retry.clone())?);
    let cancel = CancellationToken::new();
    let collector =
        Collector::new(&*strategy, &sink, &checkpoint).with_cancellation(cancel.clone());
    tokio::spawn({
        let commit_lock = collector.commit_lock();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if cancel.is_cancelled() {
                    warn!("Second interrupt, exiting once the files are consistent");
                    let _commit = commit_lock.lock().await;
                    std::process::exit(EXIT_INTERRUPTED);
                }
                warn!("Interrupt received, stopping after the current batch (Ctrl-C again to force)");
                cancel.cancel();
            }
        }
    });

    let index = collector.prepare().await?;

    let pause = match overrides.pause {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|e| Error::Config(format!("invalid pause {secs}: {e}")))?,
        None => source_config.pause,
    };
    let run_config = RunConfig {
        begin: overrides.begin.unwrap_or(index as usize),
        end: overrides.end.map(|end| end.min(entities.len())),
        batch_size: overrides.batch_size.unwrap_or(source_config.batch_size),
        pause,
    };

    let summary = collector.run(&entities, &run_config).await?;
    if summary.cancelled {
        info!(
            checkpoint = summary.checkpoint,
            "Stopped early; run again to resume"
        );
    }
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    for source in Source::ALL {
        let source_config = config.source(source.name())?;
        let checkpoint = checkpoint_for(config, source)?.read().await?;
        let sink = CsvSink::new(config.data_path(source_config), source.columns().iter().copied());
        let rows = if sink.exists().await {
            sink.row_count().await?
        } else {
            0
        };
        info!(source = source.name(), checkpoint, rows, "Status");
    }
    Ok(())
}

fn checkpoint_for(config: &Config, source: Source) -> Result<CheckpointStore> {
    let source_config = config.source(source.name())?;
    Ok(CheckpointStore::new(config.index_path(source_config)))
}
