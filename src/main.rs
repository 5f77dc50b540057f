use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use jira_mirror::config::Config;
use jira_mirror::db;
use jira_mirror::error::AppError;
use jira_mirror::models::cache_state::{self, CacheState, Operation, SyncMode};
use jira_mirror::models::CollectionType;
use jira_mirror::services::{scheduler, JiraClient, LogSink, SyncOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "jira-mirror")]
#[command(about = "Mirror Jira collections into a local SQLite store")]
#[command(version)]
struct Cli {
    /// Path to config file (default: $XDG_CONFIG_HOME/jira-mirror/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh one collection (incremental unless --full)
    Refresh {
        collection: CollectionType,
        #[arg(long)]
        full: bool,
    },
    /// Forget incremental history and rebuild one collection
    Rebuild { collection: CollectionType },
    /// Refresh every collection in dependency order
    Sync {
        #[arg(long)]
        full: bool,
    },
    /// Show the cache state of every collection
    Status,
    /// Keep syncing in the background until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(cli.config.as_deref())?;
    let pool = db::initialize(&config.database_path()?).await?;

    if let Command::Status = cli.command {
        for collection_type in CollectionType::SYNC_ORDER {
            let state = cache_state::get_cache_state(&pool, collection_type)
                .await?
                .unwrap_or_else(|| CacheState::missing(collection_type));
            println!("{}", format_state(&state));
        }
        return Ok(());
    }

    let client = JiraClient::new(config.client_config(Config::api_token()?))?;
    let orchestrator = Arc::new(SyncOrchestrator::new(
        pool,
        Arc::new(client),
        config.sync_settings(),
        Arc::new(LogSink),
    ));

    match cli.command {
        Command::Refresh { collection, full } => {
            let state = orchestrator.refresh(collection, mode(full)).await?;
            println!("{}", format_state(&state));
        }
        Command::Rebuild { collection } => {
            let state = orchestrator.rebuild(collection).await?;
            println!("{}", format_state(&state));
        }
        Command::Sync { full } => {
            for state in orchestrator.refresh_all(mode(full)).await? {
                println!("{}", format_state(&state));
            }
        }
        Command::Watch => {
            let (handle, task) =
                scheduler::start_background(orchestrator.clone(), config.sync.interval_secs);
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| AppError::internal(format!("Failed to wait for Ctrl-C: {}", e)))?;
            handle.stop().await?;
            task.await
                .map_err(|e| AppError::internal(format!("Scheduler task failed: {}", e)))?;
        }
        Command::Status => {}
    }

    Ok(())
}

fn mode(full: bool) -> SyncMode {
    if full {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    }
}

fn format_state(state: &CacheState) -> String {
    let (built, build_total) = state.progress(Operation::Build);
    let (updated, update_total) = state.progress(Operation::Update);
    format!(
        "{:<16} {:<9} build {}/{}  update {}/{}  watermark {}",
        state.collection_type,
        state.status,
        built,
        build_total,
        updated,
        update_total,
        state
            .watermark()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string())
    )
}
