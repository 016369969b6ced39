//! spindle - 1 アカウント分の publish エージェント
//!
//! 設定を読み、SQLite / ローカルディレクトリ / dry-run の port をワイヤリングして
//! コンポーネントを 1 回だけ、または scheduler で動かします。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use spindle_core::SpindleError;
use spindle_core::app::{Agent, AgentBuilder, Scheduler};
use spindle_core::config::{ConfigError, SpindleConfig, load_and_validate};
use spindle_core::impls::{DryRunSocialClient, LocalDirAssetSource, SqliteRecordStore};

/// spindle - publish media from an asset pool without repeating recent posts.
#[derive(Parser, Debug)]
#[command(name = "spindle", version, about, long_about = None)]
struct Cli {
    /// Config file (TOML). Missing files fall back to defaults and SPINDLE_* variables.
    #[arg(long, value_name = "PATH", default_value = "spindle.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every enabled component on its cadence until Ctrl-C.
    Run,
    /// Append a freshly shuffled copy of the asset pool to the queue.
    BuildQueue,
    /// Run one publish cycle.
    Publish {
        /// Skip the tweet-timeout gate.
        #[arg(long)]
        force: bool,
    },
    /// Follow back recent followers not yet requested.
    FollowBack,
    /// Unfollow accounts that do not follow back.
    Unfollow,
    /// Print queue and recency state as JSON.
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_and_validate(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("spindle: invalid configuration in {}: {e}", cli.config.display());
            std::process::exit(2);
        }
    };
    init_tracing(&config.log_level);

    if let Err(e) = run(cli.command, config).await {
        error!(error = %e, "spindle failed");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: SpindleConfig) -> Result<(), SpindleError> {
    let agent = wire(config).await?;

    match command {
        Commands::Run => {
            let agent = Arc::new(agent);
            let scheduler = Scheduler::spawn(Arc::clone(&agent));
            tokio::signal::ctrl_c().await?;
            info!("ctrl-c received, waiting for in-flight work");
            scheduler.shutdown_and_join().await;
        }
        Commands::BuildQueue => print_json(&agent.build_queue().await?),
        Commands::Publish { force: true } => print_json(&agent.publish().await?),
        Commands::Publish { force: false } => print_json(&agent.publish_if_allowed().await?),
        Commands::FollowBack => print_json(&agent.follow_back().await?),
        Commands::Unfollow => print_json(&agent.unfollow().await?),
        Commands::Status => print_json(&agent.status().await?),
    }
    Ok(())
}

async fn wire(config: SpindleConfig) -> Result<Agent, SpindleError> {
    ensure_dir(&config.assets.download_dir)?;

    let store = SqliteRecordStore::open_with_retry(
        &config.storage.database_path,
        config.storage.table_names().map_err(ConfigError::from)?,
        &config.storage.connect_policy(),
    )
    .await?;
    let assets = LocalDirAssetSource::new(&config.assets.bucket);

    info!(
        account = %config.account.screen_name,
        database = %config.storage.database_path.display(),
        bucket = %config.assets.bucket.display(),
        "wiring agent"
    );

    let agent = AgentBuilder::new(config)
        .store(Arc::new(store))
        .assets(Arc::new(assets))
        .social(Arc::new(DryRunSocialClient::new()))
        .build()?;
    Ok(agent)
}

fn ensure_dir(path: &Path) -> Result<(), SpindleError> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "could not render result"),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("spindle={log_level},spindle_core={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
