use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use online_linker_core::{
    online_supplier, Configuration, MemoryStore, RedisStore, ReplacementStrategy, SharedStore,
};
use online_linker_server::{ManagerError, OnlineLinker, OnlineManager};
use online_linker_sources::PingSource;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about = "Aggregates and publishes online player counts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the managers described by a YAML configuration file.
    Run {
        /// Configuration file.
        #[arg(short, long, default_value = "online-linker.yml")]
        config: PathBuf,

        /// Local online count reported by this host.
        #[arg(short, long, default_value_t = 0)]
        local_count: i32,

        /// Seconds between two online count reports in the log.
        #[arg(long, default_value_t = 10)]
        report_interval: u64,
    },

    /// Ping a server once and print its online count.
    Ping {
        host: String,

        #[arg(short, long, default_value_t = 25565)]
        port: u16,

        #[arg(long, default_value_t = 759)]
        protocol_version: i32,

        /// Timeout in milliseconds, 0 waits forever.
        #[arg(short, long, default_value_t = 5000)]
        timeout: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,online_linker_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            local_count,
            report_interval,
        } => run(&config, local_count, report_interval).await,
        Command::Ping {
            host,
            port,
            protocol_version,
            timeout,
        } => ping(host, port, protocol_version, timeout).await,
    }
}

fn load_config(path: &Path) -> anyhow::Result<Configuration> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let config: Configuration = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn open_store(config: &Configuration) -> anyhow::Result<Option<SharedStore>> {
    match &config.shared_store {
        Some(settings) => {
            let store = RedisStore::open(&settings.url)
                .with_context(|| format!("Invalid shared store URL {}", settings.url))?;
            if let Err(e) = store.ping() {
                tracing::warn!("Shared store not reachable yet: {}", e);
            }
            tracing::info!("Using shared store at {}", settings.url);
            Ok(Some(Arc::new(store)))
        }
        None if config.needs_shared_store() => {
            tracing::warn!("No shared-store url configured, counts are only shared in-process");
            Ok(Some(Arc::new(MemoryStore::new())))
        }
        None => Ok(None),
    }
}

async fn run(path: &Path, local_count: i32, report_interval: u64) -> anyhow::Result<()> {
    tracing::info!("online-linker starting with {}", path.display());
    let config = load_config(path)?;
    let store = open_store(&config)?;

    let mut hooked: Option<Arc<OnlineManager>> = None;
    let linker = OnlineLinker::start(
        &config,
        online_supplier(move || local_count),
        store,
        |manager, strategy| match strategy {
            ReplacementStrategy::Delegate => {
                hooked = Some(manager);
                Ok(())
            }
            other => Err(ManagerError::UnsupportedStrategy(other)),
        },
    )?;
    if hooked.is_some() {
        tracing::info!("Status responses report the aggregated online count");
    }

    let mut report = tokio::time::interval(Duration::from_secs(report_interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = report.tick() => {
                if let Some(manager) = linker.online_manager().cloned() {
                    // On-demand refreshes may block on the network.
                    let online = tokio::task::spawn_blocking(move || manager.online_count()).await?;
                    tracing::info!("Online count: {}", online);
                }
            }
        }
    }

    tokio::task::spawn_blocking(move || linker.stop()).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn ping(host: String, port: u16, protocol_version: i32, timeout: i64) -> anyhow::Result<()> {
    let target = format!("{}:{}", host, port);
    let source = PingSource::new(host, port, timeout, protocol_version, None);
    let online = tokio::task::spawn_blocking(move || source.ping())
        .await?
        .with_context(|| format!("Failed to ping {}", target))?;
    if online < 0 {
        bail!("{} reported an invalid online count {}", target, online);
    }
    println!("{}", online);
    Ok(())
}
