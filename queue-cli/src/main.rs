//! qlined - command-line driver for the qline embedded message queue.
//!
//! Each invocation loads queue state from the configured snapshot file (if
//! present), applies one operation, then saves state back. There is no
//! daemon/server loop and no network surface — this drives the embedded
//! queue directly, not over HTTP/RPC.

use std::path::PathBuf;
use std::time::SystemTime;

use clap::{Parser, Subcommand};
use queue_core::error::QueueError;
use queue_engine::adapter::{LockDiscipline, StoreAdapter};
use queue_engine::queue::PayloadStoreFactory;
use queue_storage::{memory::MemoryPayloadStore, persistent::PersistentPayloadStore, PayloadStore};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "qlined")]
#[command(about = "Command-line driver for the qline embedded message queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short = 'c', long, default_value = "/etc/qlined/config.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a topic (`qlined add /topic`) or a line (`qlined add /topic/line --recycle 10s`)
    Add {
        name: String,
        #[arg(long, default_value = "")]
        recycle: String,
    },
    /// Append a payload to a topic
    Push { name: String, value: String },
    /// Deliver the next payload for a line
    Pop { name: String },
    /// Confirm a previously-popped id
    Confirm { name: String },
    /// Delete a topic or a line
    Remove { name: String },
    /// Print operation counters
    Stats,
}

fn main() {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        match Config::from_file(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to read config {}: {e}", cli.config.display());
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let log_level = if cli.verbose { "debug" } else { &config.logging.level };
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli, config) {
        error!(error = %e, "qlined command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: Config) -> Result<(), QueueError> {
    let discipline = match config.storage.lock_discipline.as_str() {
        "read-on-pop-confirm" => LockDiscipline::ReadOnPopConfirm,
        _ => LockDiscipline::WriteAlways,
    };
    let factory = Box::new(ConfiguredFactory::new(&config.storage));
    let snapshot_path = PathBuf::from(&config.storage.snapshot_path);

    let adapter = if snapshot_path.exists() {
        info!(path = %snapshot_path.display(), "recovering queue state");
        StoreAdapter::recover(&snapshot_path, factory, discipline)?
    } else {
        StoreAdapter::new(factory, discipline)
    };

    match cli.command {
        Commands::Add { name, recycle } => {
            let event = adapter.add(&name, &recycle)?;
            println!("created {} (index {})", event.key, event.index);
        }
        Commands::Push { name, value } => {
            let event = adapter.push(&name, &value)?;
            println!("pushed to {} (index {})", event.key, event.index);
        }
        Commands::Pop { name } => {
            let (event, value) = adapter.pop(&name, SystemTime::now())?;
            println!("{}\t{}", event.key, value);
        }
        Commands::Confirm { name } => {
            let event = adapter.confirm(&name)?;
            println!("confirmed {} (index {})", event.key, event.index);
        }
        Commands::Remove { name } => {
            let event = adapter.remove(&name)?;
            println!("removed {} (index {})", event.key, event.index);
        }
        Commands::Stats => {
            let stats = adapter.stats();
            println!("{}", serde_json::to_string_pretty(&stats).expect("StatsSnapshot always serializes"));
        }
    }

    if let Some(parent) = snapshot_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| QueueError::Storage(e.to_string()))?;
    }
    adapter.save(&snapshot_path)?;

    Ok(())
}

/// Builds a topic's payload backend per the configured storage kind.
struct ConfiguredFactory {
    persistent: bool,
    data_dir: PathBuf,
}

impl ConfiguredFactory {
    fn new(storage: &config::StorageConfig) -> Self {
        ConfiguredFactory {
            persistent: storage.backend == "persistent",
            data_dir: PathBuf::from(&storage.data_dir),
        }
    }

    fn topic_log_path(&self, topic_name: &str) -> PathBuf {
        let sanitized = topic_name.trim_start_matches('/').replace('/', "_");
        self.data_dir.join(format!("{sanitized}.log"))
    }
}

impl PayloadStoreFactory for ConfiguredFactory {
    fn create(&self, topic_name: &str) -> Result<Box<dyn PayloadStore>, QueueError> {
        if !self.persistent {
            return Ok(Box::new(MemoryPayloadStore::new()));
        }

        std::fs::create_dir_all(&self.data_dir).map_err(|e| QueueError::Storage(e.to_string()))?;
        let path = self.topic_log_path(topic_name);
        Ok(Box::new(PersistentPayloadStore::open(&path)?))
    }
}
