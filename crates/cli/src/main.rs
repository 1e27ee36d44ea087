//! Deckhand daemon - runs configuration operations in the background.
//!
//! Operations are submitted to a task registry and polled by id until they
//! finish, the same way remote clients see them.

mod config;
mod operations;

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use deckhand_core::TaskId;
use deckhand_tasks::{RegistryError, TaskRegistry};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "deckhandd")]
#[command(about = "Deckhand daemon - background configuration operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Upper bound on threads running blocking operations
    #[arg(long, global = true, default_value_t = 512)]
    max_blocking_threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit sample operations and poll them to completion
    Demo {
        /// Delay between polls
        #[arg(long, default_value_t = 25)]
        poll_interval_ms: u64,
    },

    /// Print daemon info
    Info,
}

impl Cli {
    fn config(&self) -> DaemonConfig {
        let mut config = DaemonConfig {
            log_level: self.log_level.clone(),
            max_blocking_threads: self.max_blocking_threads,
            ..Default::default()
        };
        if let Commands::Demo { poll_interval_ms } = self.command {
            config.poll_interval = Duration::from_millis(poll_interval_ms);
        }
        config
    }
}

fn init_logging(config: &DaemonConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config();
    init_logging(&config);

    match cli.command {
        Commands::Demo { .. } => {
            let runtime = config.runtime()?;
            runtime.block_on(run_demo(&config))
        }

        Commands::Info => {
            println!("deckhandd v{}", env!("CARGO_PKG_VERSION"));
            println!("Max blocking threads: {}", config.max_blocking_threads);
            Ok(())
        }
    }
}

async fn run_demo(config: &DaemonConfig) -> Result<()> {
    let registry: TaskRegistry<Value> = TaskRegistry::new();

    let submitted = [
        registry
            .submit(|| operations::validate_deployment("default"))
            .await,
        registry.submit(|| operations::deploy("default", None)).await,
        registry
            .submit(|| operations::generate_profiles("clouddriver"))
            .await,
    ];
    info!("Submitted {} operation(s)", submitted.len());

    for id in registry.list_ids().await {
        println!("tracking {}", id);
    }

    let mut outstanding: BTreeSet<TaskId> = submitted.into_iter().collect();
    let mut ticker = tokio::time::interval(config.poll_interval);
    while !outstanding.is_empty() {
        ticker.tick().await;

        let mut finished = Vec::new();
        for id in &outstanding {
            if report(&registry, id).await? {
                finished.push(*id);
            }
        }
        for id in finished {
            outstanding.remove(&id);
        }
    }

    let stale = registry.poll(&submitted[0]).await;
    if let Err(RegistryError::NotFound(id)) = stale {
        println!("{}: not found (already delivered)", id);
    }

    Ok(())
}

/// Print one poll outcome. Returns true once the task is done.
async fn report(registry: &TaskRegistry<Value>, id: &TaskId) -> Result<bool> {
    match registry.poll(id).await {
        Ok(task) if !task.is_terminal() => {
            let stage = task.stage.as_ref().map(|s| s.name.as_str()).unwrap_or("-");
            println!("{}: {} ({})", id, task.state, stage);
            Ok(false)
        }
        Ok(task) => {
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(true)
        }
        Err(RegistryError::NotFound(_)) => {
            println!("{}: not found", id);
            Ok(true)
        }
        Err(e @ RegistryError::UnexpectedFault { .. }) => {
            warn!("{}", e);
            println!(
                "{}: operational error, retry the operation or report it if it keeps failing",
                id
            );
            Ok(true)
        }
    }
}
