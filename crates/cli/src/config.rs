//! Daemon configuration.

use std::time::Duration;

use anyhow::{ensure, Result};
use tracing_subscriber::EnvFilter;

/// Settings collected from the command line.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Default log filter, used when `RUST_LOG` is unset
    pub log_level: String,

    /// Upper bound on threads hosting blocking operations
    pub max_blocking_threads: usize,

    /// How often the demo polls outstanding tasks
    pub poll_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_blocking_threads: 512,
            poll_interval: Duration::from_millis(25),
        }
    }
}

impl DaemonConfig {
    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_blocking_threads > 0,
            "--max-blocking-threads must be at least 1"
        );
        ensure!(
            !self.poll_interval.is_zero(),
            "--poll-interval-ms must be at least 1"
        );
        Ok(())
    }

    /// Log filter: `RUST_LOG` if set, the configured level otherwise.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }

    /// Build the tokio runtime the registry runs on.
    pub fn runtime(&self) -> Result<tokio::runtime::Runtime> {
        self.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(self.max_blocking_threads)
            .thread_name("deckhand-worker")
            .build()?;
        Ok(runtime)
    }
}
