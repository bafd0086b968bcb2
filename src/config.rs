//! Configuration parsing for Batchwrite.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::path::PathBuf;

use crate::writer::WriterConfig;

/// Batchwrite: batched, transactional statement writer over SQLite.
#[derive(Parser, Debug, Clone)]
#[command(name = "batchwrite")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Data directory for the SQLite database
    #[arg(short, long, env = "BATCHWRITE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Database file name inside the data directory
    #[arg(long, env = "BATCHWRITE_DATABASE", default_value = "batchwrite.db")]
    pub database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "BATCHWRITE_LOG_JSON")]
    pub log_json: bool,

    /// Maximum number of statements applied in one unit of work
    #[arg(long, env = "BATCHWRITE_MAX_BATCH_SIZE", default_value_t = 100)]
    pub max_batch_size: usize,

    /// How often the idle writer re-checks for shutdown, in milliseconds
    #[arg(long, env = "BATCHWRITE_POLL_INTERVAL_MS", default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// How long a waiting write blocks before giving up, in milliseconds
    #[arg(long, env = "BATCHWRITE_WRITE_TIMEOUT_MS", default_value_t = 30_000)]
    pub write_timeout_ms: u64,

    /// Size of the reader connection pool
    #[arg(long, env = "BATCHWRITE_READER_POOL_SIZE", default_value_t = 4)]
    pub reader_pool_size: u32,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }

    /// Writer settings derived from this configuration.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig::from_config(
            self.max_batch_size,
            self.poll_interval_ms,
            self.write_timeout_ms,
        )
    }

    /// Create a default configuration for testing.
    pub fn test_config(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            log_level: "debug".into(),
            poll_interval_ms: 20,
            write_timeout_ms: 5_000,
            reader_pool_size: 2,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database: "batchwrite.db".into(),
            log_level: "info".into(),
            log_json: false,
            max_batch_size: 100,
            poll_interval_ms: 500,
            write_timeout_ms: 30_000,
            reader_pool_size: 4,
            otel_endpoint: None,
        }
    }
}
