//! Configuration types for deteff
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Ingest configuration with validation

use crate::db::schema::is_identifier;
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Flush threshold limits
pub const MIN_FLUSH_THRESHOLD: usize = 1;
pub const MAX_FLUSH_THRESHOLD: usize = 1_000_000;

/// Events buffered per worker before its first flush
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1000;

/// Extra events per worker id, so workers do not all flush at once
pub const DEFAULT_FLUSH_STAGGER: usize = 100;

/// Default table names
pub const DEFAULT_HITS_TABLE: &str = "hits";
pub const DEFAULT_TRIG_TABLE: &str = "trig";
pub const DEFAULT_PARAMS_TABLE: &str = "params";

/// Pad map and result store tooling for detector-efficiency simulations
#[derive(Parser, Debug, Clone)]
#[command(
    name = "deteff",
    version,
    about = "Pad map and result store tooling for detector-efficiency simulations",
    after_help = "EXAMPLES:\n    \
        deteff lookup --padmap padmap.csv 0 1 2 3\n    \
        deteff reverse --padmap padmap.csv 1200\n    \
        deteff init --db run.db\n    \
        deteff dump --db run.db hits > hits.csv\n    \
        deteff count --db run.db trig"
)]
pub struct CliArgs {
    /// Subcommand
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Look up the pad for a hardware address
    #[command(allow_negative_numbers = true)]
    Lookup {
        /// Pad mapping file
        #[arg(long, value_name = "FILE")]
        padmap: PathBuf,

        cobo: i32,
        asad: i32,
        aget: i32,
        channel: i32,
    },

    /// Find the hardware address of a pad
    Reverse {
        /// Pad mapping file
        #[arg(long, value_name = "FILE")]
        padmap: PathBuf,

        pad: u16,
    },

    /// Create the hits and trigger tables in a store
    Init {
        /// Store path (or :memory:)
        #[arg(long, value_name = "DB")]
        db: String,

        /// Hits table name
        #[arg(long, default_value = DEFAULT_HITS_TABLE)]
        hits: String,

        /// Trigger table name
        #[arg(long, default_value = DEFAULT_TRIG_TABLE)]
        trig: String,
    },

    /// Print a table as delimited text
    Dump {
        /// Store path
        #[arg(long, value_name = "DB")]
        db: String,

        /// Table to read
        table: String,

        /// Field delimiter
        #[arg(long, default_value = ",")]
        delimiter: String,
    },

    /// Print the row count of a table
    Count {
        /// Store path
        #[arg(long, value_name = "DB")]
        db: String,

        /// Table to count
        table: String,
    },
}

/// How event indices are split across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// One contiguous block per worker
    Static,

    /// Workers pull fixed-size chunks from a shared queue
    Dynamic { chunk: usize },
}

/// Validated ingest configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Number of worker threads
    pub worker_count: usize,

    /// Buffered events that trigger a flush for worker 0
    pub flush_threshold: usize,

    /// Added to the threshold per worker id
    pub flush_stagger: usize,

    /// Work partitioning
    pub schedule: Schedule,

    /// Table receiving one row per hit pad
    pub hits_table: String,

    /// Table receiving one row per event
    pub trig_table: String,

    /// Parameter table (one row per event, keyed by event id)
    pub params_table: String,

    /// Column of the parameter table backfilled with the hit pad count
    pub hit_count_column: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_count: default_workers(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            flush_stagger: DEFAULT_FLUSH_STAGGER,
            schedule: Schedule::Static,
            hits_table: DEFAULT_HITS_TABLE.to_string(),
            trig_table: DEFAULT_TRIG_TABLE.to_string(),
            params_table: DEFAULT_PARAMS_TABLE.to_string(),
            hit_count_column: None,
        }
    }
}

impl IngestConfig {
    /// Check limits and table names
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.flush_threshold < MIN_FLUSH_THRESHOLD || self.flush_threshold > MAX_FLUSH_THRESHOLD
        {
            return Err(ConfigError::InvalidFlushThreshold {
                size: self.flush_threshold,
                min: MIN_FLUSH_THRESHOLD,
                max: MAX_FLUSH_THRESHOLD,
            });
        }

        if let Schedule::Dynamic { chunk: 0 } = self.schedule {
            return Err(ConfigError::InvalidChunkSize);
        }

        let tables = [
            ("hits table", &self.hits_table),
            ("trigger table", &self.trig_table),
            ("params table", &self.params_table),
        ];
        for (what, name) in tables {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidName {
                    what,
                    name: name.clone(),
                });
            }
        }

        if let Some(col) = &self.hit_count_column {
            if !is_identifier(col) {
                return Err(ConfigError::InvalidName {
                    what: "hit count column",
                    name: col.clone(),
                });
            }
        }

        Ok(())
    }

    /// Flush threshold for a given worker
    pub fn flush_threshold_for(&self, worker: usize) -> usize {
        self.flush_threshold
            .saturating_add(worker.saturating_mul(self.flush_stagger))
    }
}

fn default_workers() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS)
}
