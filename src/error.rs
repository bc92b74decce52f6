//! Error types for deteff
//!
//! This module defines the error hierarchy that covers:
//! - SQLite store errors (open, prepare, bind, step, schema)
//! - Pad map construction errors
//! - Configuration errors
//! - Ingest worker errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Missing pad mappings are not errors; they surface as `PadIndex::MISSING`
//! - Preserve error chains so the CLI can print the SQLite error text

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for deteff
#[derive(Error, Debug)]
pub enum DeteffError {
    /// Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Pad map errors
    #[error("Pad map error: {0}")]
    PadMap(#[from] PadMapError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Relational store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The engine could not open the store
    #[error("Failed to open store at '{location}': {source}")]
    Open {
        location: String,
        source: rusqlite::Error,
    },

    /// Engine-level failure (prepare, step, transaction control)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema conflict (table or index already exists)
    #[error("Schema error on '{name}': {reason}")]
    Schema { name: String, reason: String },

    /// Operation on a table that was never created
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    /// Row length does not match the table's declared columns
    #[error("Row {row} for table '{table}' has {found} values, expected {expected}")]
    Arity {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Binding a value failed; the batch was rolled back
    #[error("Failed to bind row {row} for table '{table}': {source}")]
    Bind {
        table: String,
        row: usize,
        source: rusqlite::Error,
    },

    /// A stored key cannot be used as a row offset
    #[error("Key {key} in table '{table}' is outside 0..{rows}")]
    KeyOutOfRange { table: String, key: i64, rows: usize },

    /// A cell held text or blob data
    #[error("Column {column} of table '{table}' holds a non-numeric value")]
    NonNumeric { table: String, column: usize },

    /// Table or column name is not a plain SQL identifier
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Pad map construction errors
#[derive(Error, Debug)]
pub enum PadMapError {
    /// Failed to read the mapping file
    #[error("Failed to read pad map '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A data line that is neither a valid record nor a skip line
    #[error("Malformed record on line {line} ('{content}'): {reason}")]
    MalformedRecord {
        line: usize,
        content: String,
        reason: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid flush threshold
    #[error("Invalid flush threshold {size}: must be between {min} and {max}")]
    InvalidFlushThreshold { size: usize, min: usize, max: usize },

    /// Dynamic schedule with an empty chunk
    #[error("Dynamic schedule chunk size must be at least 1")]
    InvalidChunkSize,

    /// Table or column name that cannot be used in SQL
    #[error("Invalid {what} name '{name}'")]
    InvalidName { what: &'static str, name: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Thread could not be spawned
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Work queue send failed
    #[error("Failed to send work item: queue closed")]
    QueueSendFailed,

    /// A flush hit a fatal store error
    #[error("Worker {id} flush failed: {source}")]
    Flush { id: usize, source: StoreError },
}

/// Failure reported by an event source for a single event
#[derive(Error, Debug, Clone)]
#[error("Simulation of event {event} failed: {reason}")]
pub struct SimulationError {
    /// Event index that failed
    pub event: u64,

    /// Human-readable reason
    pub reason: String,
}

impl SimulationError {
    /// Create a new simulation error
    pub fn new(event: u64, reason: impl Into<String>) -> Self {
        Self {
            event,
            reason: reason.into(),
        }
    }
}

/// Result type alias for DeteffError
pub type Result<T> = std::result::Result<T, DeteffError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for PadMapError
pub type PadMapResult<T> = std::result::Result<T, PadMapError>;

/// Outcome of a single row within a committed batch
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Row was written
    Applied,

    /// Row was rejected by the engine and left out of the batch
    Skipped { row: usize, reason: String },
}

impl RowOutcome {
    /// Returns true if the row was written
    pub fn is_applied(&self) -> bool {
        matches!(self, RowOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let store_err = StoreError::UnknownTable("hits".into());
        let err: DeteffError = store_err.into();
        assert!(matches!(err, DeteffError::Store(_)));
    }

    #[test]
    fn test_file_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DeteffError = PadMapError::Io {
            path: PathBuf::from("padmap.csv"),
            source: io,
        }
        .into();
        assert!(matches!(err, DeteffError::PadMap(PadMapError::Io { .. })));
        assert!(err.to_string().contains("padmap.csv"));
    }

    #[test]
    fn test_malformed_record_message() {
        let err = PadMapError::MalformedRecord {
            line: 4,
            content: "1,2,x,4,5".into(),
            reason: "invalid aget".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 4"));
        assert!(msg.contains("invalid aget"));
    }

    #[test]
    fn test_row_outcome() {
        assert!(RowOutcome::Applied.is_applied());
        let skipped = RowOutcome::Skipped {
            row: 3,
            reason: "UNIQUE constraint failed".into(),
        };
        assert!(!skipped.is_applied());
    }
}
