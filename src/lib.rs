//! deteff - Pad map and result store for detector-efficiency simulations
//!
//! Detector-efficiency runs simulate many independent events in parallel and
//! persist the per-pad hits and per-event trigger decisions to SQLite for
//! later analysis.
//!
//! # Features
//!
//! - **Pad Map**: O(1) lookup from a hardware address (cobo, asad, aget,
//!   channel) to a pad index, plus the reverse lookup used to group hits.
//!
//! - **Relational Store**: batched, transactional inserts and updates over a
//!   single SQLite connection, with an implicit gap-free `idx` key per table.
//!
//! - **Parallel Ingest**: worker threads buffer results privately and flush
//!   them through one mutex-guarded store handle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────────────────────┐
//! │ padmap file  │────▶│  PadMap (Arc, read-only)                 │
//! └──────────────┘     └───────────────────┬──────────────────────┘
//!                                          │ reverse_find
//! ┌──────────────┐     ┌───────────────────▼──────────────────────┐
//! │ params table │────▶│  Ingest workers (ingest-0 .. ingest-N)   │
//! └──────────────┘     │  EventSource::simulate, private buffers  │
//!                      └───────────────────┬──────────────────────┘
//!                                          │ flush under lock
//!                      ┌───────────────────▼──────────────────────┐
//!                      │  SharedStore -> RelationalStore          │
//!                      │  one transaction per batch, WAL mode     │
//!                      └───────────────────┬──────────────────────┘
//!                                          ▼
//!                               ┌──────────────────┐
//!                               │   SQLite DB      │
//!                               │ hits / trig      │
//!                               └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Look up the pad of cobo 0, asad 1, aget 2, channel 3
//! deteff lookup --padmap padmap.csv 0 1 2 3
//!
//! # Create the result tables and inspect them after a run
//! deteff init --db run.db
//! deteff count --db run.db hits
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod padmap;

pub use config::{CliArgs, IngestConfig, Schedule};
pub use db::{RelationalStore, SharedStore, StoreLocation};
pub use error::{DeteffError, Result};
pub use ingest::{EventResult, EventSource, IngestCoordinator, IngestResult};
pub use padmap::{HardwareAddress, PadIndex, PadMap};
