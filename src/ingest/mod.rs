//! Parallel event ingest
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              IngestCoordinator                │
//! │  - partitions 0..events (static / dynamic)    │
//! └───────────┬───────────────────┬───────────────┘
//!             ▼                   ▼
//!      ┌────────────┐      ┌────────────┐
//!      │  ingest-0  │ ...  │  ingest-N  │   EventSource::simulate
//!      │  buffer    │      │  buffer    │   per event, private buffers
//!      └─────┬──────┘      └─────┬──────┘
//!            │ flush at threshold + id * stagger
//!            ▼                   ▼
//!      ┌──────────────────────────────┐
//!      │  SharedStore (one lock)      │  hits, trig, params backfill
//!      └──────────────────────────────┘
//! ```

pub mod coordinator;
pub mod event;
pub mod queue;
pub mod restructure;
pub mod worker;

pub use coordinator::{IngestCoordinator, IngestResult};
pub use event::{EventResult, EventSource};
pub use queue::{partition, WorkAssignment};
pub use restructure::{restructure, FlushBatch};
pub use worker::{Worker, WorkerStats};
