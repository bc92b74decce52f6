//! Relational persistence on top of SQLite
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Ingest Workers (N)                     │
//! │  - Buffer rows locally                              │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ flush (under lock)
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 SharedStore                         │
//! │  - Arc<Mutex<RelationalStore>>                      │
//! │  - One connection for the whole run                 │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ one transaction per batch
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 SQLite File                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Every table gets an implicit `idx` key column. Keys run from 0 without
//! gaps, and `read_table` uses them as row offsets in the returned matrix.

pub mod schema;
pub mod shared;
pub mod store;
pub mod types;

pub use schema::{Column, ColumnType, Constraint, TableSchema, KEY_COLUMN};
pub use shared::{SharedStore, StoreStats};
pub use store::{RelationalStore, StoreLocation, IN_MEMORY};
pub use types::{real_row, BatchReport, Matrix, Row, Value};
