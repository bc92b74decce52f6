//! Ingest coordinator - orchestrates the parallel event run
//!
//! The coordinator is responsible for:
//! - Partitioning event indices across workers
//! - Spawning and joining the worker threads
//! - Propagating the first fatal flush error
//! - Final statistics

use crate::config::IngestConfig;
use crate::db::{Matrix, SharedStore};
use crate::error::{DeteffError, Result, StoreResult};
use crate::ingest::event::EventSource;
use crate::ingest::queue::partition;
use crate::ingest::worker::{aggregate_stats, Worker, WorkerContext};
use crate::padmap::{PadIndex, PadMap};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of a completed run
#[derive(Debug)]
pub struct IngestResult {
    /// Events handed to workers
    pub events: u64,

    /// Events whose simulation failed
    pub events_failed: u64,

    /// Hit rows stored
    pub hits_written: u64,

    /// Rows rejected by the store
    pub rows_skipped: u64,

    /// Transactions committed
    pub batches: u64,

    /// Time taken for the run
    pub duration: Duration,

    /// Whether every event was processed (vs aborted)
    pub completed: bool,
}

impl IngestResult {
    /// Calculate events per second rate
    pub fn events_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.events as f64 / secs
        } else {
            0.0
        }
    }
}

/// Coordinates the parallel ingest
pub struct IngestCoordinator {
    /// Configuration
    config: IngestConfig,

    /// Shared, read-only pad map
    padmap: Arc<PadMap>,

    /// The single store connection
    store: SharedStore,

    /// Pads whose signals are dropped before storage
    excluded: Arc<BTreeSet<PadIndex>>,

    /// External cancellation signal; fatal errors use a per-run flag
    cancel: Arc<AtomicBool>,
}

impl IngestCoordinator {
    /// Create a new coordinator
    pub fn new(config: IngestConfig, padmap: Arc<PadMap>, store: SharedStore) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            padmap,
            store,
            excluded: Arc::new(BTreeSet::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Drop signals on these pads before they are stored
    pub fn with_excluded(mut self, pads: BTreeSet<PadIndex>) -> Self {
        self.excluded = Arc::new(pads);
        self
    }

    /// Get a clone of the cancellation flag (for signal handlers)
    ///
    /// Setting it stops the current and every later run until it is cleared.
    /// A failed run does not touch it.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Create the hits and trigger tables named in the configuration
    pub fn create_tables(&self) -> StoreResult<()> {
        self.store
            .with_lock(|db| db.create_result_tables(&self.config.hits_table, &self.config.trig_table))
    }

    /// Run every event in `params` through `source` and store the results
    ///
    /// Row `i` of `params` is the parameter set of event `i`.
    pub fn run<S>(&self, source: Arc<S>, params: Arc<Matrix>) -> Result<IngestResult>
    where
        S: EventSource + 'static,
    {
        let start_time = Instant::now();
        let total = params.rows() as u64;
        let stats_before = (
            self.store.stats().rows_skipped(),
            self.store.stats().batches_committed(),
        );

        info!(
            events = total,
            workers = self.config.worker_count,
            schedule = ?self.config.schedule,
            "Starting ingest"
        );

        let assignments = partition(total, self.config.worker_count, self.config.schedule)?;
        let ctx = Arc::new(WorkerContext {
            config: self.config.clone(),
            padmap: Arc::clone(&self.padmap),
            store: self.store.clone(),
            source,
            params,
            excluded: Arc::clone(&self.excluded),
            cancel: Arc::clone(&self.cancel),
            abort: AtomicBool::new(false),
            finished: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(assignments.len());
        for (id, work) in assignments.into_iter().enumerate() {
            match Worker::spawn(id, Arc::clone(&ctx), work) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    ctx.abort.store(true, Ordering::SeqCst);
                    join_workers(&mut workers);
                    return Err(e.into());
                }
            }
        }

        let first_error = join_workers(&mut workers);
        let totals = aggregate_stats(&workers);
        let duration = start_time.elapsed();

        if let Some(e) = first_error {
            return Err(DeteffError::Worker(e));
        }

        let completed = !self.cancel.load(Ordering::SeqCst) && totals.events == total;
        let result = IngestResult {
            events: totals.events,
            events_failed: totals.failed,
            hits_written: totals.hits,
            rows_skipped: self.store.stats().rows_skipped() - stats_before.0,
            batches: self.store.stats().batches_committed() - stats_before.1,
            duration,
            completed,
        };

        info!(
            events = result.events,
            failed = result.events_failed,
            hits = result.hits_written,
            duration_ms = duration.as_millis() as u64,
            "Ingest completed"
        );

        Ok(result)
    }
}

/// Join all workers, keeping the first error
fn join_workers(workers: &mut [Worker]) -> Option<crate::error::WorkerError> {
    let mut first = None;
    for worker in workers.iter_mut() {
        if let Err(e) = worker.join() {
            warn!(worker = worker.id(), error = %e, "Worker failed");
            first.get_or_insert(e);
        }
    }
    first
}
