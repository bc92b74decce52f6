//! Worker thread logic for parallel event ingest
//!
//! Each worker:
//! - Pulls event indices from its work assignment
//! - Runs the event source on the matching parameter row
//! - Buffers results privately until its flush threshold
//! - Flushes the buffer into the shared store under its lock

use crate::config::IngestConfig;
use crate::db::{BatchReport, Matrix, SharedStore, KEY_COLUMN};
use crate::error::{StoreResult, WorkerError};
use crate::ingest::event::{EventResult, EventSource};
use crate::ingest::queue::WorkAssignment;
use crate::ingest::restructure::restructure;
use crate::padmap::{PadIndex, PadMap};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// State shared by every worker of one run
pub struct WorkerContext<S> {
    pub config: IngestConfig,
    pub padmap: Arc<PadMap>,
    pub store: SharedStore,
    pub source: Arc<S>,
    pub params: Arc<Matrix>,
    pub excluded: Arc<BTreeSet<PadIndex>>,

    /// External cancellation, owned by the coordinator
    pub cancel: Arc<AtomicBool>,

    /// Raised on the first fatal flush error of this run
    pub abort: AtomicBool,

    /// Events flushed by all workers so far
    pub finished: AtomicU64,
}

impl<S> WorkerContext<S> {
    fn total(&self) -> u64 {
        self.params.rows() as u64
    }

    fn should_stop(&self) -> bool {
        self.abort.load(Ordering::Relaxed) || self.cancel.load(Ordering::Relaxed)
    }
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Events taken from the work assignment
    pub events_processed: AtomicU64,

    /// Events whose simulation failed
    pub events_failed: AtomicU64,

    /// Non-empty flushes
    pub flushes: AtomicU64,

    /// Hit rows stored
    pub hits: AtomicU64,

    /// Time spent inside the event source
    pub simulate_micros: AtomicU64,

    /// Events passed to the event source
    pub events_simulated: AtomicU64,
}

impl WorkerStats {
    fn record_event(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_simulation(&self, elapsed: Duration) {
        self.simulate_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.events_simulated.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean event source time per event on this worker
    pub fn micros_per_event(&self) -> u64 {
        self.simulate_micros.load(Ordering::Relaxed)
            / self.events_simulated.load(Ordering::Relaxed).max(1)
    }

    fn record_failure(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_flush(&self, hits: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(hits, Ordering::Relaxed);
    }
}

/// A worker thread that simulates and stores events
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn<S>(
        id: usize,
        ctx: Arc<WorkerContext<S>>,
        work: WorkAssignment,
    ) -> Result<Self, WorkerError>
    where
        S: EventSource + 'static,
    {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("ingest-{}", id))
            .spawn(move || worker_loop(id, ctx, work, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish
    pub fn join(&mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: "Worker thread panicked".into(),
                }),
            }
        } else {
            Ok(())
        }
    }
}

/// Main worker loop
fn worker_loop<S: EventSource>(
    id: usize,
    ctx: Arc<WorkerContext<S>>,
    mut work: WorkAssignment,
    stats: Arc<WorkerStats>,
) -> Result<(), WorkerError> {
    let threshold = ctx.config.flush_threshold_for(id);
    debug!(worker = id, threshold, "Worker starting");

    let mut buffer: Vec<EventResult> = Vec::new();
    let mut outcome = Ok(());

    'work: while let Some(range) = work.next_range() {
        for event_id in range {
            if ctx.should_stop() {
                debug!(worker = id, "Stop requested");
                break 'work;
            }

            stats.record_event();
            let Some(params) = ctx.params.row(event_id as usize) else {
                stats.record_failure();
                warn!(worker = id, event = event_id, "No parameter row for event");
                continue;
            };

            let begun = Instant::now();
            let simulated = ctx.source.simulate(event_id, params);
            stats.record_simulation(begun.elapsed());

            match simulated {
                Ok(mut result) => {
                    result.remove_pads(&ctx.excluded);
                    buffer.push(result);
                }
                Err(e) => {
                    stats.record_failure();
                    warn!(worker = id, error = %e, "Event skipped");
                }
            }

            if buffer.len() >= threshold {
                if let Err(e) = flush(id, &ctx, &mut buffer, &stats) {
                    outcome = Err(e);
                    break 'work;
                }
            }
        }
    }

    if outcome.is_ok() {
        outcome = flush(id, &ctx, &mut buffer, &stats);
    }

    if let Err(e) = &outcome {
        ctx.abort.store(true, Ordering::Relaxed);
        error!(worker = id, error = %e, "Worker failed");
    }

    debug!(
        worker = id,
        events = stats.events_processed.load(Ordering::Relaxed),
        hits = stats.hits.load(Ordering::Relaxed),
        "Worker shutting down"
    );

    outcome
}

/// Write the buffered results and clear the buffer
///
/// The buffer is emptied whether or not the write succeeds. Each table is
/// its own transaction, so a flush is not atomic across tables: if the
/// trigger insert fails, the hits of the same batch stay committed.
fn flush<S>(
    id: usize,
    ctx: &WorkerContext<S>,
    buffer: &mut Vec<EventResult>,
    stats: &WorkerStats,
) -> Result<(), WorkerError> {
    let results = std::mem::take(buffer);
    if results.is_empty() {
        return Ok(());
    }

    let batch = restructure(&results, &ctx.padmap);
    let config = &ctx.config;

    let reports = ctx
        .store
        .with_lock(|db| -> StoreResult<Vec<BatchReport>> {
            let mut reports = Vec::with_capacity(3);
            reports.push(db.insert_rows(&config.hits_table, &batch.hits)?);
            reports.push(db.insert_rows(&config.trig_table, &batch.trig)?);
            if let Some(column) = &config.hit_count_column {
                reports.push(db.update_rows(
                    &config.params_table,
                    KEY_COLUMN,
                    &[column.as_str()],
                    &batch.hit_counts,
                )?);
            }
            Ok(reports)
        })
        .map_err(|source| WorkerError::Flush { id, source })?;

    for report in reports.iter().filter(|r| r.total() > 0) {
        ctx.store.stats().record(report);
    }
    stats.record_flush(reports[0].applied() as u64);

    let flushed = results.len() as u64;
    let finished = ctx.finished.fetch_add(flushed, Ordering::Relaxed) + flushed;
    info!(
        worker = id,
        finished,
        total = ctx.total(),
        us_per_event = stats.micros_per_event(),
        "Flushed {} events",
        flushed
    );

    Ok(())
}

/// Aggregated worker statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTotals {
    pub events: u64,
    pub failed: u64,
    pub flushes: u64,
    pub hits: u64,
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker]) -> WorkerTotals {
    workers.iter().fold(WorkerTotals::default(), |acc, w| WorkerTotals {
        events: acc.events + w.stats.events_processed.load(Ordering::Relaxed),
        failed: acc.failed + w.stats.events_failed.load(Ordering::Relaxed),
        flushes: acc.flushes + w.stats.flushes.load(Ordering::Relaxed),
        hits: acc.hits + w.stats.hits.load(Ordering::Relaxed),
    })
}
