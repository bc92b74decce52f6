//! Mutex-guarded store handle shared by the ingest workers
//!
//! There is exactly one connection per run. Every worker holds a clone of the
//! same `SharedStore`, and every read or write goes through its lock, so the
//! connection is never used from two threads at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::db::store::RelationalStore;
use crate::db::types::BatchReport;

/// Statistics about committed batches
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Total rows written
    pub rows_written: AtomicU64,

    /// Total rows rejected by the engine
    pub rows_skipped: AtomicU64,

    /// Total batches committed
    pub batches_committed: AtomicU64,
}

impl StoreStats {
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped.load(Ordering::Relaxed)
    }

    pub fn batches_committed(&self) -> u64 {
        self.batches_committed.load(Ordering::Relaxed)
    }

    /// Fold a committed batch into the counters
    pub fn record(&self, report: &BatchReport) {
        self.rows_written
            .fetch_add(report.applied() as u64, Ordering::Relaxed);
        self.rows_skipped
            .fetch_add(report.skipped() as u64, Ordering::Relaxed);
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cloneable handle to the single store connection
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<RelationalStore>>,
    stats: Arc<StoreStats>,
}

impl SharedStore {
    pub fn new(store: RelationalStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            stats: Arc::new(StoreStats::default()),
        }
    }

    /// Run `f` with exclusive access to the store
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut RelationalStore) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Take the store back once every other handle is gone
    pub fn into_inner(self) -> Option<RelationalStore> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{Column, TableSchema};
    use crate::db::types::real_row;
    use std::thread;

    #[test]
    fn test_concurrent_inserts_are_serialized() {
        let mut store = RelationalStore::open_in_memory().unwrap();
        store
            .create_table(&TableSchema::new("t").column(Column::real("v")))
            .unwrap();
        let shared = SharedStore::new(store);

        let handles: Vec<_> = (0..4)
            .map(|w| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for batch in 0..5 {
                        let rows: Vec<_> = (0..10)
                            .map(|i| real_row(&[(w * 1000 + batch * 10 + i) as f64]))
                            .collect();
                        let report = shared.with_lock(|db| db.insert_rows("t", &rows)).unwrap();
                        shared.stats().record(&report);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(shared.stats().rows_written(), 200);
        assert_eq!(shared.stats().batches_committed(), 20);

        let store = shared.into_inner().unwrap();
        let m = store.read_table("t").unwrap();
        let mut values: Vec<i64> = m.iter_rows().map(|r| r[0] as i64).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 200);
    }
}
