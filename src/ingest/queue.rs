//! Splitting the event index range across workers
//!
//! Static scheduling gives each worker one contiguous block. Dynamic
//! scheduling fills a crossbeam channel with fixed-size chunks up front and
//! closes it; workers pull chunks until the channel is drained. Either way
//! every index in `0..total` goes to exactly one worker.

use crate::config::Schedule;
use crate::error::WorkerError;
use crossbeam_channel::{bounded, Receiver};
use std::ops::Range;

/// The share of work handed to a single worker
#[derive(Debug)]
pub enum WorkAssignment {
    /// A fixed block, consumed once
    Block(Option<Range<u64>>),

    /// Chunks pulled from a shared queue
    Queue(Receiver<Range<u64>>),
}

impl WorkAssignment {
    /// Next range to process, or `None` when this worker is done
    pub fn next_range(&mut self) -> Option<Range<u64>> {
        match self {
            WorkAssignment::Block(block) => block.take(),
            WorkAssignment::Queue(rx) => rx.try_recv().ok(),
        }
    }
}

/// Build one assignment per worker covering `0..total`
pub fn partition(
    total: u64,
    workers: usize,
    schedule: Schedule,
) -> Result<Vec<WorkAssignment>, WorkerError> {
    let workers = workers.max(1);

    match schedule {
        Schedule::Static => {
            let per_worker = total.div_ceil(workers as u64);
            Ok((0..workers as u64)
                .map(|w| {
                    let start = (w * per_worker).min(total);
                    let end = ((w + 1) * per_worker).min(total);
                    WorkAssignment::Block((start < end).then_some(start..end))
                })
                .collect())
        }
        Schedule::Dynamic { chunk } => {
            let chunk = chunk.max(1) as u64;
            let chunks = total.div_ceil(chunk) as usize;
            let (tx, rx) = bounded(chunks.max(1));

            let mut start = 0;
            while start < total {
                let end = (start + chunk).min(total);
                tx.send(start..end)
                    .map_err(|_| WorkerError::QueueSendFailed)?;
                start = end;
            }
            drop(tx);

            Ok((0..workers).map(|_| WorkAssignment::Queue(rx.clone())).collect())
        }
    }
}
