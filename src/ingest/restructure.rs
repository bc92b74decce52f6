//! Turn buffered event results into table rows
//!
//! Hit rows are `[evt_id, cobo, pad, tb, num_elec]`: the cobo comes from a
//! reverse pad map lookup, `tb` is the time bucket of the first maximum
//! sample and `num_elec` is the truncated magnitude of that maximum.

use crate::db::{Row, Value};
use crate::ingest::event::EventResult;
use crate::padmap::PadMap;

/// Rows produced from one worker buffer
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushBatch {
    /// One row per hit pad
    pub hits: Vec<Row>,

    /// One row per event: `[evt_id, trig]`
    pub trig: Vec<Row>,

    /// `(event key, [hit pad count])` for the parameter table backfill
    pub hit_counts: Vec<(Value, Row)>,
}

/// Build the rows for a batch of results, preserving their order
pub fn restructure(results: &[EventResult], padmap: &PadMap) -> FlushBatch {
    let mut batch = FlushBatch {
        hits: Vec::new(),
        trig: Vec::with_capacity(results.len()),
        hit_counts: Vec::with_capacity(results.len()),
    };

    for result in results {
        let evt_id = Value::Integer(result.event_id as i64);

        for (pad, signal) in &result.signals {
            let Some(cobo) = padmap.reverse_find(*pad) else {
                continue;
            };
            let Some((tb, peak)) = peak(signal) else {
                continue;
            };
            batch.hits.push(vec![
                evt_id,
                Value::from(cobo),
                Value::from(pad.value()),
                Value::Integer(tb as i64),
                Value::Integer(peak.abs() as i64),
            ]);
        }

        batch.trig.push(vec![evt_id, Value::from(result.triggered)]);
        batch
            .hit_counts
            .push((evt_id, vec![Value::Integer(result.hit_count() as i64)]));
    }

    batch
}

/// Index and value of the first maximum sample
fn peak(signal: &[f64]) -> Option<(usize, f64)> {
    signal
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
}
