//! Per-event results and the source that produces them

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SimulationError;
use crate::padmap::PadIndex;

/// Result of simulating one event
#[derive(Debug, Clone, PartialEq)]
pub struct EventResult {
    /// Event index (row of the parameter table)
    pub event_id: u64,

    /// Digitized signal per hit pad
    pub signals: BTreeMap<PadIndex, Vec<f64>>,

    /// Whether the trigger fired
    pub triggered: bool,
}

impl EventResult {
    pub fn new(event_id: u64, signals: BTreeMap<PadIndex, Vec<f64>>, triggered: bool) -> Self {
        Self {
            event_id,
            signals,
            triggered,
        }
    }

    /// Drop signals on excluded pads
    pub fn remove_pads(&mut self, excluded: &BTreeSet<PadIndex>) {
        if !excluded.is_empty() {
            self.signals.retain(|pad, _| !excluded.contains(pad));
        }
    }

    /// Number of pads with a signal
    pub fn hit_count(&self) -> usize {
        self.signals.len()
    }
}

/// Produces the result for one event from its parameter row
///
/// This is where the physics lives; the ingest pipeline only calls it.
/// Implementations are shared by all workers and must be thread-safe.
pub trait EventSource: Send + Sync {
    fn simulate(&self, event_id: u64, params: &[f64]) -> Result<EventResult, SimulationError>;
}

impl<F> EventSource for F
where
    F: Fn(u64, &[f64]) -> Result<EventResult, SimulationError> + Send + Sync,
{
    fn simulate(&self, event_id: u64, params: &[f64]) -> Result<EventResult, SimulationError> {
        self(event_id, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_pads() {
        let signals = [(PadIndex(1), vec![1.0]), (PadIndex(2), vec![2.0]), (PadIndex(3), vec![])]
            .into_iter()
            .collect();
        let mut result = EventResult::new(7, signals, true);
        let excluded = [PadIndex(2)].into_iter().collect();
        result.remove_pads(&excluded);
        assert_eq!(result.hit_count(), 2);
        assert!(!result.signals.contains_key(&PadIndex(2)));
    }

    #[test]
    fn test_closure_source() {
        let source = |id: u64, params: &[f64]| {
            Ok::<_, SimulationError>(EventResult::new(
                id,
                BTreeMap::new(),
                params.first() == Some(&1.0),
            ))
        };
        let result = source.simulate(3, &[1.0]).unwrap();
        assert_eq!(result.event_id, 3);
        assert!(result.triggered);
    }
}
