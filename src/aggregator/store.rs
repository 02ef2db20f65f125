//! Thread-safe accumulator for pending metric samples.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::DrainCoordinator;
use crate::metric::{AggregateKey, Metric};

/// Pending samples in arrival order plus a key -> index lookup.
///
/// Every key in `index` points at exactly one entry in `metrics`, and every
/// value is finite.
#[derive(Default, Debug)]
struct PendingSet {
    metrics: Vec<Metric>,
    index: HashMap<AggregateKey, usize>,
}

impl PendingSet {
    fn accumulate(&mut self, metric: Metric) {
        if !metric.value.is_finite() {
            warn!(name = %metric.name, value = %metric.value, "dropping non-finite sample");
            return;
        }
        let key = metric.aggregate_key();
        match self.index.get(&key) {
            Some(&idx) => {
                let sum = self.metrics[idx].value + metric.value;
                if sum.is_finite() {
                    self.metrics[idx].value = sum;
                } else {
                    warn!(name = %metric.name, "dropping sample that would overflow its aggregate");
                }
            }
            None => {
                self.index.insert(key, self.metrics.len());
                self.metrics.push(metric);
            }
        }
    }
}

/// Accumulates samples from any number of producers. Samples with the same
/// name in the same second are summed into a single entry.
#[derive(Default, Debug)]
pub struct AggregationStore {
    pending: Mutex<PendingSet>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingSet> {
        // accumulate() cannot leave the set half-updated, so poisoning is ignored
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_sample(&self, metric: Metric) {
        self.lock().accumulate(metric);
    }

    /// Add several samples under one lock acquisition.
    pub fn add_samples<I>(&self, metrics: I)
    where
        I: IntoIterator<Item = Metric>,
    {
        let mut pending = self.lock();
        for metric in metrics {
            pending.accumulate(metric);
        }
    }

    /// Swap the pending set for an empty one and return what was queued, in
    /// arrival order.
    pub fn take_snapshot_and_clear(&self) -> Vec<Metric> {
        let taken = std::mem::take(&mut *self.lock());
        taken.metrics
    }

    /// Like [`take_snapshot_and_clear`](Self::take_snapshot_and_clear), but
    /// when nothing is queued the drain signal is issued before the lock is
    /// released. A producer that adds a sample and then waits for drain can
    /// therefore only be released by a later, emptier check.
    pub fn take_snapshot_or_signal(&self, drain: &DrainCoordinator) -> Vec<Metric> {
        let mut pending = self.lock();
        if pending.metrics.is_empty() {
            drain.signal_drained();
            return Vec::new();
        }
        std::mem::take(&mut *pending).metrics
    }

    pub fn is_empty(&self) -> bool {
        self.lock().metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().metrics.len()
    }
}
