//! Recurring publish task. Each tick either sends one batch or, when nothing
//! is left, tells drain waiters that the store is empty.

use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::batch::{BatchPublisher, PreparedBatch};
use crate::aggregator::{AggregationStore, DrainCoordinator};
use crate::dimensions::DimensionSource;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Store and carry-over were both empty; drain was signalled.
    Drained,
    /// One batch was handed to the network.
    Dispatched { batch_size: usize, remaining: usize },
}

/// Publish tasks that have been spawned and may still be running.
#[derive(Clone, Default)]
pub struct InFlight {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl InFlight {
    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every publish spawned so far to complete or fail.
    pub async fn wait_all(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "publish task ended abnormally");
            }
        }
    }
}

pub struct PublishScheduler {
    interval: Duration,
    store: Arc<AggregationStore>,
    drain: Arc<DrainCoordinator>,
    dimensions: Arc<DimensionSource>,
    batch: BatchPublisher,
    in_flight: InFlight,
}

impl PublishScheduler {
    pub fn new(
        interval: Duration,
        store: Arc<AggregationStore>,
        drain: Arc<DrainCoordinator>,
        dimensions: Arc<DimensionSource>,
        batch: BatchPublisher,
        in_flight: InFlight,
    ) -> Self {
        Self {
            interval,
            store,
            drain,
            dimensions,
            batch,
            in_flight,
        }
    }

    /// One scheduler firing. Carry-over from an earlier snapshot is drained
    /// before the store is read again. Must be called inside a tokio runtime.
    pub fn tick(&mut self) -> TickOutcome {
        let batch = loop {
            if let Some(batch) = self.batch.next_batch() {
                break batch;
            }
            let snapshot = self.store.take_snapshot_or_signal(&self.drain);
            if snapshot.is_empty() {
                return TickOutcome::Drained;
            }
            debug!(snapshot_size = snapshot.len(), "snapshot taken");
            self.batch.load(snapshot, self.dimensions.resolve());
        };

        let batch_size = batch.metrics.len();
        self.dispatch(batch);
        TickOutcome::Dispatched {
            batch_size,
            remaining: self.batch.remaining(),
        }
    }

    fn dispatch(&self, batch: PreparedBatch) {
        let pipeline = self.batch.pipeline();
        let handle = tokio::spawn(async move {
            // failures are logged by the pipeline and go no further
            let _ = pipeline.publish(batch).await;
        });
        self.in_flight.track(handle);
    }

    /// Tick every `interval`, or immediately when `trigger` is notified, until
    /// `shutdown` fires or its sender is dropped.
    pub async fn run(mut self, trigger: Arc<Notify>, mut shutdown: oneshot::Receiver<()>) {
        info!(interval_ms = self.interval.as_millis() as u64, "publish scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.interval) => {}
                _ = trigger.notified() => {}
            }

            if let TickOutcome::Dispatched { batch_size, remaining } = self.tick() {
                debug!(batch_size, remaining, "batch dispatched");
            }
        }

        if self.batch.has_carry_over() {
            warn!(
                remaining = self.batch.remaining(),
                "publish scheduler stopped with unsent carry-over"
            );
        }
        info!("publish scheduler stopped");
    }
}
