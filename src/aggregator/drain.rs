//! Lets callers wait until a publish cycle finds nothing left to send.

use tokio::sync::watch;

/// Drain signal shared between the scheduler and waiters.
///
/// The scheduler bumps an epoch each time a tick finds no carry-over and an
/// empty store; the bump happens while the store lock is held (see
/// [`AggregationStore::take_snapshot_or_signal`]). Waiters subscribe first and
/// then wait for the next bump, so a waiter is only released by an emptiness
/// check that ran after every sample it added had been taken.
///
/// [`AggregationStore::take_snapshot_or_signal`]: super::AggregationStore::take_snapshot_or_signal
#[derive(Debug)]
pub struct DrainCoordinator {
    epoch: watch::Sender<u64>,
}

impl Default for DrainCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainCoordinator {
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        Self { epoch }
    }

    /// Issued by the store when a tick observed it fully drained.
    pub fn signal_drained(&self) {
        self.epoch.send_modify(|e| *e = e.wrapping_add(1));
    }

    /// Number of drain signals issued so far.
    pub fn drain_count(&self) -> u64 {
        *self.epoch.borrow()
    }

    /// Wait for the next drain signal.
    pub async fn wait_for_drain(&self) {
        let mut rx = self.epoch.subscribe();
        rx.borrow_and_update();
        // The sender lives as long as `self`, so this only errors if the
        // coordinator is being torn down.
        let _ = rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn waiter_is_released_by_next_signal() {
        let drain = Arc::new(DrainCoordinator::new());
        let waiter = {
            let drain = drain.clone();
            tokio::spawn(async move { drain.wait_for_drain().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drain.signal_drained();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();
        assert_eq!(drain.drain_count(), 1);
    }

    #[tokio::test]
    async fn earlier_signals_do_not_release_new_waiters() {
        let drain = DrainCoordinator::new();
        drain.signal_drained();
        drain.signal_drained();

        let result =
            tokio::time::timeout(Duration::from_millis(20), drain.wait_for_drain()).await;
        assert!(result.is_err(), "stale signal must not release a waiter");
    }
}
