//! In-memory record of every batch handed to the network.

use crate::dimensions::Dimensions;
use crate::metric::Metric;

/// Ordered, append-only list of published batches.
#[derive(Debug, Default, Clone)]
pub struct BackupRecord {
    batches: Vec<Vec<Metric>>,
}

impl BackupRecord {
    fn push(&mut self, batch: Vec<Metric>) {
        self.batches.push(batch);
    }

    pub fn batches(&self) -> &[Vec<Metric>] {
        &self.batches
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.batches.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.iter().all(Vec::is_empty)
    }
}

/// Batches published under a replay overlay.
#[derive(Debug, Clone)]
pub struct ReplayRecord {
    pub dimensions: Dimensions,
    pub record: BackupRecord,
}

/// Backup of everything published this run. Live batches form the session
/// record; each replay gets its own record keyed by replay id.
#[derive(Debug, Default)]
pub struct BackupLog {
    session: BackupRecord,
    replays: Vec<ReplayRecord>,
}

impl BackupLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_batch(&mut self, dimensions: &Dimensions, batch: Vec<Metric>) {
        let Some(replay_id) = dimensions.replay_id else {
            self.session.push(batch);
            return;
        };

        match self
            .replays
            .iter_mut()
            .find(|r| r.dimensions.replay_id == Some(replay_id))
        {
            Some(replay) => replay.record.push(batch),
            None => {
                let mut record = BackupRecord::default();
                record.push(batch);
                self.replays.push(ReplayRecord {
                    dimensions: dimensions.clone(),
                    record,
                });
            }
        }
    }

    pub fn session(&self) -> &BackupRecord {
        &self.session
    }

    pub fn replay(&self, replay_id: u64) -> Option<&ReplayRecord> {
        self.replays
            .iter()
            .find(|r| r.dimensions.replay_id == Some(replay_id))
    }

    pub fn replays(&self) -> &[ReplayRecord] {
        &self.replays
    }
}
