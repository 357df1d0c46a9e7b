use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::models::{ShiftParticipationRecord, Venue};
use crate::ingest::ShiftLog;

/// Every stage works on one `(game_id, venue)` at a time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub game_id: String,
    pub venue: Venue,
}

/// Read-only view of the rows for one game and bench, in input order.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    pub key: &'a PartitionKey,
    pub rows: Vec<&'a ShiftParticipationRecord>,
}

/// Owns the shift log for a single ETL run.
///
/// Built once, handed to the engine by reference, dropped when the run ends.
/// Stages only ever see borrowed partitions.
#[derive(Debug, Default)]
pub struct RunContext {
    records: Vec<ShiftParticipationRecord>,
    index: BTreeMap<PartitionKey, Vec<usize>>,
    skipped_rows: usize,
}

impl RunContext {
    pub fn new(records: Vec<ShiftParticipationRecord>) -> Self {
        let mut index: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
        for (i, rec) in records.iter().enumerate() {
            index
                .entry(PartitionKey {
                    game_id: rec.game_id.clone(),
                    venue: rec.venue,
                })
                .or_default()
                .push(i);
        }
        RunContext {
            records,
            index,
            skipped_rows: 0,
        }
    }

    /// Keep the loader's malformed-row count so it reaches the run report.
    pub fn from_log(log: ShiftLog) -> Self {
        RunContext {
            skipped_rows: log.skipped_rows,
            ..Self::new(log.records)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Partitions ordered by `(game_id, venue)`.
    pub fn partitions(&self) -> Vec<Partition<'_>> {
        self.index
            .iter()
            .map(|(key, rows)| Partition {
                key,
                rows: rows.iter().map(|&i| &self.records[i]).collect(),
            })
            .collect()
    }
}
