// ⚠️ Conflicts - disagreeing values are recorded, never resolved
// The merge engine hands every conflict to a sink and keeps going.

use crate::network::{EntityId, EntitySpec};
use serde::{Deserialize, Serialize};

/// A source value that disagreed with the value already in a target cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub source: EntitySpec,
    pub source_column: String,
    pub target: EntityId,
    pub target_column: String,
}

impl ConflictRecord {
    pub fn new(
        source: EntitySpec,
        source_column: impl Into<String>,
        target: EntityId,
        target_column: impl Into<String>,
    ) -> Self {
        ConflictRecord {
            source,
            source_column: source_column.into(),
            target,
            target_column: target_column.into(),
        }
    }
}

/// Receiver for conflicts as they are found. Must not fail.
pub trait ConflictSink {
    fn add_conflict(&mut self, record: &ConflictRecord);
}

/// Collects conflicts in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ConflictCollector {
    records: Vec<ConflictRecord>,
}

impl ConflictCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ConflictRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Conflicts recorded against one target cell.
    pub fn for_cell(&self, target: EntityId, column: &str) -> Vec<&ConflictRecord> {
        self.records
            .iter()
            .filter(|r| r.target == target && r.target_column == column)
            .collect()
    }

    pub fn into_records(self) -> Vec<ConflictRecord> {
        self.records
    }
}

impl ConflictSink for ConflictCollector {
    fn add_conflict(&mut self, record: &ConflictRecord) {
        self.records.push(record.clone());
    }
}

impl<F> ConflictSink for F
where
    F: FnMut(&ConflictRecord),
{
    fn add_conflict(&mut self, record: &ConflictRecord) {
        self(record)
    }
}
