//! Append-only change ledger.
//!
//! Every local entity mutation appends one [`ChangeRecord`]; the sync engine
//! reads the records past the last-sync cursor to assemble an outgoing
//! payload, and flips `is_synced` once the server acknowledges them. The
//! ledger is never compacted here; retention is a maintenance concern of the
//! host application.
//!
//! One interface, two backing stores: [`crate::storage::Database`] (embedded
//! SQLite, used by the client apps) and [`MemoryLedger`] (tests and
//! ephemeral hosts).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::StorageError;

/// Entity kinds tracked by the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Task,
    Habit,
    WorkoutDay,
}

impl EntityKind {
    /// Stable name used in the `change_log` table.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Habit => "habit",
            EntityKind::WorkoutDay => "workout_day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(EntityKind::Task),
            "habit" => Some(EntityKind::Habit),
            "workout_day" => Some(EntityKind::WorkoutDay),
            _ => None,
        }
    }
}

/// Mutation kind carried by ledger records and sync envelopes.
///
/// Wire form is uppercase (`"INSERT"` / `"UPDATE"` / `"DELETE"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl ChangeAction {
    /// Stable name, identical to the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Insert => "INSERT",
            ChangeAction::Update => "UPDATE",
            ChangeAction::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeAction::Insert),
            "UPDATE" => Some(ChangeAction::Update),
            "DELETE" => Some(ChangeAction::Delete),
            _ => None,
        }
    }
}

/// One row of the change ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub action: ChangeAction,
    /// Wall-clock milliseconds assigned at mutation time
    pub timestamp: i64,
    /// True once the server acknowledged this change
    pub is_synced: bool,
    /// False for records ingested from a remote sync
    pub is_local: bool,
}

/// Current wall-clock time in milliseconds, the ledger's timestamp unit.
pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Contract of the change ledger.
///
/// Mutations for the same (kind, id) key are serialized by the
/// implementation; `pending_since` is a pure read.
pub trait ChangeLedger: Send + Sync {
    /// Append a locally-originated record (`is_local = true`,
    /// `is_synced = false`) stamped with the current time.
    fn record(
        &self,
        kind: EntityKind,
        entity_id: &str,
        action: ChangeAction,
    ) -> Result<(), StorageError>;

    /// Append a record for a change applied from a remote payload
    /// (`is_local = false`, `is_synced = true`).
    fn ingest(
        &self,
        kind: EntityKind,
        entity_id: &str,
        action: ChangeAction,
    ) -> Result<(), StorageError>;

    /// All records with `timestamp > cursor`, ascending by timestamp with
    /// insertion order as the tie-break for equal timestamps.
    fn pending_since(&self, cursor: i64) -> Result<Vec<ChangeRecord>, StorageError>;

    /// Flip `is_synced` on the most recent unresolved record for the key.
    fn mark_synced(&self, kind: EntityKind, entity_id: &str) -> Result<(), StorageError>;

    /// Number of distinct keys whose latest record is local and unsynced.
    ///
    /// Rapid edits to one entity append several records; only the latest one
    /// decides whether the key still awaits a round-trip.
    fn pending_count(&self) -> Result<usize, StorageError>;
}

/// In-process ledger backed by a `Vec`.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<ChangeRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, kind: EntityKind, entity_id: &str, action: ChangeAction, is_local: bool) {
        let mut records = self.records.lock().expect("ledger mutex poisoned");
        records.push(ChangeRecord {
            entity_kind: kind,
            entity_id: entity_id.to_string(),
            action,
            timestamp: now_ms(),
            is_synced: !is_local,
            is_local,
        });
    }
}

impl ChangeLedger for MemoryLedger {
    fn record(
        &self,
        kind: EntityKind,
        entity_id: &str,
        action: ChangeAction,
    ) -> Result<(), StorageError> {
        self.append(kind, entity_id, action, true);
        Ok(())
    }

    fn ingest(
        &self,
        kind: EntityKind,
        entity_id: &str,
        action: ChangeAction,
    ) -> Result<(), StorageError> {
        self.append(kind, entity_id, action, false);
        Ok(())
    }

    fn pending_since(&self, cursor: i64) -> Result<Vec<ChangeRecord>, StorageError> {
        let records = self.records.lock().expect("ledger mutex poisoned");
        let mut out: Vec<ChangeRecord> = records
            .iter()
            .filter(|r| r.timestamp > cursor)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    fn mark_synced(&self, kind: EntityKind, entity_id: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock().expect("ledger mutex poisoned");
        if let Some(record) = records
            .iter_mut()
            .rev()
            .find(|r| r.entity_kind == kind && r.entity_id == entity_id && !r.is_synced)
        {
            record.is_synced = true;
        }
        Ok(())
    }

    fn pending_count(&self) -> Result<usize, StorageError> {
        let records = self.records.lock().expect("ledger mutex poisoned");
        let mut latest: std::collections::HashMap<(EntityKind, &str), &ChangeRecord> =
            std::collections::HashMap::new();
        for record in records.iter() {
            latest.insert((record.entity_kind, record.entity_id.as_str()), record);
        }
        Ok(latest
            .values()
            .filter(|r| r.is_local && !r.is_synced)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_local_and_unsynced() {
        let ledger = MemoryLedger::new();
        ledger
            .record(EntityKind::Task, "t-1", ChangeAction::Insert)
            .unwrap();

        let pending = ledger.pending_since(0).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_local);
        assert!(!pending[0].is_synced);
        assert_eq!(pending[0].action, ChangeAction::Insert);
    }

    #[test]
    fn ingest_is_remote_and_already_synced() {
        let ledger = MemoryLedger::new();
        ledger
            .ingest(EntityKind::Habit, "h-1", ChangeAction::Update)
            .unwrap();

        let pending = ledger.pending_since(0).unwrap();
        assert!(!pending[0].is_local);
        assert!(pending[0].is_synced);
        assert_eq!(ledger.pending_count().unwrap(), 0);
    }

    #[test]
    fn pending_since_filters_by_cursor() {
        let ledger = MemoryLedger::new();
        ledger
            .record(EntityKind::Task, "t-1", ChangeAction::Insert)
            .unwrap();

        let far_future = now_ms() + 60_000;
        assert!(ledger.pending_since(far_future).unwrap().is_empty());
        assert_eq!(ledger.pending_since(0).unwrap().len(), 1);
    }

    #[test]
    fn mark_synced_resolves_latest_record_only() {
        let ledger = MemoryLedger::new();
        ledger
            .record(EntityKind::Task, "t-1", ChangeAction::Insert)
            .unwrap();
        ledger
            .record(EntityKind::Task, "t-1", ChangeAction::Update)
            .unwrap();

        ledger.mark_synced(EntityKind::Task, "t-1").unwrap();

        let records = ledger.pending_since(0).unwrap();
        // Latest record resolved, the earlier one stays as history.
        assert!(records.last().unwrap().is_synced);
        assert!(!records.first().unwrap().is_synced);
        // The key is no longer pending once its latest record is resolved.
        assert_eq!(ledger.pending_count().unwrap(), 0);
    }

    #[test]
    fn pending_count_is_per_key() {
        let ledger = MemoryLedger::new();
        ledger
            .record(EntityKind::Task, "t-1", ChangeAction::Insert)
            .unwrap();
        ledger
            .record(EntityKind::Task, "t-1", ChangeAction::Update)
            .unwrap();
        ledger
            .record(EntityKind::Habit, "h-1", ChangeAction::Insert)
            .unwrap();

        assert_eq!(ledger.pending_count().unwrap(), 2);
    }
}
