//! Reconciliation engine for offline/online sync.
//!
//! One `sync()` cycle: read the cursor, collect pending ledger records,
//! push them as a payload, validate the server's reply cursor, apply the
//! remote envelopes (upserts before deletes), resolve acknowledged ledger
//! entries, and persist the new cursor last. Any failure before the apply
//! step leaves local state untouched, which makes `sync()` safe to retry;
//! failures after it are absorbed by idempotent application on the next
//! overlapping window.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::transport::{Connectivity, SyncTransport};
use super::types::{SyncError, SyncItem, SyncPayload, SyncReport, SyncStatus};
use crate::error::StorageError;
use crate::model::{Habit, Task, WorkoutDay};
use crate::storage::{
    ChangeAction, ChangeLedger, ChangeRecord, Database, EntityKind, EntityStore, SyncPrefs,
};

/// Orchestrates one sync cycle against the four collaborators.
///
/// At most one cycle runs at a time per engine; concurrent callers get
/// [`SyncError::InFlight`] instead of racing over the cursor and ledger.
pub struct SyncEngine {
    transport: Box<dyn SyncTransport>,
    connectivity: Box<dyn Connectivity>,
    ledger: Arc<dyn ChangeLedger>,
    entities: Arc<dyn EntityStore>,
    prefs: Arc<dyn SyncPrefs>,
    in_flight: AtomicBool,
}

/// Releases the single-flight slot when a cycle ends, on any path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(
        transport: Box<dyn SyncTransport>,
        connectivity: Box<dyn Connectivity>,
        ledger: Arc<dyn ChangeLedger>,
        entities: Arc<dyn EntityStore>,
        prefs: Arc<dyn SyncPrefs>,
    ) -> Self {
        Self {
            transport,
            connectivity,
            ledger,
            entities,
            prefs,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Convenience constructor for clients: one [`Database`] backs the
    /// ledger, the entity tables, and the preferences.
    pub fn with_database(
        transport: Box<dyn SyncTransport>,
        connectivity: Box<dyn Connectivity>,
        db: Arc<Database>,
    ) -> Self {
        Self::new(
            transport,
            connectivity,
            db.clone(),
            db.clone(),
            db,
        )
    }

    /// Run one push-and-reconcile cycle.
    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }
        let _guard = self.enter()?;

        let cursor = self.prefs.cursor()?;
        let pending = self.ledger.pending_since(cursor)?;
        let outgoing = self.assemble(cursor, pending)?;
        let pushed =
            outgoing.tasks.len() + outgoing.habits.len() + outgoing.workout_days.len();
        debug!("sync: cursor={cursor}, pushing {pushed} envelopes");

        let reply = self
            .transport
            .post(&outgoing)?
            .ok_or_else(|| SyncError::Transport("server returned no payload".to_string()))?;

        self.validate(cursor, &reply)?;
        let applied = self.apply(&reply)?;
        let acked = self.acknowledge(&reply)?;
        self.prefs.set_cursor(reply.last_timestamp)?;

        info!(
            "sync complete: pushed={pushed} applied={applied} acked={acked} cursor={}",
            reply.last_timestamp
        );
        Ok(SyncReport {
            pushed,
            applied,
            acked,
            cursor: reply.last_timestamp,
        })
    }

    /// Fetch-only cycle for read-only and local-first flows: applies the
    /// server's changes since the cursor without pushing anything.
    pub fn pull(&self) -> Result<SyncReport, SyncError> {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }
        let _guard = self.enter()?;

        let cursor = self.prefs.cursor()?;
        let reply = self.transport.fetch(cursor)?;
        self.validate(cursor, &reply)?;
        let applied = self.apply(&reply)?;
        self.prefs.set_cursor(reply.last_timestamp)?;

        info!("pull complete: applied={applied} cursor={}", reply.last_timestamp);
        Ok(SyncReport {
            pushed: 0,
            applied,
            acked: 0,
            cursor: reply.last_timestamp,
        })
    }

    /// Snapshot for the host UI.
    pub fn status(&self) -> Result<SyncStatus, StorageError> {
        Ok(SyncStatus {
            cursor: self.prefs.cursor()?,
            pending: self.ledger.pending_count()?,
            in_flight: self.in_flight.load(Ordering::Acquire),
        })
    }

    fn enter(&self) -> Result<FlightGuard<'_>, SyncError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::InFlight)?;
        Ok(FlightGuard(&self.in_flight))
    }

    fn validate(&self, cursor: i64, reply: &SyncPayload) -> Result<(), SyncError> {
        // An equal cursor is a legitimate "nothing new" reply; only a
        // regression indicates a broken server or clock.
        if reply.last_timestamp < cursor {
            return Err(SyncError::Protocol {
                sent: cursor,
                received: reply.last_timestamp,
            });
        }
        Ok(())
    }

    /// Build the outgoing payload from pending ledger records.
    ///
    /// Rapid edits leave several records per key; only the latest action is
    /// pushed. Records ingested from earlier remote syncs are skipped.
    fn assemble(
        &self,
        cursor: i64,
        pending: Vec<ChangeRecord>,
    ) -> Result<SyncPayload, SyncError> {
        let mut latest: HashMap<(EntityKind, String), ChangeRecord> = HashMap::new();
        for record in pending {
            if !record.is_local || record.is_synced {
                continue;
            }
            latest.insert((record.entity_kind, record.entity_id.clone()), record);
        }
        let mut collapsed: Vec<ChangeRecord> = latest.into_values().collect();
        collapsed.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        let mut payload = SyncPayload::empty(cursor);
        for record in collapsed {
            match record.entity_kind {
                EntityKind::Task => {
                    if let Some(item) = self.task_for(&record)? {
                        payload.tasks.push(SyncItem::new(item, record.action));
                    }
                }
                EntityKind::Habit => {
                    if let Some(item) = self.habit_for(&record)? {
                        payload.habits.push(SyncItem::new(item, record.action));
                    }
                }
                EntityKind::WorkoutDay => {
                    if let Some(item) = self.workout_day_for(&record)? {
                        payload.workout_days.push(SyncItem::new(item, record.action));
                    }
                }
            }
        }
        Ok(payload)
    }

    fn task_for(&self, record: &ChangeRecord) -> Result<Option<Task>, SyncError> {
        match (self.entities.get_task(&record.entity_id)?, record.action) {
            (Some(task), _) => Ok(Some(task)),
            // The row is gone; the server only needs the id for a delete.
            (None, ChangeAction::Delete) => Ok(Some(Task::tombstone(&record.entity_id))),
            (None, action) => {
                warn!(
                    "pending {} for missing task {}, skipping",
                    action.as_str(),
                    record.entity_id
                );
                Ok(None)
            }
        }
    }

    fn habit_for(&self, record: &ChangeRecord) -> Result<Option<Habit>, SyncError> {
        match (self.entities.get_habit(&record.entity_id)?, record.action) {
            (Some(habit), _) => Ok(Some(habit)),
            (None, ChangeAction::Delete) => Ok(Some(Habit::tombstone(&record.entity_id))),
            (None, action) => {
                warn!(
                    "pending {} for missing habit {}, skipping",
                    action.as_str(),
                    record.entity_id
                );
                Ok(None)
            }
        }
    }

    fn workout_day_for(&self, record: &ChangeRecord) -> Result<Option<WorkoutDay>, SyncError> {
        match (
            self.entities.get_workout_day(&record.entity_id)?,
            record.action,
        ) {
            (Some(day), _) => Ok(Some(day)),
            (None, ChangeAction::Delete) => {
                Ok(Some(WorkoutDay::tombstone(&record.entity_id)))
            }
            (None, action) => {
                warn!(
                    "pending {} for missing workout day {}, skipping",
                    action.as_str(),
                    record.entity_id
                );
                Ok(None)
            }
        }
    }

    /// Apply the server's envelopes to local storage.
    ///
    /// Per entity kind: upserts first in list order, then deletes, so a
    /// delete for an id is never superseded by a stale insert or update for
    /// the same id arriving in the same payload.
    fn apply(&self, reply: &SyncPayload) -> Result<usize, SyncError> {
        let mut applied = 0;

        for item in reply.tasks.iter().filter(|i| i.action != ChangeAction::Delete) {
            self.entities.upsert_task(&item.item)?;
            self.ledger
                .ingest(EntityKind::Task, &item.item.id, item.action)?;
            applied += 1;
        }
        for item in reply.tasks.iter().filter(|i| i.action == ChangeAction::Delete) {
            self.entities.delete_task(&item.item.id)?;
            self.ledger
                .ingest(EntityKind::Task, &item.item.id, ChangeAction::Delete)?;
            applied += 1;
        }

        for item in reply.habits.iter().filter(|i| i.action != ChangeAction::Delete) {
            self.entities.upsert_habit(&item.item)?;
            self.ledger
                .ingest(EntityKind::Habit, &item.item.id, item.action)?;
            applied += 1;
        }
        for item in reply.habits.iter().filter(|i| i.action == ChangeAction::Delete) {
            self.entities.delete_habit(&item.item.id)?;
            self.ledger
                .ingest(EntityKind::Habit, &item.item.id, ChangeAction::Delete)?;
            applied += 1;
        }

        for item in reply
            .workout_days
            .iter()
            .filter(|i| i.action != ChangeAction::Delete)
        {
            self.entities.upsert_workout_day(&item.item)?;
            self.ledger
                .ingest(EntityKind::WorkoutDay, &item.item.id, item.action)?;
            applied += 1;
        }
        for item in reply
            .workout_days
            .iter()
            .filter(|i| i.action == ChangeAction::Delete)
        {
            self.entities.delete_workout_day(&item.item.id)?;
            self.ledger
                .ingest(EntityKind::WorkoutDay, &item.item.id, ChangeAction::Delete)?;
            applied += 1;
        }

        Ok(applied)
    }

    /// Resolve ledger entries the server acknowledged.
    fn acknowledge(&self, reply: &SyncPayload) -> Result<usize, SyncError> {
        let mut acked = 0;
        for item in &reply.tasks_synced {
            self.ledger.mark_synced(EntityKind::Task, &item.item.id)?;
            acked += 1;
        }
        for item in &reply.habits_synced {
            self.ledger.mark_synced(EntityKind::Habit, &item.item.id)?;
            acked += 1;
        }
        Ok(acked)
    }
}
