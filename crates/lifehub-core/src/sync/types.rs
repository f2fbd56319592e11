//! Wire model and result types for the sync protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StorageError;
use crate::model::{Habit, Task, WorkoutDay};
use crate::storage::ChangeAction;

/// One domain item paired with the mutation that produced it.
///
/// Transient: envelopes are built per sync cycle and do not outlive the
/// round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem<T> {
    pub item: T,
    pub action: ChangeAction,
    /// Server-side identifier, echoed back when the server assigns one.
    #[serde(rename = "remoteId", default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl<T> SyncItem<T> {
    pub fn new(item: T, action: ChangeAction) -> Self {
        Self {
            item,
            action,
            remote_id: None,
        }
    }
}

/// The unit exchanged between client and server.
///
/// In a request `lastTimeStamp` is the cursor from the prior successful
/// sync and the `*Synced` lists are empty; in a response `lastTimeStamp` is
/// the server's high-water mark and the `*Synced` lists acknowledge items
/// the server durably received from this client's earlier push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncPayload {
    pub tasks: Vec<SyncItem<Task>>,
    pub habits: Vec<SyncItem<Habit>>,
    pub workout_days: Vec<SyncItem<WorkoutDay>>,
    pub tasks_synced: Vec<SyncItem<Task>>,
    pub habits_synced: Vec<SyncItem<Habit>>,
    #[serde(rename = "lastTimeStamp")]
    pub last_timestamp: i64,
}

impl SyncPayload {
    /// An empty payload carrying only a cursor.
    pub fn empty(cursor: i64) -> Self {
        Self {
            last_timestamp: cursor,
            ..Self::default()
        }
    }

    /// True when no envelopes are present in any list.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
            && self.habits.is_empty()
            && self.workout_days.is_empty()
            && self.tasks_synced.is_empty()
            && self.habits_synced.is_empty()
    }
}

/// Snapshot of the sync subsystem for the host UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Last-sync cursor in wall-clock milliseconds; 0 when never synced.
    pub cursor: i64,
    /// Distinct entities awaiting a round-trip.
    pub pending: usize,
    /// Whether a sync is currently running.
    pub in_flight: bool,
}

/// Counts from one completed sync cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Envelopes sent to the server
    pub pushed: usize,
    /// Remote envelopes applied locally
    pub applied: usize,
    /// Ledger entries acknowledged by the server
    pub acked: usize,
    /// Cursor after this cycle
    pub cursor: i64,
}

/// Sync failure taxonomy.
///
/// Every variant is returned as an `Err` value; the engine never panics
/// across its boundary for expected conditions.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Pre-flight connectivity guard; retry when the network returns.
    #[error("no network connectivity")]
    Offline,

    /// Another sync is running against the same store.
    #[error("a sync is already in flight")]
    InFlight,

    /// Network or serialization failure mid-call. Local state is untouched,
    /// so the caller may retry safely.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server's cursor regressed below the one we sent. Indicates a
    /// server or clock bug; not retried automatically.
    #[error("protocol error: server cursor {received} is behind request cursor {sent}")]
    Protocol { sent: i64, received: i64 },

    /// Local ledger or cursor store unavailable.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
