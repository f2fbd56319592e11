mod config;
pub mod database;
pub mod ledger;

pub use config::SyncSettings;
pub use database::Database;
pub use ledger::{ChangeAction, ChangeLedger, ChangeRecord, EntityKind, MemoryLedger};

use std::path::PathBuf;

use crate::error::StorageError;
use crate::model::{Habit, Task, WorkoutDay};

/// Returns `~/.config/lifehub[-dev]/` based on LIFEHUB_ENV.
///
/// Set LIFEHUB_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("LIFEHUB_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("lifehub-dev")
    } else {
        base_dir.join("lifehub")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Read/write access to the replicated entity tables.
///
/// Upserts overwrite every replicated field of an existing row; deleting a
/// missing row is a no-op. Both properties make remote payload application
/// idempotent, which the sync protocol relies on for at-least-once retries.
pub trait EntityStore: Send + Sync {
    fn upsert_task(&self, task: &Task) -> Result<(), StorageError>;
    fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError>;
    fn delete_task(&self, id: &str) -> Result<(), StorageError>;

    fn upsert_habit(&self, habit: &Habit) -> Result<(), StorageError>;
    fn get_habit(&self, id: &str) -> Result<Option<Habit>, StorageError>;
    fn delete_habit(&self, id: &str) -> Result<(), StorageError>;

    fn upsert_workout_day(&self, day: &WorkoutDay) -> Result<(), StorageError>;
    fn get_workout_day(&self, id: &str) -> Result<Option<WorkoutDay>, StorageError>;
    fn delete_workout_day(&self, id: &str) -> Result<(), StorageError>;
}

/// Key-value preferences consumed by the sync subsystem.
pub trait SyncPrefs: Send + Sync {
    /// Last-sync cursor in wall-clock milliseconds; 0 when never synced.
    fn cursor(&self) -> Result<i64, StorageError>;

    /// Persist the cursor. Called by the engine only after a full
    /// round-trip has been applied.
    fn set_cursor(&self, cursor: i64) -> Result<(), StorageError>;

    /// Bearer token for the sync endpoint, if the host has signed in.
    fn auth_token(&self) -> Result<Option<String>, StorageError>;

    fn set_auth_token(&self, token: &str) -> Result<(), StorageError>;

    /// Stable identity for this installation, created on first use.
    fn device_id(&self) -> Result<String, StorageError>;
}
