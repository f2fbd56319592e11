//! SQLite-backed local store.
//!
//! One database file holds:
//! - the replicated entity tables (`tasks`, `habits`, `workout_days`)
//! - the append-only `change_log` ledger
//! - a `kv` table for scalar sync state (cursor, auth token, device id)
//!
//! The connection sits behind a mutex so one `Arc<Database>` can be shared
//! between the host's CRUD layer and the sync engine; ledger mutations are
//! therefore mutually exclusive, which the reconciliation algorithm assumes.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::ledger::{now_ms, ChangeAction, ChangeLedger, ChangeRecord, EntityKind};
use super::{data_dir, EntityStore, SyncPrefs};
use crate::error::StorageError;
use crate::model::{Habit, HabitFrequency, Task, TaskStatus, WorkoutDay};

const KV_CURSOR: &str = "last_sync_timestamp";
const KV_AUTH_TOKEN: &str = "auth_token";
const KV_DEVICE_ID: &str = "device_id";

/// Embedded SQLite database for the client applications.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/lifehub/lifehub.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()?.join("lifehub.db");
        Self::open_at(path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, StorageError> {
        let conn = Connection::open(&path)
            .map_err(|source| StorageError::OpenFailed { path, source })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests and ephemeral hosts).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|source| StorageError::OpenFailed {
                path: PathBuf::from(":memory:"),
                source,
            })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT,
                status      TEXT NOT NULL,
                due_at      TEXT,
                priority    INTEGER NOT NULL DEFAULT 0,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS habits (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                frequency   TEXT NOT NULL,
                streak      INTEGER NOT NULL DEFAULT 0,
                archived    INTEGER NOT NULL DEFAULT 0,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workout_days (
                id          TEXT PRIMARY KEY,
                date        TEXT NOT NULL,
                label       TEXT NOT NULL DEFAULT '',
                rest_day    INTEGER NOT NULL DEFAULT 0,
                completed   INTEGER NOT NULL DEFAULT 0,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS change_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_kind TEXT NOT NULL,
                entity_id   TEXT NOT NULL,
                action      TEXT NOT NULL,
                timestamp   INTEGER NOT NULL,
                is_synced   INTEGER NOT NULL DEFAULT 0,
                is_local    INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_change_log_timestamp ON change_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_change_log_key ON change_log(entity_kind, entity_id);",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn parse_datetime(key: &str, s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn parse_date(key: &str, s: &str) -> Result<NaiveDate, StorageError> {
    s.parse().map_err(|e: chrono::ParseError| StorageError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

impl EntityStore for Database {
    fn upsert_task(&self, task: &Task) -> Result<(), StorageError> {
        let status = match task.status {
            TaskStatus::Open => "OPEN",
            TaskStatus::Done => "DONE",
            TaskStatus::Archived => "ARCHIVED",
        };
        self.conn().execute(
            "INSERT OR REPLACE INTO tasks (id, title, description, status, due_at, priority, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id,
                task.title,
                task.description,
                status,
                task.due_at.map(|d| d.to_rfc3339()),
                task.priority,
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        let row = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, title, description, status, due_at, priority, updated_at
                 FROM tasks WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i32>(5)?,
                    row.get::<_, String>(6)?,
                ))
            });
            match result {
                Ok(row) => row,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        let (id, title, description, status, due_at, priority, updated_at) = row;
        let status = match status.as_str() {
            "DONE" => TaskStatus::Done,
            "ARCHIVED" => TaskStatus::Archived,
            _ => TaskStatus::Open,
        };
        Ok(Some(Task {
            id,
            title,
            description,
            status,
            due_at: due_at
                .map(|s| parse_datetime("tasks.due_at", &s))
                .transpose()?,
            priority,
            updated_at: parse_datetime("tasks.updated_at", &updated_at)?,
        }))
    }

    fn delete_task(&self, id: &str) -> Result<(), StorageError> {
        self.conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn upsert_habit(&self, habit: &Habit) -> Result<(), StorageError> {
        let frequency = match habit.frequency {
            HabitFrequency::Daily => "DAILY",
            HabitFrequency::Weekly => "WEEKLY",
        };
        self.conn().execute(
            "INSERT OR REPLACE INTO habits (id, title, frequency, streak, archived, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                habit.id,
                habit.title,
                frequency,
                habit.streak,
                habit.archived,
                habit.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_habit(&self, id: &str) -> Result<Option<Habit>, StorageError> {
        let row = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, title, frequency, streak, archived, updated_at
                 FROM habits WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, String>(5)?,
                ))
            });
            match result {
                Ok(row) => row,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        let (id, title, frequency, streak, archived, updated_at) = row;
        let frequency = match frequency.as_str() {
            "WEEKLY" => HabitFrequency::Weekly,
            _ => HabitFrequency::Daily,
        };
        Ok(Some(Habit {
            id,
            title,
            frequency,
            streak,
            archived,
            updated_at: parse_datetime("habits.updated_at", &updated_at)?,
        }))
    }

    fn delete_habit(&self, id: &str) -> Result<(), StorageError> {
        self.conn()
            .execute("DELETE FROM habits WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn upsert_workout_day(&self, day: &WorkoutDay) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO workout_days (id, date, label, rest_day, completed, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                day.id,
                day.date.to_string(),
                day.label,
                day.rest_day,
                day.completed,
                day.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_workout_day(&self, id: &str) -> Result<Option<WorkoutDay>, StorageError> {
        let row = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, date, label, rest_day, completed, updated_at
                 FROM workout_days WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, String>(5)?,
                ))
            });
            match result {
                Ok(row) => row,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        let (id, date, label, rest_day, completed, updated_at) = row;
        Ok(Some(WorkoutDay {
            id,
            date: parse_date("workout_days.date", &date)?,
            label,
            rest_day,
            completed,
            updated_at: parse_datetime("workout_days.updated_at", &updated_at)?,
        }))
    }

    fn delete_workout_day(&self, id: &str) -> Result<(), StorageError> {
        self.conn()
            .execute("DELETE FROM workout_days WHERE id = ?1", params![id])?;
        Ok(())
    }
}

impl ChangeLedger for Database {
    fn record(
        &self,
        kind: EntityKind,
        entity_id: &str,
        action: ChangeAction,
    ) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT INTO change_log (entity_kind, entity_id, action, timestamp, is_synced, is_local)
             VALUES (?1, ?2, ?3, ?4, 0, 1)",
            params![kind.as_str(), entity_id, action.as_str(), now_ms()],
        )?;
        Ok(())
    }

    fn ingest(
        &self,
        kind: EntityKind,
        entity_id: &str,
        action: ChangeAction,
    ) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT INTO change_log (entity_kind, entity_id, action, timestamp, is_synced, is_local)
             VALUES (?1, ?2, ?3, ?4, 1, 0)",
            params![kind.as_str(), entity_id, action.as_str(), now_ms()],
        )?;
        Ok(())
    }

    fn pending_since(&self, cursor: i64) -> Result<Vec<ChangeRecord>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT entity_kind, entity_id, action, timestamp, is_synced, is_local
             FROM change_log WHERE timestamp > ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![cursor], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (kind, entity_id, action, timestamp, is_synced, is_local) = row?;
            let entity_kind =
                EntityKind::parse(&kind).ok_or_else(|| StorageError::InvalidValue {
                    key: "change_log.entity_kind".to_string(),
                    message: kind.clone(),
                })?;
            let action =
                ChangeAction::parse(&action).ok_or_else(|| StorageError::InvalidValue {
                    key: "change_log.action".to_string(),
                    message: action.clone(),
                })?;
            records.push(ChangeRecord {
                entity_kind,
                entity_id,
                action,
                timestamp,
                is_synced,
                is_local,
            });
        }
        Ok(records)
    }

    fn mark_synced(&self, kind: EntityKind, entity_id: &str) -> Result<(), StorageError> {
        self.conn().execute(
            "UPDATE change_log SET is_synced = 1
             WHERE id = (SELECT id FROM change_log
                         WHERE entity_kind = ?1 AND entity_id = ?2 AND is_synced = 0
                         ORDER BY timestamp DESC, id DESC LIMIT 1)",
            params![kind.as_str(), entity_id],
        )?;
        Ok(())
    }

    fn pending_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM change_log c
             WHERE c.id = (SELECT MAX(id) FROM change_log
                           WHERE entity_kind = c.entity_kind AND entity_id = c.entity_id)
               AND c.is_local = 1 AND c.is_synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl SyncPrefs for Database {
    fn cursor(&self) -> Result<i64, StorageError> {
        match self.kv_get(KV_CURSOR)? {
            Some(v) => v.parse().map_err(|_| StorageError::InvalidValue {
                key: KV_CURSOR.to_string(),
                message: v,
            }),
            None => Ok(0),
        }
    }

    fn set_cursor(&self, cursor: i64) -> Result<(), StorageError> {
        self.kv_set(KV_CURSOR, &cursor.to_string())
    }

    fn auth_token(&self) -> Result<Option<String>, StorageError> {
        self.kv_get(KV_AUTH_TOKEN)
    }

    fn set_auth_token(&self, token: &str) -> Result<(), StorageError> {
        self.kv_set(KV_AUTH_TOKEN, token)
    }

    fn device_id(&self) -> Result<String, StorageError> {
        if let Some(id) = self.kv_get(KV_DEVICE_ID)? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.kv_set(KV_DEVICE_ID, &id)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_upsert_and_get() {
        let db = Database::open_memory().unwrap();
        let mut task = Task::new("t-1", "Water the plants");
        db.upsert_task(&task).unwrap();

        let loaded = db.get_task("t-1").unwrap().unwrap();
        assert_eq!(loaded.title, "Water the plants");
        assert_eq!(loaded.status, TaskStatus::Open);

        // Upsert overwrites every replicated field.
        task.title = "Water the garden".to_string();
        task.status = TaskStatus::Done;
        db.upsert_task(&task).unwrap();
        let loaded = db.get_task("t-1").unwrap().unwrap();
        assert_eq!(loaded.title, "Water the garden");
        assert_eq!(loaded.status, TaskStatus::Done);
    }

    #[test]
    fn delete_of_missing_row_is_noop() {
        let db = Database::open_memory().unwrap();
        db.delete_task("nope").unwrap();
        db.delete_habit("nope").unwrap();
        db.delete_workout_day("nope").unwrap();
    }

    #[test]
    fn habit_round_trip() {
        let db = Database::open_memory().unwrap();
        let mut habit = Habit::new("h-1", "Stretch");
        habit.frequency = HabitFrequency::Weekly;
        habit.streak = 4;
        db.upsert_habit(&habit).unwrap();

        let loaded = db.get_habit("h-1").unwrap().unwrap();
        assert_eq!(loaded.frequency, HabitFrequency::Weekly);
        assert_eq!(loaded.streak, 4);
    }

    #[test]
    fn workout_day_round_trip() {
        let db = Database::open_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let day = WorkoutDay::new("w-1", date, "Push day");
        db.upsert_workout_day(&day).unwrap();

        let loaded = db.get_workout_day("w-1").unwrap().unwrap();
        assert_eq!(loaded.date, date);
        assert_eq!(loaded.label, "Push day");
    }

    #[test]
    fn ledger_pending_and_mark_synced() {
        let db = Database::open_memory().unwrap();
        db.record(EntityKind::Task, "t-1", ChangeAction::Insert)
            .unwrap();
        db.record(EntityKind::Habit, "h-1", ChangeAction::Delete)
            .unwrap();

        let pending = db.pending_since(0).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].timestamp <= pending[1].timestamp);
        assert_eq!(db.pending_count().unwrap(), 2);

        db.mark_synced(EntityKind::Task, "t-1").unwrap();
        assert_eq!(db.pending_count().unwrap(), 1);

        let pending = db.pending_since(0).unwrap();
        let task_record = pending
            .iter()
            .find(|r| r.entity_kind == EntityKind::Task)
            .unwrap();
        assert!(task_record.is_synced);
    }

    #[test]
    fn ingested_records_are_not_pending() {
        let db = Database::open_memory().unwrap();
        db.ingest(EntityKind::Task, "t-9", ChangeAction::Update)
            .unwrap();
        assert_eq!(db.pending_count().unwrap(), 0);

        let records = db.pending_since(0).unwrap();
        assert!(!records[0].is_local);
        assert!(records[0].is_synced);
    }

    #[test]
    fn cursor_defaults_to_zero_and_persists() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.cursor().unwrap(), 0);
        db.set_cursor(1500).unwrap();
        assert_eq!(db.cursor().unwrap(), 1500);
    }

    #[test]
    fn device_id_is_stable() {
        let db = Database::open_memory().unwrap();
        let first = db.device_id().unwrap();
        let second = db.device_id().unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }
}
