//! # Lifehub Core Library
//!
//! Core synchronization library for Lifehub, a personal life-management
//! suite (tasks, habits, workouts, journal, timers). The mobile and desktop
//! clients keep a local SQLite store and reconcile with the API server
//! through the engine in this crate; the server shares the same ledger
//! contract over its relational store.
//!
//! ## Key components
//!
//! - [`SyncEngine`]: the reconciliation algorithm (push pending changes,
//!   apply the server's reply, advance the timestamp cursor)
//! - [`ChangeLedger`]: append-only log of entity mutations awaiting sync
//! - [`Database`]: embedded SQLite store backing entities, ledger, and
//!   sync preferences on client devices
//! - [`SyncTransport`]: HTTP adapter to the `/sync` endpoint
//!
//! Background scheduling, authentication flows, and the CRUD surfaces for
//! the remaining domains live in the host applications.

pub mod error;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, StorageError};
pub use model::{Habit, HabitFrequency, Task, TaskStatus, WorkoutDay};
pub use storage::{
    ChangeAction, ChangeLedger, ChangeRecord, Database, EntityKind, EntityStore, MemoryLedger,
    SyncPrefs, SyncSettings,
};
pub use sync::{
    AssumeOnline, Connectivity, HttpTransport, SyncEngine, SyncError, SyncItem, SyncPayload,
    SyncReport, SyncStatus, SyncTransport, TcpProbe,
};
