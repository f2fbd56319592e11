//! Offline/online synchronization subsystem.
//!
//! Reconciles locally-created and remotely-created mutations across the
//! network boundary using a last-sync timestamp cursor and per-item action
//! tags. See [`engine::SyncEngine`] for the algorithm.

pub mod engine;
pub mod transport;
pub mod types;


pub use engine::SyncEngine;
pub use transport::{AssumeOnline, Connectivity, HttpTransport, SyncTransport, TcpProbe};
pub use types::{SyncError, SyncItem, SyncPayload, SyncReport, SyncStatus};
