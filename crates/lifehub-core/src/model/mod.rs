//! Sync-facing domain models.
//!
//! These are the replicated shapes of the three entity kinds the sync
//! protocol tracks. The full CRUD models (recipes, finance, journal, ...)
//! live with their repositories in the host applications; only the fields
//! that cross the network boundary are defined here.

mod habit;
mod task;
mod workout;

pub use habit::{Habit, HabitFrequency};
pub use task::{Task, TaskStatus};
pub use workout::WorkoutDay;
