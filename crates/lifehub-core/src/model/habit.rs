//! Habit model as replicated by the sync protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How often a habit is due.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HabitFrequency {
    Daily,
    Weekly,
}

impl Default for HabitFrequency {
    fn default() -> Self {
        HabitFrequency::Daily
    }
}

/// A recurring habit with a completion streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    /// Unique identifier, stable across devices
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub frequency: HabitFrequency,
    /// Consecutive completions at the habit's frequency
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
}

impl Habit {
    /// Create a new daily habit.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            frequency: HabitFrequency::Daily,
            streak: 0,
            archived: false,
            updated_at: Utc::now(),
        }
    }

    /// Placeholder for a DELETE envelope when the row is already gone
    /// from local storage.
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self::new(id, "")
    }
}
