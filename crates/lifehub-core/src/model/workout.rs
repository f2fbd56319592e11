//! Workout day model as replicated by the sync protocol.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One planned day in a workout program.
///
/// Exercise details stay in the workout repository; the sync protocol only
/// replicates the day itself and its completion flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDay {
    /// Unique identifier, stable across devices
    pub id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub rest_day: bool,
    #[serde(default)]
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl WorkoutDay {
    /// Create a new planned day.
    pub fn new(id: impl Into<String>, date: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            date,
            label: label.into(),
            rest_day: false,
            completed: false,
            updated_at: Utc::now(),
        }
    }

    /// Placeholder for a DELETE envelope when the row is already gone
    /// from local storage.
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self::new(id, NaiveDate::default(), "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trips_as_iso() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let day = WorkoutDay::new("w-1", date, "Push day");
        let json = serde_json::to_value(&day).unwrap();
        assert_eq!(json["date"], "2026-03-14");
        assert_eq!(json["restDay"], false);

        let back: WorkoutDay = serde_json::from_value(json).unwrap();
        assert_eq!(back, day);
    }
}
