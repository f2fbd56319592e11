//! Task model as replicated by the sync protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task completion status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Task is open and actionable
    Open,
    /// Task is completed (terminal state)
    Done,
    /// Task is archived and hidden from lists
    Archived,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Open
    }
}

/// A to-do item.
///
/// The mobile clients serialize camelCase JSON, mirrored here with serde
/// rename attributes. `id` is generated locally (uuid v4) and is stable
/// across sync; `updated_at` is the last mutation time on whichever device
/// touched the task most recently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier, stable across devices
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// Higher value sorts first in the clients
    #[serde(default)]
    pub priority: i32,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new open task.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Open,
            due_at: None,
            priority: 0,
            updated_at: Utc::now(),
        }
    }

    /// Placeholder for a DELETE envelope when the row is already gone
    /// from local storage. The server only needs the id.
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self::new(id, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_camel_case() {
        let task = Task::new("t-1", "Water the plants");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["id"], "t-1");
        assert_eq!(json["status"], "OPEN");
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("dueAt").is_some());
    }

    #[test]
    fn deserializes_with_missing_optionals() {
        let task: Task = serde_json::from_str(
            r#"{"id":"t-2","title":"Read","updatedAt":"2026-01-10T08:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.priority, 0);
        assert!(task.due_at.is_none());
    }
}
