//! Task model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a task, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Reconciliation state of a task against the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// A local mutation has not yet been reconciled with the remote
    Pending,
    /// The last known local state matches the remote
    Synced,
    /// The retry ceiling was exhausted without success
    Error,
}

impl SyncStatus {
    /// Database/text representation of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }

    /// Parse the database/text representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,
    /// Short task title
    pub title: String,
    /// Optional longer description
    pub description: Option<String>,
    /// Completion flag
    pub completed: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), advances on every local mutation
    pub updated_at: i64,
    /// Soft delete flag; deleted tasks are retained for sync bookkeeping
    pub deleted: bool,
    /// Reconciliation state against the remote
    pub sync_status: SyncStatus,
    /// Identifier assigned by the remote once reconciled
    pub remote_id: Option<String>,
    /// Timestamp of the last successful reconciliation (Unix ms)
    pub last_synced_at: Option<i64>,
}

impl Task {
    /// Create a new task awaiting its first reconciliation
    #[must_use]
    pub fn new(title: impl Into<String>, description: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: TaskId::new(),
            title: title.into(),
            description,
            completed: false,
            created_at: now,
            updated_at: now,
            deleted: false,
            sync_status: SyncStatus::Pending,
            remote_id: None,
            last_synced_at: None,
        }
    }

    /// Check if the title is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
    }
}

/// Partial update applied to a task; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New completion flag
    pub completed: Option<bool>,
}

impl TaskPatch {
    /// Check whether the patch changes anything at all
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.completed.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_unique() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        let parsed: TaskId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_task_new() {
        let task = Task::new("Buy milk", None);
        assert_eq!(task.title, "Buy milk");
        assert!(!task.completed);
        assert!(!task.deleted);
        assert_eq!(task.sync_status, SyncStatus::Pending);
        assert!(task.remote_id.is_none());
        assert!(task.last_synced_at.is_none());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn test_sync_status_round_trip() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Error] {
            assert_eq!(SyncStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncStatus::parse("bogus"), None);
    }

    #[test]
    fn test_patch_is_noop() {
        assert!(TaskPatch::default().is_noop());
        let patch = TaskPatch {
            completed: Some(true),
            ..TaskPatch::default()
        };
        assert!(!patch.is_noop());
    }

    #[test]
    fn test_is_empty() {
        let empty = Task::new("   ", None);
        assert!(empty.is_empty());

        let not_empty = Task::new("Do laundry", None);
        assert!(!not_empty.is_empty());
    }
}
