//! Mutation intent model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::task::{Task, TaskId};

/// A unique identifier for a queued intent, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    /// Create a new unique intent ID using UUID v7
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

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IntentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of mutation a queued intent replays against the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    /// Task was created locally
    Create,
    /// Task fields were updated locally
    Update,
    /// Task was soft-deleted locally
    Delete,
}

impl IntentKind {
    /// Database/text representation of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse the database/text representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, durably queued mutation awaiting reconciliation.
///
/// Carries a full snapshot of the task at mutation time, not a diff —
/// conflict resolution needs the complete local view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Unique identifier, assigned at enqueue time
    pub id: IntentId,
    /// Mutation kind
    pub kind: IntentKind,
    /// The target task
    pub task_id: TaskId,
    /// Full task state at enqueue time
    pub snapshot: Task,
    /// Failed dispatch attempts so far
    pub retry_count: u32,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Timestamp of the most recent failed attempt (Unix ms)
    pub last_attempted_at: Option<i64>,
    /// Error message from the most recent failed attempt
    pub last_error: Option<String>,
}

impl Intent {
    /// Create a new intent for the given mutation and post-mutation snapshot
    #[must_use]
    pub fn new(kind: IntentKind, snapshot: Task) -> Self {
        Self {
            id: IntentId::new(),
            kind,
            task_id: snapshot.id,
            snapshot,
            retry_count: 0,
            created_at: chrono::Utc::now().timestamp_millis(),
            last_attempted_at: None,
            last_error: None,
        }
    }
}
