//! Sync cycle and queue status reports

use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Per-intent failure detail collected during a sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorDetail {
    /// Task whose intent failed to dispatch
    pub task_id: TaskId,
    /// Error message reported by the remote
    pub message: String,
}

/// Aggregated outcome of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Intents selected into the batch
    pub total: usize,
    /// Intents acknowledged (including resolved conflicts)
    pub successful: usize,
    /// Intents that failed transiently
    pub failed: usize,
    /// Acknowledged intents that required conflict resolution
    pub conflicts: usize,
    /// Failure details, one per failed intent
    pub errors: Vec<SyncErrorDetail>,
}

/// Read-only snapshot of the intent queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Intents below the retry ceiling, still eligible for dispatch
    pub pending_operations: u64,
    /// Intents at or above the retry ceiling, parked until operator action
    pub failed_operations: u64,
    /// Most recent failed attempt across all intents (Unix ms)
    pub last_sync_attempt: Option<i64>,
}
