//! Remote peer abstraction for intent dispatch

use crate::models::{Intent, Task};

/// Outcome of submitting one intent to the remote.
///
/// A conflict is a successful round-trip where both sides agree there is a
/// version disagreement to settle; a transient error is a failure to
/// communicate at all. Implementations must absorb their own timeouts and
/// report them as `Transient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The remote accepted the mutation
    Acknowledged {
        /// Identifier the remote assigned to the record, if any
        remote_id: Option<String>,
    },
    /// The remote holds a competing version of the same record
    Conflict {
        /// The remote's view of the record
        remote: Box<Task>,
    },
    /// The remote could not be reached or returned a retryable failure
    Transient {
        /// Diagnostic recorded in the retry ledger
        message: String,
    },
}

/// A remote authority that accepts mutation intents.
///
/// Retried submissions for the same intent must be harmless; the engine
/// re-dispatches after transient failures.
#[allow(async_fn_in_trait)]
pub trait Remote {
    /// Submit one intent for reconciliation
    async fn submit(&self, intent: &Intent) -> SubmitOutcome;
}

/// In-process remote that acknowledges every submission.
///
/// Stands in for a backend that accepts all writes; the task id doubles as
/// the remote id. Used by interfaces that have no real endpoint configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackRemote;

impl Remote for LoopbackRemote {
    async fn submit(&self, intent: &Intent) -> SubmitOutcome {
        SubmitOutcome::Acknowledged {
            remote_id: Some(intent.task_id.to_string()),
        }
    }
}

/// Programmable remote for tests: replays a scripted sequence of outcomes,
/// then falls back to a fixed outcome (if any).
#[cfg(test)]
pub(crate) struct ScriptedRemote {
    outcomes: std::sync::Mutex<std::collections::VecDeque<SubmitOutcome>>,
    fallback: Option<SubmitOutcome>,
    submissions: std::sync::Mutex<Vec<Intent>>,
}

#[cfg(test)]
impl ScriptedRemote {
    pub fn new(outcomes: impl IntoIterator<Item = SubmitOutcome>) -> Self {
        Self {
            outcomes: std::sync::Mutex::new(outcomes.into_iter().collect()),
            fallback: None,
            submissions: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Remote that answers every submission the same way
    pub fn always(outcome: SubmitOutcome) -> Self {
        let mut remote = Self::new([]);
        remote.fallback = Some(outcome);
        remote
    }

    /// Intents submitted so far, in dispatch order
    pub fn submissions(&self) -> Vec<Intent> {
        self.submissions.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Remote for ScriptedRemote {
    async fn submit(&self, intent: &Intent) -> SubmitOutcome {
        self.submissions.lock().unwrap().push(intent.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or(SubmitOutcome::Transient {
                message: "scripted outcomes exhausted".to_string(),
            })
    }
}
