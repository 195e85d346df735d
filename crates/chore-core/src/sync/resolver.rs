//! Last-write-wins conflict resolution

use crate::models::Task;

/// Field values adopted from the remote when it wins a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFields {
    /// Remote's title
    pub title: String,
    /// Remote's description
    pub description: Option<String>,
    /// Remote's completion flag
    pub completed: bool,
    /// Remote's modification timestamp (Unix ms)
    pub updated_at: i64,
}

/// Which side of a conflict survives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The in-flight local version stands; nothing to apply
    LocalWins,
    /// The remote version stands; the caller applies these fields locally
    RemoteWins(RemoteFields),
}

/// Settle a version disagreement by comparing modification timestamps.
///
/// The strictly later `updated_at` wins; an exact tie favors local, since
/// the initiator is also the side driving the cycle.
#[must_use]
pub fn resolve(local: &Task, remote: &Task) -> Resolution {
    if local.updated_at >= remote.updated_at {
        Resolution::LocalWins
    } else {
        Resolution::RemoteWins(RemoteFields {
            title: remote.title.clone(),
            description: remote.description.clone(),
            completed: remote.completed,
            updated_at: remote.updated_at,
        })
    }
}
