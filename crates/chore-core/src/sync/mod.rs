//! Offline sync engine: queue draining, dispatch, and conflict resolution

mod engine;
mod remote;
mod resolver;

pub use engine::SyncEngine;
pub use remote::{LoopbackRemote, Remote, SubmitOutcome};
pub use resolver::{resolve, RemoteFields, Resolution};

use std::env;

/// Tuning knobs for the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Ceiling after which an intent is excluded from normal drain and its
    /// task flips to `error`
    pub max_retries: u32,
    /// Maximum intents dispatched per cycle
    pub batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            batch_size: 50,
        }
    }
}

impl SyncOptions {
    /// Read options from `CHORE_MAX_RETRY_ATTEMPTS` / `CHORE_SYNC_BATCH_SIZE`,
    /// falling back to defaults for absent or unparseable values
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_parsed("CHORE_MAX_RETRY_ATTEMPTS").unwrap_or(defaults.max_retries),
            batch_size: env_parsed("CHORE_SYNC_BATCH_SIZE").unwrap_or(defaults.batch_size),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.trim().parse().ok()
}
