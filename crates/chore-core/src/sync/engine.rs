//! Sync cycle engine

use tokio::sync::Mutex;

use crate::db::{Database, IntentQueue, LibSqlIntentQueue, LibSqlTaskRepository, TaskRepository};
use crate::error::{Error, Result};
use crate::models::{StatusReport, SyncErrorDetail, SyncResult, SyncStatus};

use super::remote::{Remote, SubmitOutcome};
use super::resolver::{resolve, Resolution};
use super::SyncOptions;

/// Drives reconciliation passes over the intent queue.
///
/// One cycle is in flight at a time; a second trigger while a cycle runs
/// fails fast with [`Error::SyncInProgress`] instead of interleaving queue
/// writes.
pub struct SyncEngine<'a, R> {
    db: &'a Database,
    remote: R,
    options: SyncOptions,
    cycle_gate: Mutex<()>,
}

impl<'a, R: Remote> SyncEngine<'a, R> {
    /// Create an engine over the given database and remote
    pub fn new(db: &'a Database, remote: R, options: SyncOptions) -> Self {
        Self {
            db,
            remote,
            options,
            cycle_gate: Mutex::new(()),
        }
    }

    /// The options this engine was configured with
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one bounded reconciliation pass.
    ///
    /// Each intent's outcome commits independently as the loop proceeds; a
    /// transient failure never aborts the batch, and a late storage failure
    /// does not roll back earlier successes.
    pub async fn run_cycle(&self) -> Result<SyncResult> {
        let _guard = self
            .cycle_gate
            .try_lock()
            .map_err(|_| Error::SyncInProgress)?;

        let queue = LibSqlIntentQueue::new(self.db.connection());
        let tasks = LibSqlTaskRepository::new(self.db.connection());

        let batch = queue
            .batch(self.options.batch_size, self.options.max_retries)
            .await?;

        let mut result = SyncResult {
            total: batch.len(),
            ..SyncResult::default()
        };

        tracing::debug!(total = result.total, "starting sync cycle");

        for intent in batch {
            match self.remote.submit(&intent).await {
                SubmitOutcome::Acknowledged { remote_id } => {
                    queue.remove(&intent.id).await?;
                    let now = chrono::Utc::now().timestamp_millis();
                    tasks
                        .mark_synced(&intent.task_id, remote_id.as_deref(), now)
                        .await?;
                    result.successful += 1;
                }
                SubmitOutcome::Conflict { remote } => {
                    match resolve(&intent.snapshot, &remote) {
                        Resolution::LocalWins => {
                            tracing::debug!(task_id = %intent.task_id, "conflict resolved: local wins");
                        }
                        Resolution::RemoteWins(fields) => {
                            tracing::debug!(task_id = %intent.task_id, "conflict resolved: remote wins");
                            tasks
                                .overwrite_from_remote(
                                    &intent.task_id,
                                    &fields.title,
                                    fields.description.as_deref(),
                                    fields.completed,
                                    fields.updated_at,
                                )
                                .await?;
                        }
                    }

                    queue.remove(&intent.id).await?;
                    let now = chrono::Utc::now().timestamp_millis();
                    tasks
                        .mark_synced(&intent.task_id, remote.remote_id.as_deref(), now)
                        .await?;
                    result.successful += 1;
                    result.conflicts += 1;
                }
                SubmitOutcome::Transient { message } => {
                    let now = chrono::Utc::now().timestamp_millis();
                    let retries = queue.record_failure(&intent.id, &message, now).await?;

                    if retries >= self.options.max_retries {
                        tracing::warn!(task_id = %intent.task_id, retries, "retry ceiling reached");
                        tasks
                            .set_sync_status(&intent.task_id, SyncStatus::Error)
                            .await?;
                    }

                    result.failed += 1;
                    result.errors.push(SyncErrorDetail {
                        task_id: intent.task_id,
                        message,
                    });
                }
            }
        }

        tracing::info!(
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            conflicts = result.conflicts,
            "sync cycle finished"
        );

        Ok(result)
    }

    /// Snapshot the queue counters
    pub async fn status(&self) -> Result<StatusReport> {
        LibSqlIntentQueue::new(self.db.connection())
            .status(self.options.max_retries)
            .await
    }

    /// Reset every intent parked at the retry ceiling for another round.
    ///
    /// Returns the number of intents reinstated.
    pub async fn retry_failed(&self) -> Result<u64> {
        LibSqlIntentQueue::new(self.db.connection())
            .reset_failed(self.options.max_retries)
            .await
    }

    /// Purge every intent parked at the retry ceiling.
    ///
    /// Returns the number of intents removed.
    pub async fn clear_failed(&self) -> Result<u64> {
        LibSqlIntentQueue::new(self.db.connection())
            .purge_failed(self.options.max_retries)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::remote::ScriptedRemote;
    use super::*;
    use crate::models::{SyncStatus, Task, TaskPatch};

    fn test_options() -> SyncOptions {
        SyncOptions {
            max_retries: 3,
            batch_size: 50,
        }
    }

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn ack(remote_id: &str) -> SubmitOutcome {
        SubmitOutcome::Acknowledged {
            remote_id: Some(remote_id.to_string()),
        }
    }

    fn transient(message: &str) -> SubmitOutcome {
        SubmitOutcome::Transient {
            message: message.to_string(),
        }
    }

    fn conflict_with(local: &Task, title: &str, updated_at: i64) -> SubmitOutcome {
        let mut remote = local.clone();
        remote.title = title.to_string();
        remote.updated_at = updated_at;
        remote.remote_id = Some(format!("srv-{}", local.id));
        SubmitOutcome::Conflict {
            remote: Box::new(remote),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cycle_acknowledges_and_empties_queue() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        let task = repo.create("Sync me", None).await.unwrap();

        let engine = SyncEngine::new(&db, ScriptedRemote::always(ack("srv-1")), test_options());
        let result = engine.run_cycle().await.unwrap();

        assert_eq!(result.total, 1);
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.conflicts, 0);
        assert!(result.errors.is_empty());

        let synced = repo.get(&task.id).await.unwrap().unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert_eq!(synced.remote_id.as_deref(), Some("srv-1"));
        assert!(synced.last_synced_at.is_some());

        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_operations, 0);
        assert_eq!(status.failed_operations, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_cycle_is_a_noop_after_success() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        let task = repo.create("Once", None).await.unwrap();

        let engine = SyncEngine::new(&db, ScriptedRemote::always(ack("srv-1")), test_options());
        engine.run_cycle().await.unwrap();
        let after_first = repo.get(&task.id).await.unwrap().unwrap();

        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.total, 0);
        assert_eq!(repo.get(&task.id).await.unwrap().unwrap(), after_first);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transient_failures_park_intents_at_ceiling() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(repo.create(&format!("Task {i}"), None).await.unwrap().id);
        }

        let engine = SyncEngine::new(
            &db,
            ScriptedRemote::always(transient("remote unreachable")),
            test_options(),
        );

        for _ in 0..3 {
            let result = engine.run_cycle().await.unwrap();
            assert_eq!(result.total, 5);
            assert_eq!(result.failed, 5);
            assert_eq!(result.errors.len(), 5);
        }

        for id in &ids {
            let task = repo.get(id).await.unwrap().unwrap();
            assert_eq!(task.sync_status, SyncStatus::Error);
        }

        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_operations, 0);
        assert_eq!(status.failed_operations, 5);
        assert!(status.last_sync_attempt.is_some());

        // A fourth cycle selects nothing
        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.total, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transient_failure_does_not_abort_batch() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        let flaky = repo.create("Flaky", None).await.unwrap();
        let healthy = repo.create("Healthy", None).await.unwrap();

        let engine = SyncEngine::new(
            &db,
            ScriptedRemote::new([transient("blip"), ack("srv-2")]),
            test_options(),
        );
        let result = engine.run_cycle().await.unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].task_id, flaky.id);
        assert_eq!(result.errors[0].message, "blip");

        let healthy = repo.get(&healthy.id).await.unwrap().unwrap();
        assert_eq!(healthy.sync_status, SyncStatus::Synced);
        let flaky = repo.get(&flaky.id).await.unwrap().unwrap();
        assert_eq!(flaky.sync_status, SyncStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_local_wins_keeps_local_fields() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        let task = repo.create("Mine", None).await.unwrap();

        // Remote copy is older, local version must stand
        let outcome = conflict_with(&task, "old", task.updated_at - 60_000);
        let engine = SyncEngine::new(&db, ScriptedRemote::new([outcome]), test_options());
        let result = engine.run_cycle().await.unwrap();

        assert_eq!(result.successful, 1);
        assert_eq!(result.conflicts, 1);

        let resolved = repo.get(&task.id).await.unwrap().unwrap();
        assert_eq!(resolved.title, "Mine");
        assert_eq!(resolved.sync_status, SyncStatus::Synced);
        assert!(resolved.last_synced_at.is_some());

        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_operations, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_remote_wins_overwrites_local_fields() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        let task = repo.create("Mine", None).await.unwrap();

        let remote_updated_at = task.updated_at + 60_000;
        let outcome = conflict_with(&task, "Theirs", remote_updated_at);
        let engine = SyncEngine::new(&db, ScriptedRemote::new([outcome]), test_options());
        let result = engine.run_cycle().await.unwrap();

        assert_eq!(result.successful, 1);
        assert_eq!(result.conflicts, 1);

        let resolved = repo.get(&task.id).await.unwrap().unwrap();
        assert_eq!(resolved.title, "Theirs");
        assert_eq!(resolved.updated_at, remote_updated_at);
        assert_eq!(resolved.sync_status, SyncStatus::Synced);

        // Adopting the remote version must not re-enqueue
        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_operations, 0);
        assert_eq!(status.failed_operations, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cycle_dispatches_in_enqueue_order() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());

        let task = repo.create("Ordered", None).await.unwrap();
        let patch = TaskPatch {
            completed: Some(true),
            ..TaskPatch::default()
        };
        repo.update(&task.id, &patch).await.unwrap().unwrap();

        let remote = ScriptedRemote::always(ack("srv-1"));
        let engine = SyncEngine::new(&db, remote, test_options());
        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.successful, 2);

        let submissions = engine.remote.submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions[0].created_at <= submissions[1].created_at);
        assert!(!submissions[0].snapshot.completed);
        assert!(submissions[1].snapshot.completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_size_bounds_one_cycle() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.create("One", None).await.unwrap();
        repo.create("Two", None).await.unwrap();

        let options = SyncOptions {
            max_retries: 3,
            batch_size: 1,
        };
        let engine = SyncEngine::new(&db, ScriptedRemote::always(ack("srv-1")), options);

        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.total, 1);

        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.total, 1);

        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.total, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retry_failed_reinstates_parked_intents() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.create("Stubborn", None).await.unwrap();

        let engine = SyncEngine::new(
            &db,
            ScriptedRemote::always(transient("down")),
            test_options(),
        );
        for _ in 0..3 {
            engine.run_cycle().await.unwrap();
        }
        assert_eq!(engine.status().await.unwrap().failed_operations, 1);

        let reinstated = engine.retry_failed().await.unwrap();
        assert_eq!(reinstated, 1);

        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.total, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_failed_purges_parked_intents() {
        let db = setup().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.create("Hopeless", None).await.unwrap();

        let engine = SyncEngine::new(
            &db,
            ScriptedRemote::always(transient("down")),
            test_options(),
        );
        for _ in 0..3 {
            engine.run_cycle().await.unwrap();
        }

        let purged = engine.clear_failed().await.unwrap();
        assert_eq!(purged, 1);

        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_operations, 0);
        assert_eq!(status.failed_operations, 0);

        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.total, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_cycle_is_rejected() {
        let db = setup().await;
        let engine = SyncEngine::new(&db, ScriptedRemote::new([]), test_options());

        let _held = engine.cycle_gate.try_lock().unwrap();
        let error = engine.run_cycle().await.unwrap_err();
        assert!(matches!(error, Error::SyncInProgress));
    }
}
