//! Task repository implementation

use crate::error::{Error, Result};
use crate::models::{Intent, IntentKind, SyncStatus, Task, TaskId, TaskPatch};
use libsql::{params, Connection};

use super::queue_repository::insert_intent;
use super::{opt_integer, opt_text};

/// Trait for task storage operations.
///
/// Every mutation (`create`, `update`, `mark_deleted`) atomically appends
/// one intent to the sync queue within the same transaction, so a crash can
/// never leave a pending task without an intent or vice versa.
#[allow(async_fn_in_trait)]
pub trait TaskRepository {
    /// Create a new task and enqueue its create intent
    async fn create(&self, title: &str, description: Option<&str>) -> Result<Task>;

    /// Get a task by ID (excluding deleted)
    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    /// List tasks, newest first
    async fn list(&self, include_deleted: bool) -> Result<Vec<Task>>;

    /// Apply a partial update and enqueue its update intent.
    ///
    /// Returns `None` when the task is absent or deleted.
    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<Option<Task>>;

    /// Soft delete a task and enqueue its delete intent.
    ///
    /// Returns `false` when the task is absent or already deleted.
    async fn mark_deleted(&self, id: &TaskId) -> Result<bool>;

    /// List tasks awaiting reconciliation, least recently touched first
    async fn list_pending(&self) -> Result<Vec<Task>>;

    /// Set the reconciliation state without touching anything else
    async fn set_sync_status(&self, id: &TaskId, status: SyncStatus) -> Result<()>;

    /// Record a successful reconciliation.
    ///
    /// A `None` remote id keeps whatever the task already carries.
    async fn mark_synced(
        &self,
        id: &TaskId,
        remote_id: Option<&str>,
        synced_at: i64,
    ) -> Result<()>;

    /// Overwrite user-visible fields with the remote's winning version.
    ///
    /// Adopts the remote's `updated_at` and does not enqueue an intent; the
    /// remote already holds this state.
    async fn overwrite_from_remote(
        &self,
        id: &TaskId,
        title: &str,
        description: Option<&str>,
        completed: bool,
        updated_at: i64,
    ) -> Result<()>;
}

/// libSQL implementation of `TaskRepository`
pub struct LibSqlTaskRepository<'a> {
    conn: &'a Connection,
}

const TASK_COLUMNS: &str =
    "id, title, description, completed, created_at, updated_at, is_deleted, sync_status, remote_id, last_synced_at";

impl<'a> LibSqlTaskRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a task from a database row
    fn parse_task(row: &libsql::Row) -> Result<Task> {
        let id: String = row.get(0)?;
        let sync_status: String = row.get(7)?;

        Ok(Task {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid task id: {id}")))?,
            title: row.get(1)?,
            description: row.get(2).ok(),
            completed: row.get::<i32>(3)? != 0,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            deleted: row.get::<i32>(6)? != 0,
            sync_status: SyncStatus::parse(&sync_status)
                .ok_or_else(|| Error::Database(format!("unknown sync status: {sync_status}")))?,
            remote_id: row.get(8).ok(),
            last_synced_at: row.get(9).ok(),
        })
    }

    /// Execute the task write, then append the intent iff rows changed, all
    /// inside one transaction. Returns the rows changed by the task write.
    async fn write_task_with_intent(
        &self,
        sql: &str,
        task_params: impl libsql::params::IntoParams,
        intent: &Intent,
    ) -> Result<u64> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let changed = match self.conn.execute(sql, task_params).await {
            Ok(changed) => changed,
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        };

        if changed > 0 {
            if let Err(e) = insert_intent(self.conn, intent).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        Ok(changed)
    }
}

impl TaskRepository for LibSqlTaskRepository<'_> {
    async fn create(&self, title: &str, description: Option<&str>) -> Result<Task> {
        let task = Task::new(title, description.map(ToString::to_string));
        let intent = Intent::new(IntentKind::Create, task.clone());

        self.write_task_with_intent(
            "INSERT INTO tasks (id, title, description, completed, created_at, updated_at, is_deleted, sync_status, remote_id, last_synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                task.id.as_str(),
                task.title.clone(),
                opt_text(task.description.as_deref()),
                i64::from(task.completed),
                task.created_at,
                task.updated_at,
                i64::from(task.deleted),
                task.sync_status.as_str(),
                opt_text(task.remote_id.as_deref()),
                opt_integer(task.last_synced_at)
            ],
            &intent,
        )
        .await?;

        Ok(task)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND is_deleted = 0"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Task>> {
        let sql = if include_deleted {
            format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC")
        } else {
            format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE is_deleted = 0 ORDER BY created_at DESC"
            )
        };

        let mut rows = self.conn.query(&sql, ()).await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(Self::parse_task(&row)?);
        }

        Ok(tasks)
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<Option<Task>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };

        let mut updated = existing;
        if let Some(title) = &patch.title {
            updated.title = title.clone();
        }
        if let Some(description) = &patch.description {
            updated.description = Some(description.clone());
        }
        if let Some(completed) = patch.completed {
            updated.completed = completed;
        }
        updated.updated_at = chrono::Utc::now().timestamp_millis();
        updated.sync_status = SyncStatus::Pending;

        let intent = Intent::new(IntentKind::Update, updated.clone());

        let changed = self
            .write_task_with_intent(
                "UPDATE tasks
                 SET title = ?, description = ?, completed = ?, updated_at = ?, sync_status = ?
                 WHERE id = ? AND is_deleted = 0",
                params![
                    updated.title.clone(),
                    opt_text(updated.description.as_deref()),
                    i64::from(updated.completed),
                    updated.updated_at,
                    updated.sync_status.as_str(),
                    updated.id.as_str()
                ],
                &intent,
            )
            .await?;

        if changed == 0 {
            return Ok(None);
        }

        Ok(Some(updated))
    }

    async fn mark_deleted(&self, id: &TaskId) -> Result<bool> {
        let Some(existing) = self.get(id).await? else {
            return Ok(false);
        };

        let now = chrono::Utc::now().timestamp_millis();

        let mut snapshot = existing;
        snapshot.deleted = true;
        snapshot.updated_at = now;
        snapshot.sync_status = SyncStatus::Pending;

        let intent = Intent::new(IntentKind::Delete, snapshot);

        let changed = self
            .write_task_with_intent(
                "UPDATE tasks
                 SET is_deleted = 1, updated_at = ?, sync_status = 'pending'
                 WHERE id = ? AND is_deleted = 0",
                params![now, id.as_str()],
                &intent,
            )
            .await?;

        Ok(changed > 0)
    }

    async fn list_pending(&self) -> Result<Vec<Task>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks
                     WHERE sync_status = 'pending' AND is_deleted = 0
                     ORDER BY updated_at ASC"
                ),
                (),
            )
            .await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(Self::parse_task(&row)?);
        }

        Ok(tasks)
    }

    async fn set_sync_status(&self, id: &TaskId, status: SyncStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks SET sync_status = ? WHERE id = ?",
                params![status.as_str(), id.as_str()],
            )
            .await?;

        Ok(())
    }

    async fn mark_synced(
        &self,
        id: &TaskId,
        remote_id: Option<&str>,
        synced_at: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks
                 SET sync_status = 'synced', remote_id = COALESCE(?, remote_id), last_synced_at = ?
                 WHERE id = ?",
                params![opt_text(remote_id), synced_at, id.as_str()],
            )
            .await?;

        Ok(())
    }

    async fn overwrite_from_remote(
        &self,
        id: &TaskId,
        title: &str,
        description: Option<&str>,
        completed: bool,
        updated_at: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tasks
                 SET title = ?, description = ?, completed = ?, updated_at = ?
                 WHERE id = ?",
                params![
                    title,
                    opt_text(description),
                    i64::from(completed),
                    updated_at,
                    id.as_str()
                ],
            )
            .await?;

        Ok(())
    }
}
