//! Intent queue repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{Intent, IntentId, IntentKind, StatusReport};
use libsql::{params, Connection};

use super::{opt_integer, opt_text};

/// Trait for the durable mutation intent queue
#[allow(async_fn_in_trait)]
pub trait IntentQueue {
    /// Durably append an intent
    async fn enqueue(&self, intent: &Intent) -> Result<()>;

    /// Fetch up to `limit` intents below the retry ceiling, oldest first.
    ///
    /// Non-destructive; removal is explicit via [`IntentQueue::remove`].
    async fn batch(&self, limit: usize, max_retries: u32) -> Result<Vec<Intent>>;

    /// Delete one intent; removing an absent id is a no-op
    async fn remove(&self, id: &IntentId) -> Result<()>;

    /// Increment the retry counter and record the failure diagnostics.
    ///
    /// Returns the post-increment retry count.
    async fn record_failure(
        &self,
        id: &IntentId,
        message: &str,
        attempted_at: i64,
    ) -> Result<u32>;

    /// Reset every intent at or above the retry ceiling for another round.
    ///
    /// Returns the number of intents reset.
    async fn reset_failed(&self, max_retries: u32) -> Result<u64>;

    /// Delete every intent at or above the retry ceiling.
    ///
    /// Returns the number of intents purged.
    async fn purge_failed(&self, max_retries: u32) -> Result<u64>;

    /// Snapshot the queue counters in a single consistent read
    async fn status(&self, max_retries: u32) -> Result<StatusReport>;
}

/// libSQL implementation of `IntentQueue` over the `sync_queue` table
pub struct LibSqlIntentQueue<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlIntentQueue<'a> {
    /// Create a new queue repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an intent from a database row
    fn parse_intent(row: &libsql::Row) -> Result<Intent> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let task_id: String = row.get(2)?;
        let snapshot: String = row.get(3)?;

        Ok(Intent {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid intent id: {id}")))?,
            kind: IntentKind::parse(&kind)
                .ok_or_else(|| Error::Database(format!("unknown intent kind: {kind}")))?,
            task_id: task_id
                .parse()
                .map_err(|_| Error::Database(format!("invalid task id: {task_id}")))?,
            snapshot: serde_json::from_str(&snapshot)?,
            retry_count: u32::try_from(row.get::<i64>(4)?).unwrap_or_default(),
            created_at: row.get(5)?,
            last_attempted_at: row.get(6).ok(),
            last_error: row.get(7).ok(),
        })
    }
}

/// Append one intent on the given connection.
///
/// Shared with the task repository so mutation and enqueue can share a
/// transaction.
pub(crate) async fn insert_intent(conn: &Connection, intent: &Intent) -> Result<()> {
    let snapshot = serde_json::to_string(&intent.snapshot)?;

    conn.execute(
        "INSERT INTO sync_queue (id, kind, task_id, snapshot, retry_count, created_at, last_attempted_at, last_error)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            intent.id.as_str(),
            intent.kind.as_str(),
            intent.task_id.as_str(),
            snapshot,
            i64::from(intent.retry_count),
            intent.created_at,
            opt_integer(intent.last_attempted_at),
            opt_text(intent.last_error.as_deref())
        ],
    )
    .await?;

    Ok(())
}

impl IntentQueue for LibSqlIntentQueue<'_> {
    async fn enqueue(&self, intent: &Intent) -> Result<()> {
        insert_intent(self.conn, intent).await
    }

    async fn batch(&self, limit: usize, max_retries: u32) -> Result<Vec<Intent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, task_id, snapshot, retry_count, created_at, last_attempted_at, last_error
                 FROM sync_queue
                 WHERE retry_count < ?
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?",
                params![i64::from(max_retries), limit as i64],
            )
            .await?;

        let mut intents = Vec::new();
        while let Some(row) = rows.next().await? {
            intents.push(Self::parse_intent(&row)?);
        }

        Ok(intents)
    }

    async fn remove(&self, id: &IntentId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sync_queue WHERE id = ?",
                params![id.as_str()],
            )
            .await?;

        Ok(())
    }

    async fn record_failure(
        &self,
        id: &IntentId,
        message: &str,
        attempted_at: i64,
    ) -> Result<u32> {
        let changed = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET retry_count = retry_count + 1, last_attempted_at = ?, last_error = ?
                 WHERE id = ?",
                params![attempted_at, message, id.as_str()],
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT retry_count FROM sync_queue WHERE id = ?",
                params![id.as_str()],
            )
            .await?;

        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        Ok(u32::try_from(row.get::<i64>(0)?).unwrap_or_default())
    }

    async fn reset_failed(&self, max_retries: u32) -> Result<u64> {
        let changed = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET retry_count = 0, last_error = NULL
                 WHERE retry_count >= ?",
                params![i64::from(max_retries)],
            )
            .await?;

        Ok(changed)
    }

    async fn purge_failed(&self, max_retries: u32) -> Result<u64> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE retry_count >= ?",
                params![i64::from(max_retries)],
            )
            .await?;

        Ok(changed)
    }

    async fn status(&self, max_retries: u32) -> Result<StatusReport> {
        // Single statement so the counters reflect one snapshot
        let mut rows = self
            .conn
            .query(
                "SELECT
                    (SELECT COUNT(*) FROM sync_queue WHERE retry_count < ?),
                    (SELECT COUNT(*) FROM sync_queue WHERE retry_count >= ?),
                    (SELECT MAX(last_attempted_at) FROM sync_queue)",
                params![i64::from(max_retries), i64::from(max_retries)],
            )
            .await?;

        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::Database("queue status query returned no rows".into()))?;

        Ok(StatusReport {
            pending_operations: u64::try_from(row.get::<i64>(0)?).unwrap_or_default(),
            failed_operations: u64::try_from(row.get::<i64>(1)?).unwrap_or_default(),
            last_sync_attempt: row.get(2).ok(),
        })
    }
}
