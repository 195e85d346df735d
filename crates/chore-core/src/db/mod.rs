//! Database layer for Chore

mod connection;
mod migrations;
mod queue_repository;
mod task_repository;

pub use connection::Database;
pub use queue_repository::{IntentQueue, LibSqlIntentQueue};
pub use task_repository::{LibSqlTaskRepository, TaskRepository};

/// Convert `Option<&str>` to a libsql value
pub(crate) fn opt_text(value: Option<&str>) -> libsql::Value {
    match value {
        Some(value) => libsql::Value::Text(value.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<i64>` to a libsql value
pub(crate) fn opt_integer(value: Option<i64>) -> libsql::Value {
    match value {
        Some(value) => libsql::Value::Integer(value),
        None => libsql::Value::Null,
    }
}
