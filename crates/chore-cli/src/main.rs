//! Chore CLI - Offline-first task tracking from the command line
//!
//! Mutations land locally and queue for reconciliation; `chore sync` drives
//! the reconciliation cycles.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chore_core::db::{Database, LibSqlTaskRepository, TaskRepository};
use chore_core::models::{SyncResult, Task, TaskPatch};
use chore_core::sync::{LoopbackRemote, SyncEngine, SyncOptions};
use chore_core::TaskId;
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "chore")]
#[command(about = "Track tasks offline and reconcile them with a remote")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Quick capture: chore "buy milk"
    #[arg(trailing_var_arg = true)]
    task: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new task
    #[command(alias = "new")]
    Add {
        /// Task title
        title: Vec<String>,
        /// Optional longer description
        #[arg(short, long, value_name = "TEXT")]
        description: Option<String>,
    },
    /// List tasks, newest first
    List {
        /// Include soft-deleted tasks
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task as completed
    Done {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Mark a completed task as open again
    Reopen {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Edit a task's title or description
    Edit {
        /// Task ID or unique ID prefix
        id: String,
        /// New title
        #[arg(short, long, value_name = "TEXT")]
        title: Option<String>,
        /// New description
        #[arg(short, long, value_name = "TEXT")]
        description: Option<String>,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Reconcile queued changes with the remote
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Show queue counters
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset failed operations for another round of cycles
    Retry,
    /// Purge failed operations from the queue
    Clear,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] chore_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No task title provided")]
    EmptyTitle,
    #[error("Task ID cannot be empty")]
    EmptyTaskId,
    #[error("Task not found for id/prefix: {0}")]
    TaskNotFound(String),
    #[error("{0}")]
    AmbiguousTaskId(String),
    #[error("Nothing to change; pass --title and/or --description")]
    EmptyPatch,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chore=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add { title, description }) => {
            run_add(&title, description.as_deref(), &db_path).await?;
        }
        Some(Commands::List { all, json }) => run_list(all, json, &db_path).await?,
        Some(Commands::Done { id }) => run_set_completed(&id, true, &db_path).await?,
        Some(Commands::Reopen { id }) => run_set_completed(&id, false, &db_path).await?,
        Some(Commands::Edit {
            id,
            title,
            description,
        }) => run_edit(&id, title, description, &db_path).await?,
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Sync { command, json }) => match command {
            None => run_sync(json, &db_path).await?,
            Some(SyncCommands::Status { json }) => run_sync_status(json, &db_path).await?,
            Some(SyncCommands::Retry) => run_sync_retry(&db_path).await?,
            Some(SyncCommands::Clear) => run_sync_clear(&db_path).await?,
        },
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            // Quick capture mode: chore "buy milk"
            if cli.task.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.task, None, &db_path).await?;
            }
        }
    }

    Ok(())
}

async fn run_add(
    title_parts: &[String],
    description: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let title = normalize_title(&title_parts.join(" ")).ok_or(CliError::EmptyTitle)?;

    let db = open_database(db_path).await?;
    let repo = LibSqlTaskRepository::new(db.connection());
    let task = repo.create(&title, description).await?;

    println!("{}", task.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct TaskListItem {
    id: String,
    title: String,
    description: Option<String>,
    completed: bool,
    sync_status: String,
    created_at: i64,
    updated_at: i64,
    relative_time: String,
}

async fn run_list(include_deleted: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let repo = LibSqlTaskRepository::new(db.connection());
    let tasks = repo.list(include_deleted).await?;

    if as_json {
        let json_items = tasks
            .iter()
            .map(task_to_list_item)
            .collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_task_lines(&tasks) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_set_completed(id: &str, completed: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_task_identifier(id)?;
    let db = open_database(db_path).await?;
    let task = resolve_task(&normalized_id, &db).await?;

    let patch = TaskPatch {
        completed: Some(completed),
        ..TaskPatch::default()
    };
    let repo = LibSqlTaskRepository::new(db.connection());
    let updated = repo
        .update(&task.id, &patch)
        .await?
        .ok_or_else(|| CliError::TaskNotFound(normalized_id))?;

    println!("{}", updated.id);
    Ok(())
}

async fn run_edit(
    id: &str,
    title: Option<String>,
    description: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let patch = TaskPatch {
        title: title.and_then(|t| normalize_title(&t)),
        description,
        completed: None,
    };
    if patch.is_noop() {
        return Err(CliError::EmptyPatch);
    }

    let normalized_id = normalize_task_identifier(id)?;
    let db = open_database(db_path).await?;
    let task = resolve_task(&normalized_id, &db).await?;

    let repo = LibSqlTaskRepository::new(db.connection());
    let updated = repo
        .update(&task.id, &patch)
        .await?
        .ok_or_else(|| CliError::TaskNotFound(normalized_id))?;

    println!("{}", updated.id);
    Ok(())
}

async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_task_identifier(id)?;
    let db = open_database(db_path).await?;
    let task = resolve_task(&normalized_id, &db).await?;

    let repo = LibSqlTaskRepository::new(db.connection());
    if !repo.mark_deleted(&task.id).await? {
        return Err(CliError::TaskNotFound(normalized_id));
    }
    println!("{}", task.id);
    Ok(())
}

async fn run_sync(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let engine = SyncEngine::new(&db, LoopbackRemote, SyncOptions::from_env());
    let result = engine.run_cycle().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", format_sync_result(&result));
        for error in &result.errors {
            eprintln!("  {}: {}", error.task_id, error.message);
        }
    }

    Ok(())
}

async fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let engine = SyncEngine::new(&db, LoopbackRemote, SyncOptions::from_env());
    let status = engine.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let last_attempt = status
            .last_sync_attempt
            .map_or_else(|| "never".to_string(), |ts| {
                format_relative_time(ts, Utc::now().timestamp_millis())
            });
        println!(
            "pending: {}  failed: {}  last attempt: {last_attempt}",
            status.pending_operations, status.failed_operations
        );
    }

    Ok(())
}

async fn run_sync_retry(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let engine = SyncEngine::new(&db, LoopbackRemote, SyncOptions::from_env());
    let reinstated = engine.retry_failed().await?;

    println!("Reinstated {reinstated} failed operation(s) for retry");
    Ok(())
}

async fn run_sync_clear(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let engine = SyncEngine::new(&db, LoopbackRemote, SyncOptions::from_env());
    let purged = engine.clear_failed().await?;

    println!("Cleared {purged} failed operation(s)");
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "chore", buffer);
}

async fn resolve_task(task_query: &str, db: &Database) -> Result<Task, CliError> {
    let repo = LibSqlTaskRepository::new(db.connection());

    if let Ok(task_id) = task_query.parse::<TaskId>() {
        if let Some(task) = repo.get(&task_id).await? {
            return Ok(task);
        }
    }

    let mut rows = db
        .connection()
        .query(
            "SELECT id
             FROM tasks
             WHERE is_deleted = 0 AND id LIKE ?
             ORDER BY updated_at DESC
             LIMIT ?",
            libsql::params![format!("{task_query}%"), 3i64],
        )
        .await
        .map_err(chore_core::Error::from)?;

    let mut matching_ids = Vec::new();
    while let Some(row) = rows.next().await.map_err(chore_core::Error::from)? {
        let id: String = row.get(0).map_err(chore_core::Error::from)?;
        matching_ids.push(id);
    }

    match matching_ids.len() {
        0 => Err(CliError::TaskNotFound(task_query.to_string())),
        1 => {
            let resolved_id = matching_ids[0]
                .parse::<TaskId>()
                .map_err(|_| CliError::TaskNotFound(task_query.to_string()))?;
            repo.get(&resolved_id)
                .await?
                .ok_or_else(|| CliError::TaskNotFound(task_query.to_string()))
        }
        _ => {
            let options = matching_ids
                .iter()
                .take(3)
                .map(|id| id.chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousTaskId(format!(
                "ID prefix '{task_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let id = task.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let checkbox = if task.completed { "[x]" } else { "[ ]" };
            let title = title_preview(task, 40);
            let status = task.sync_status.as_str();
            let relative_time = format_relative_time(task.updated_at, now_ms);

            format!("{short_id:<13}  {checkbox} {title:<40}  {status:<8}  {relative_time}")
        })
        .collect()
}

fn task_to_list_item(task: &Task) -> TaskListItem {
    let now_ms = Utc::now().timestamp_millis();

    TaskListItem {
        id: task.id.to_string(),
        title: task.title.clone(),
        description: task.description.clone(),
        completed: task.completed,
        sync_status: task.sync_status.as_str().to_string(),
        created_at: task.created_at,
        updated_at: task.updated_at,
        relative_time: format_relative_time(task.updated_at, now_ms),
    }
}

fn format_sync_result(result: &SyncResult) -> String {
    format!(
        "Synced {}/{} queued operation(s) ({} conflict(s), {} failure(s))",
        result.successful, result.total, result.conflicts, result.failed
    )
}

fn title_preview(task: &Task, max_chars: usize) -> String {
    let first_line = task.title.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn normalize_title(title: &str) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_task_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyTaskId)
    } else {
        Ok(trimmed.to_string())
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("CHORE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chore")
        .join("chore.db")
}

async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!("opening database at {}", path.display());
    Ok(Database::open(path).await?)
}
