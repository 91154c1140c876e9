//! Database layer for the task board using Turso.
//!
//! Architecture:
//!   - Database file: .board/board.db
//!   - WAL mode: Write-Ahead Logging for concurrent reads during writes
//!   - Schema: a single tasks table, soft-deleted rows kept as tombstones
//!   - Indexes: active order (deleted_at, sort) and polling (deleted_at, updated_at)
//!
//! Every mutating method opens one transaction and re-reads the row inside
//! it, so the precondition check and the write commit together.

use board_core::{BoardError, LockConflict, LockState, Task, TaskId, Timestamp};
use std::path::Path;
use tracing::debug;
use turso::{params, Builder, Connection};

use crate::allocator;

/// Columns selected for a full task row, in `parse_task_row` order.
const TASK_COLUMNS: &str = "id, text, col, sort, created_at, updated_at, deleted_at, \
     locked_by, locked_at, locking_switch_requested_by, locking_switch_requested_at";

/// Database connection wrapper for Turso
pub struct Database {
    conn: Connection,
    path: String,
}

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("turso error: {0}")]
    Turso(#[from] turso::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Board(#[from] BoardError),
}

impl From<LockConflict> for DbError {
    fn from(conflict: LockConflict) -> Self {
        DbError::Board(conflict.into())
    }
}

impl From<DbError> for BoardError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Board(e) => e,
            other => BoardError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Input for creating a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub text: String,
    pub column: i64,
    /// Task the new one is dropped after; `None` appends at the end
    pub predecessor: Option<TaskId>,
}

impl NewTask {
    pub fn new(text: impl Into<String>, column: i64) -> Self {
        Self {
            text: text.into(),
            column,
            predecessor: None,
        }
    }

    pub fn after(mut self, predecessor: TaskId) -> Self {
        self.predecessor = Some(predecessor);
        self
    }

    /// Validate checks that the task has content.
    pub fn validate(&self) -> std::result::Result<(), BoardError> {
        validate_text(&self.text)
    }
}

fn validate_text(text: &str) -> std::result::Result<(), BoardError> {
    if text.trim().is_empty() {
        return Err(BoardError::validation("Text field must be filled"));
    }
    Ok(())
}

impl Database {
    /// Open creates a new database connection at the specified path using Turso.
    ///
    /// The database is opened in embedded mode with WAL for concurrent reads.
    /// Call `init_schema` before first use.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use board_storage::Database;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(".board/board.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        // PRAGMA statements may return rows, so go through query()
        let _ = conn.query("PRAGMA journal_mode=WAL", params![]).await?;
        let _ = conn.query("PRAGMA busy_timeout=5000", params![]).await?;

        debug!(path = %path_str, "Opened task database");

        Ok(Database {
            conn,
            path: path_str,
        })
    }

    /// Close closes the database connection
    pub async fn close(self) -> Result<()> {
        // Drop handles cleanup
        Ok(())
    }

    /// Returns the database file path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// InitSchema creates the tasks table and its indexes. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                col INTEGER NOT NULL DEFAULT 0,
                sort INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                deleted_at INTEGER NOT NULL DEFAULT 0,
                locked_by TEXT NOT NULL DEFAULT '',
                locked_at INTEGER NOT NULL DEFAULT 0,
                locking_switch_requested_by TEXT NOT NULL DEFAULT '',
                locking_switch_requested_at INTEGER NOT NULL DEFAULT 0
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_tasks_order ON tasks(deleted_at, sort)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_updated ON tasks(deleted_at, updated_at)",
        ];

        for stmt in statements {
            self.conn.execute(stmt, params![]).await?;
        }

        Ok(())
    }

    /// GetTask retrieves a task by ID, tombstones included.
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        fetch_task(&self.conn, id).await
    }

    /// ListActiveSince returns active tasks updated after `watermark`,
    /// in board order.
    pub async fn list_active_since(&self, watermark: Timestamp) -> Result<Vec<Task>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE deleted_at = 0 AND updated_at > ?
             ORDER BY sort ASC, id ASC"
        );

        let mut rows = self.conn.query(&query, params![watermark]).await?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(parse_task_row(&row)?);
        }
        Ok(tasks)
    }

    /// DeletedSince returns ids of tasks soft-deleted at or after `cutoff`.
    pub async fn deleted_since(&self, cutoff: Timestamp) -> Result<Vec<TaskId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM tasks
                 WHERE deleted_at > 0 AND deleted_at >= ?
                 ORDER BY deleted_at ASC, id ASC",
                params![cutoff],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    /// GetTaskCount returns the number of tasks, tombstones included.
    pub async fn get_task_count(&self) -> Result<i64> {
        let rows = self
            .conn
            .query("SELECT COUNT(*) FROM tasks", params![])
            .await?;

        let count = first_row(rows, |row| Ok(row.get::<i64>(0)?)).await?;
        Ok(count.unwrap_or(0))
    }

    /// CreateTask inserts a task and returns its id.
    ///
    /// Without a predecessor the key is `id × SORT_STEP`, which lands after
    /// every existing key. With one, the allocator places it right after the
    /// predecessor, rebalancing first if needed.
    pub async fn create_task(&mut self, new: NewTask, now: Timestamp) -> Result<TaskId> {
        new.validate()?;

        let tx = self.conn.transaction().await?;

        let id = next_task_id(&tx).await?;
        let sort_key = match new.predecessor {
            Some(predecessor) => allocator::place(&tx, Some(predecessor), id, now).await?,
            None => board_core::ordering::initial_key(id),
        };
        let task = Task::new(id, new.text, new.column, sort_key, now);

        tx.execute(
            &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                task.id,
                task.text.clone(),
                task.column,
                task.sort_key,
                task.created_at,
                task.updated_at,
                task.deleted_at,
                task.locked_by.clone(),
                task.locked_at,
                task.locking_switch_requested_by.clone(),
                task.locking_switch_requested_at,
            ],
        )
        .await?;

        tx.commit().await?;

        debug!(task_id = id, sort = sort_key, "Created task");
        Ok(id)
    }

    /// UpdateText replaces the text of a task the caller may edit.
    pub async fn update_text(
        &mut self,
        id: TaskId,
        caller: &str,
        text: &str,
        now: Timestamp,
    ) -> Result<()> {
        validate_text(text)?;

        let tx = self.conn.transaction().await?;
        let mut task = fetch_active_task(&tx, id).await?;
        task.lock_state().check_editable(caller)?;

        task.text = text.to_string();
        task.updated_at = now;
        write_task(&tx, &task).await?;

        tx.commit().await?;
        Ok(())
    }

    /// SoftDelete turns an editable task into a tombstone.
    pub async fn soft_delete(&mut self, id: TaskId, caller: &str, now: Timestamp) -> Result<()> {
        let tx = self.conn.transaction().await?;
        let mut task = fetch_active_task(&tx, id).await?;
        task.lock_state().check_editable(caller)?;

        task.deleted_at = now;
        task.updated_at = now;
        write_task(&tx, &task).await?;

        tx.commit().await?;
        Ok(())
    }

    /// MoveTask places an editable task right after `predecessor` (or at the
    /// front) in `column`, returning its new key.
    pub async fn move_task(
        &mut self,
        id: TaskId,
        caller: &str,
        predecessor: Option<TaskId>,
        column: i64,
        now: Timestamp,
    ) -> Result<i64> {
        let tx = self.conn.transaction().await?;
        let mut task = fetch_active_task(&tx, id).await?;
        task.lock_state().check_editable(caller)?;

        let sort_key = allocator::place(&tx, predecessor, id, now).await?;
        task.sort_key = sort_key;
        task.column = column;
        task.updated_at = now;
        write_task(&tx, &task).await?;

        tx.commit().await?;
        Ok(sort_key)
    }

    /// TransitionLock applies a lock state transition to an active task.
    ///
    /// Returns whether anything changed; unchanged states are not written,
    /// so silent no-ops leave `updated_at` alone.
    pub async fn transition_lock<F>(&mut self, id: TaskId, now: Timestamp, transition: F) -> Result<bool>
    where
        F: FnOnce(LockState) -> std::result::Result<LockState, LockConflict>,
    {
        let tx = self.conn.transaction().await?;
        let mut task = fetch_active_task(&tx, id).await?;

        let current = task.lock_state();
        let next = transition(current.clone())?;
        if next == current {
            return Ok(false);
        }

        task.set_lock_state(next);
        task.updated_at = now;
        write_task(&tx, &task).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Rebalance respaces every active task at `SORT_STEP` intervals,
    /// returning the number of rewritten keys.
    pub async fn rebalance(&mut self, now: Timestamp) -> Result<usize> {
        let tx = self.conn.transaction().await?;
        let rewritten = allocator::rebalance(&tx, now).await?;
        tx.commit().await?;
        Ok(rewritten)
    }
}

/// Next unused id. Tombstones are never removed, so ids are never reused.
async fn next_task_id(conn: &Connection) -> Result<TaskId> {
    let rows = conn
        .query("SELECT COALESCE(MAX(id), 0) + 1 FROM tasks", params![])
        .await?;

    let id = first_row(rows, |row| Ok(row.get::<i64>(0)?)).await?;
    Ok(id.unwrap_or(1))
}

pub(crate) async fn fetch_task(conn: &Connection, id: TaskId) -> Result<Option<Task>> {
    let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
    let rows = conn.query(&query, params![id]).await?;
    first_row(rows, parse_task_row).await
}

/// First row of `rows` mapped through `map`.
///
/// The statement is always stepped to completion: dropping a half-read
/// `Rows` inside a transaction ends the transaction, and the commit after
/// it would fail.
pub(crate) async fn first_row<T, F>(mut rows: turso::Rows, map: F) -> Result<Option<T>>
where
    F: Fn(&turso::Row) -> Result<T>,
{
    let mut first = None;
    while let Some(row) = rows.next().await? {
        if first.is_none() {
            first = Some(map(&row)?);
        }
    }
    Ok(first)
}

/// Fetches a task that exists and is not soft-deleted.
pub(crate) async fn fetch_active_task(conn: &Connection, id: TaskId) -> Result<Task> {
    match fetch_task(conn, id).await? {
        Some(task) if task.is_active() => Ok(task),
        _ => Err(BoardError::NotFound(id).into()),
    }
}

async fn write_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET
            text = ?, col = ?, sort = ?, updated_at = ?, deleted_at = ?,
            locked_by = ?, locked_at = ?,
            locking_switch_requested_by = ?, locking_switch_requested_at = ?
         WHERE id = ?",
        params![
            task.text.clone(),
            task.column,
            task.sort_key,
            task.updated_at,
            task.deleted_at,
            task.locked_by.clone(),
            task.locked_at,
            task.locking_switch_requested_by.clone(),
            task.locking_switch_requested_at,
            task.id,
        ],
    )
    .await?;
    Ok(())
}

/// Helper function to parse a task row from query results
fn parse_task_row(row: &turso::Row) -> Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        column: row.get(2)?,
        sort_key: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted_at: row.get(6)?,
        locked_by: row.get(7)?,
        locked_at: row.get(8)?,
        locking_switch_requested_by: row.get(9)?,
        locking_switch_requested_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_open_and_init() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("board.db")).await.unwrap();
        db.init_schema().await.unwrap();
        // second call is a no-op
        db.init_schema().await.unwrap();

        assert_eq!(db.get_task_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open(dir.path().join("board.db")).await.unwrap();
        db.init_schema().await.unwrap();

        let id = db
            .create_task(NewTask::new("Write docs", 0), 1_000)
            .await
            .unwrap();
        assert_eq!(id, 1);

        let task = db.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.text, "Write docs");
        assert_eq!(task.sort_key, 1000);
        assert_eq!(task.created_at, 1_000);
        assert!(task.locked_by.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open(dir.path().join("board.db")).await.unwrap();
        db.init_schema().await.unwrap();

        let err = db.create_task(NewTask::new("  ", 0), 1).await.unwrap_err();
        assert!(matches!(err, DbError::Board(BoardError::Validation(_))));
        assert_eq!(db.get_task_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_single_row_reads_keep_transaction_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open(dir.path().join("board.db")).await.unwrap();
        db.init_schema().await.unwrap();
        db.create_task(NewTask::new("Existing", 0), 1).await.unwrap();

        let tx = db.conn.transaction().await.unwrap();
        assert_eq!(next_task_id(&tx).await.unwrap(), 2);
        assert!(fetch_task(&tx, 1).await.unwrap().is_some());
        assert!(fetch_task(&tx, 7).await.unwrap().is_none());
        tx.execute(
            "UPDATE tasks SET text = ?, updated_at = ? WHERE id = ?",
            params!["Changed", 2, 1],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let task = db.get_task(1).await.unwrap().unwrap();
        assert_eq!(task.text, "Changed");
        assert_eq!(task.updated_at, 2);
    }
}
