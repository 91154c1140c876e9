//! Sort-key allocator.
//!
//! Computes the key for a task dropped after a given predecessor (or at the
//! front), searching the active order around it. When no integer is left
//! between the neighbours the whole active order is respaced once and the
//! search retried; running out of room again is an internal error.
//!
//! Callers run these inside their own transaction so the search, the
//! rebalance and the final write commit together.

use board_core::ordering;
use board_core::{BoardError, TaskId, Timestamp};
use tracing::{debug, error, info};
use turso::{params, Connection};

use crate::db::{fetch_active_task, first_row, Result};

/// Key for `moving` placed right after `predecessor` (front when `None`).
/// `moving` is never considered as its own neighbour.
pub(crate) async fn place(
    conn: &Connection,
    predecessor: Option<TaskId>,
    moving: TaskId,
    now: Timestamp,
) -> Result<i64> {
    for attempt in 0..2 {
        let low = anchor_key(conn, predecessor, moving).await?;
        let successor = successor_key(conn, low, moving).await?;

        if let Some(key) = ordering::place_between(low, successor) {
            debug!(task_id = moving, low, ?successor, key, "Allocated sort key");
            return Ok(key);
        }

        if attempt == 0 {
            debug!(task_id = moving, low, ?successor, "No room between neighbours");
            rebalance(conn, now).await?;
        }
    }

    error!(task_id = moving, ?predecessor, "Sort keys exhausted after rebalance");
    Err(BoardError::internal("Unable to sort after align").into())
}

/// Lower bound of the search: the predecessor's key, or 0 for the front.
async fn anchor_key(conn: &Connection, predecessor: Option<TaskId>, moving: TaskId) -> Result<i64> {
    match predecessor {
        None => Ok(0),
        Some(id) if id == moving => {
            Err(BoardError::validation("A task cannot be placed after itself").into())
        }
        Some(id) => Ok(fetch_active_task(conn, id).await?.sort_key),
    }
}

/// Smallest active key strictly above `low`, ignoring `moving`.
async fn successor_key(conn: &Connection, low: i64, moving: TaskId) -> Result<Option<i64>> {
    let rows = conn
        .query(
            "SELECT sort FROM tasks
             WHERE deleted_at = 0 AND sort > ? AND id != ?
             ORDER BY sort ASC
             LIMIT 1",
            params![low, moving],
        )
        .await?;

    first_row(rows, |row| Ok(row.get::<i64>(0)?)).await
}

/// Respaces all active tasks at `SORT_STEP` intervals in their current
/// order. Rewritten rows get `updated_at = now` so pollers pick up the
/// new order.
pub(crate) async fn rebalance(conn: &Connection, now: Timestamp) -> Result<usize> {
    let mut ordered: Vec<(TaskId, i64)> = Vec::new();
    let mut rows = conn
        .query(
            "SELECT id, sort FROM tasks WHERE deleted_at = 0 ORDER BY sort ASC, id ASC",
            params![],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        ordered.push((row.get(0)?, row.get(1)?));
    }
    drop(rows);

    let plan = ordering::rebalance_plan(&ordered);
    for &(id, key) in &plan {
        conn.execute(
            "UPDATE tasks SET sort = ?, updated_at = ? WHERE id = ?",
            params![key, now, id],
        )
        .await?;
    }

    info!(
        active = ordered.len(),
        rewritten = plan.len(),
        "Rebalanced sort keys"
    );
    Ok(plan.len())
}
