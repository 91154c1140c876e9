//! Board Storage - task store for the shared task board
//!
//! This crate keeps tasks in an embedded Turso (SQLite-compatible) database
//! file and exposes the conditional reads and updates the board needs.
//!
//! # Overview
//!
//! - One `tasks` table; deletion is a soft delete (`deleted_at != 0`)
//! - Every mutation runs in a single transaction: the lock check, the
//!   sort-key allocation (including a rebalance) and the write either all
//!   apply or none do
//! - The sort-key allocator lives here because it reads neighbouring keys
//!   and may respace the whole active order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │         Board service / HTTP handlers       │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │         Board Storage (this crate)          │
//! │  • Database struct                          │
//! │  • Lock transitions, edits, soft delete     │
//! │  • Sort-key allocator + rebalance           │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │         Turso Database                      │
//! │  • .board/board.db                          │
//! │  • WAL mode                                 │
//! │  • Table: tasks                             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use board_storage::{Database, NewTask};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut db = Database::open(".board/board.db").await?;
//! db.init_schema().await?;
//!
//! let first = db.create_task(NewTask::new("Write docs", 0), 1_000).await?;
//! let second = db
//!     .create_task(NewTask::new("Review", 0).after(first), 1_001)
//!     .await?;
//!
//! let tasks = db.list_active_since(0).await?;
//! assert_eq!(tasks.len(), 2);
//! # let _ = second;
//! # Ok(())
//! # }
//! ```

mod allocator;
pub mod db;

pub use db::{Database, DbError, NewTask, Result};
