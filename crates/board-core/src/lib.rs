//! Core types and state machines for the shared task board.
//!
//! This crate has no I/O. It defines the task entity and the per-caller view
//! handed to clients, the edit-lock state machine with its timed transfer
//! negotiation, the sort-key arithmetic used by the allocator, and the
//! commit clock every mutation is stamped with.

pub mod clock;
pub mod error;
pub mod lock;
pub mod ordering;
pub mod types;

pub use clock::{Clock, CommitClock, ManualClock, SystemClock};
pub use error::{BoardError, LockConflict, Result};
pub use lock::{LockState, PendingTransfer, DEFAULT_TRANSFER_COOLDOWN_MS};
pub use ordering::SORT_STEP;
pub use types::{token_prefix, Listing, Task, TaskId, TaskView, Timestamp};
