//! Core data structures for the task board.
//!
//! Timestamps are milliseconds since the Unix epoch; `0` means "never".

use serde::{Deserialize, Serialize};

use crate::lock::{LockState, PendingTransfer};

/// Task identity, assigned on creation and never reused.
pub type TaskId = i64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Task is the sole entity of the board.
/// Deletion is a state transition: a nonzero `deleted_at` marks a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    // ===== Core Identification =====
    pub id: TaskId,

    // ===== Task Content =====
    pub text: String,
    /// Display bucket; does not take part in ordering
    #[serde(rename = "col")]
    pub column: i64,

    // ===== Ordering =====
    #[serde(rename = "sort")]
    pub sort_key: i64,

    // ===== Timestamps =====
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Timestamp,

    // ===== Edit Lock =====
    pub locked_by: String,
    pub locked_at: Timestamp,
    pub locking_switch_requested_by: String,
    pub locking_switch_requested_at: Timestamp,
}

impl Task {
    /// A freshly created, unlocked task.
    pub fn new(id: TaskId, text: impl Into<String>, column: i64, sort_key: i64, now: Timestamp) -> Self {
        Self {
            id,
            text: text.into(),
            column,
            sort_key,
            created_at: now,
            updated_at: now,
            deleted_at: 0,
            locked_by: String::new(),
            locked_at: 0,
            locking_switch_requested_by: String::new(),
            locking_switch_requested_at: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at == 0
    }

    /// Decodes the flat lock columns into the lock state machine.
    pub fn lock_state(&self) -> LockState {
        if self.locked_by.is_empty() {
            return LockState::Unlocked;
        }
        let pending = (!self.locking_switch_requested_by.is_empty()).then(|| PendingTransfer {
            requester: self.locking_switch_requested_by.clone(),
            requested_at: self.locking_switch_requested_at,
        });
        LockState::Held {
            owner: self.locked_by.clone(),
            locked_at: self.locked_at,
            pending,
        }
    }

    /// Encodes a lock state back into the flat lock columns.
    pub fn set_lock_state(&mut self, state: LockState) {
        match state {
            LockState::Unlocked => {
                self.locked_by.clear();
                self.locked_at = 0;
                self.locking_switch_requested_by.clear();
                self.locking_switch_requested_at = 0;
            }
            LockState::Held {
                owner,
                locked_at,
                pending,
            } => {
                self.locked_by = owner;
                self.locked_at = locked_at;
                match pending {
                    Some(p) => {
                        self.locking_switch_requested_by = p.requester;
                        self.locking_switch_requested_at = p.requested_at;
                    }
                    None => {
                        self.locking_switch_requested_by.clear();
                        self.locking_switch_requested_at = 0;
                    }
                }
            }
        }
    }

    /// Projects the task as seen by the client holding `token`.
    pub fn view_for(&self, token: &str) -> TaskView {
        let held_by_caller = !self.locked_by.is_empty() && self.locked_by == token;
        TaskView {
            id: self.id,
            text: self.text.clone(),
            column: self.column,
            sort_key: self.sort_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            locked_at: self.locked_at,
            locking_switch_requested_at: self.locking_switch_requested_at,
            locked: !self.locked_by.is_empty() && self.locked_by != token,
            locking_requested: !self.locking_switch_requested_by.is_empty()
                && self.locking_switch_requested_by == token,
            edit_permission: held_by_caller,
            edit_permission_requested_by_someone_else: held_by_caller
                && !self.locking_switch_requested_by.is_empty(),
        }
    }
}

/// TaskView is a task as returned to one particular client.
/// Holder and requester tokens are replaced by caller-relative flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub text: String,
    #[serde(rename = "col")]
    pub column: i64,
    #[serde(rename = "sort")]
    pub sort_key: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Timestamp,
    pub locked_at: Timestamp,
    pub locking_switch_requested_at: Timestamp,

    /// Someone other than the caller holds the lock
    pub locked: bool,
    /// The caller has a pending transfer request
    pub locking_requested: bool,
    /// The caller holds the lock
    pub edit_permission: bool,
    /// The caller holds the lock and someone asked to take it over
    pub edit_permission_requested_by_someone_else: bool,
}

/// Listing is the answer to a poll: changed tasks, the new watermark,
/// the caller's token and the tombstones since the requested cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub tasks: Vec<TaskView>,
    pub dt: Timestamp,
    pub token: String,
    #[serde(rename = "deletedTasks")]
    pub deleted_tasks: Vec<TaskId>,
}

/// Short, log-safe prefix of a client token.
pub fn token_prefix(token: &str) -> &str {
    token
        .char_indices()
        .nth(8)
        .map_or(token, |(end, _)| &token[..end])
}
