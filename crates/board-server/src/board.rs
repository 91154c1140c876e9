//! Board service: the operations clients invoke.
//!
//! Each mutating operation takes the store handle, stamps a commit timestamp,
//! runs in one store transaction and, once committed, hands the timestamp to
//! the change notifier. Operations that turn out to be silent no-ops neither
//! write nor notify.

use board_core::{
    token_prefix, BoardError, Clock, CommitClock, Listing, LockConflict, LockState, Result, TaskId,
    Timestamp, DEFAULT_TRANSFER_COOLDOWN_MS,
};
use board_storage::{Database, NewTask};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::notifier::ChangeNotifier;

/// Poll parameters for `list`
#[derive(Debug, Clone, Copy, Default)]
pub struct ListQuery {
    /// Only tasks updated after this watermark
    pub since_watermark: Option<Timestamp>,
    /// Report tombstones deleted at or after this cutoff
    pub tombstone_cutoff: Option<Timestamp>,
}

/// Shared task board.
///
/// Cloning is cheap; clones share the store, notifier and clock.
#[derive(Clone)]
pub struct Board {
    db: Arc<Mutex<Database>>,
    notifier: Arc<ChangeNotifier>,
    clock: Arc<CommitClock>,
    cooldown_ms: i64,
}

impl Board {
    pub fn new(db: Database, notifier: Arc<ChangeNotifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            notifier,
            clock: Arc::new(CommitClock::new(clock)),
            cooldown_ms: DEFAULT_TRANSFER_COOLDOWN_MS,
        }
    }

    /// Overrides the wait between a transfer request and a forced claim.
    pub fn with_transfer_cooldown(mut self, cooldown_ms: i64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn transfer_cooldown_ms(&self) -> i64 {
        self.cooldown_ms
    }

    /// Active tasks changed since the watermark, seen from the caller's
    /// token. Callers without a token get a fresh one.
    pub async fn list(&self, token: Option<String>, query: ListQuery) -> Result<Listing> {
        let token = token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let db = self.db.lock().await;
        let dt = self.clock.next();

        let tasks = db
            .list_active_since(query.since_watermark.unwrap_or(0))
            .await?
            .iter()
            .map(|task| task.view_for(&token))
            .collect();

        let deleted_tasks = match query.tombstone_cutoff {
            Some(cutoff) => db.deleted_since(cutoff).await?,
            None => Vec::new(),
        };

        Ok(Listing {
            tasks,
            dt,
            token,
            deleted_tasks,
        })
    }

    /// Creates a task, after `predecessor` when given, else at the end.
    pub async fn create(
        &self,
        text: &str,
        column: i64,
        predecessor: Option<TaskId>,
    ) -> Result<TaskId> {
        let mut new = NewTask::new(text, column);
        new.predecessor = predecessor;
        new.validate()?;

        let (id, now) = {
            let mut db = self.db.lock().await;
            let now = self.clock.next();
            (db.create_task(new, now).await?, now)
        };

        self.committed("create", id, now);
        Ok(id)
    }

    pub async fn update(&self, id: TaskId, token: &str, text: &str) -> Result<()> {
        require_token(token)?;

        let now = {
            let mut db = self.db.lock().await;
            let now = self.clock.next();
            db.update_text(id, token, text, now).await?;
            now
        };

        self.committed("update", id, now);
        Ok(())
    }

    /// Soft-deletes a task.
    pub async fn delete(&self, id: TaskId, token: &str) -> Result<()> {
        require_token(token)?;

        let now = {
            let mut db = self.db.lock().await;
            let now = self.clock.next();
            db.soft_delete(id, token, now).await?;
            now
        };

        self.committed("delete", id, now);
        Ok(())
    }

    /// Moves a task right after `predecessor` (front when `None`) into `column`.
    pub async fn move_task(
        &self,
        id: TaskId,
        token: &str,
        predecessor: Option<TaskId>,
        column: i64,
    ) -> Result<()> {
        require_token(token)?;

        let now = {
            let mut db = self.db.lock().await;
            let now = self.clock.next();
            db.move_task(id, token, predecessor, column, now).await?;
            now
        };

        self.committed("move", id, now);
        Ok(())
    }

    pub async fn lock(&self, id: TaskId, token: &str) -> Result<()> {
        self.transition("lock", id, token, |state, caller, now| {
            state.acquire(caller, now)
        })
        .await
    }

    /// Releases the caller's lock. Anything else, a missing task or token
    /// included, is silently ignored.
    pub async fn unlock(&self, id: TaskId, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }
        let released = self
            .transition("unlock", id, token, |state, caller, _| Ok(state.release(caller)))
            .await;
        match released {
            Err(BoardError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    pub async fn request_unlock(&self, id: TaskId, token: &str) -> Result<()> {
        self.transition("request_unlock", id, token, |state, caller, now| {
            state.request_transfer(caller, now)
        })
        .await
    }

    /// Withdraws the caller's transfer request. Without a token there is
    /// nothing to withdraw.
    pub async fn cancel_unlock_request(&self, id: TaskId, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }
        self.transition("cancel_unlock_request", id, token, |state, caller, _| {
            Ok(state.cancel_transfer(caller))
        })
        .await
    }

    pub async fn try_unlock(&self, id: TaskId, token: &str) -> Result<()> {
        let cooldown_ms = self.cooldown_ms;
        self.transition("try_unlock", id, token, move |state, caller, now| {
            state.claim_transfer(caller, now, cooldown_ms)
        })
        .await
    }

    pub async fn deny_unlock(&self, id: TaskId, token: &str) -> Result<()> {
        self.transition("deny_unlock", id, token, |state, caller, _| {
            state.deny_transfer(caller)
        })
        .await
    }

    pub async fn allow_unlock(&self, id: TaskId, token: &str) -> Result<()> {
        self.transition("allow_unlock", id, token, |state, caller, now| {
            state.allow_transfer(caller, now)
        })
        .await
    }

    /// Applies one lock transition and notifies if it changed anything.
    async fn transition<F>(&self, op: &'static str, id: TaskId, token: &str, f: F) -> Result<()>
    where
        F: FnOnce(LockState, &str, Timestamp) -> std::result::Result<LockState, LockConflict>,
    {
        require_token(token)?;

        let committed = {
            let mut db = self.db.lock().await;
            let now = self.clock.next();
            let changed = db
                .transition_lock(id, now, |state| f(state, token, now))
                .await?;
            changed.then_some(now)
        };

        match committed {
            Some(now) => self.committed(op, id, now),
            None => debug!(op, task_id = id, token = token_prefix(token), "No change"),
        }
        Ok(())
    }

    fn committed(&self, op: &'static str, id: TaskId, watermark: Timestamp) {
        let receivers = self.notifier.notify(watermark);
        debug!(op, task_id = id, watermark, receivers, "Committed");
    }
}

fn require_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(BoardError::validation("x-access-token header is required"));
    }
    Ok(())
}
