//! Pure state machine for per-task edit locks
//!
//! A task is either unlocked or held by exactly one client token. A
//! non-holder may ask to take the lock over; the holder can deny or allow
//! the request, and once the cooldown has elapsed the requester may claim
//! the lock without the holder's consent.
//!
//! Key design principles:
//! - Pure functions: transition(state, caller, now) -> Result<state>
//! - No async, no I/O; the store decides whether to persist
//! - Refused transitions return a `LockConflict`, never panic
//! - Silent no-ops return the input state unchanged

use crate::error::LockConflict;
use crate::types::Timestamp;

/// Time a requester must wait before claiming a lock it asked for.
pub const DEFAULT_TRANSFER_COOLDOWN_MS: i64 = 5000;

/// A recorded request by a non-holder to take over the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub requester: String,
    pub requested_at: Timestamp,
}

/// Edit lock state of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Held {
        owner: String,
        locked_at: Timestamp,
        /// At most one outstanding request, never from `owner`
        pending: Option<PendingTransfer>,
    },
}

impl LockState {
    pub fn owner(&self) -> Option<&str> {
        match self {
            LockState::Unlocked => None,
            LockState::Held { owner, .. } => Some(owner),
        }
    }

    pub fn pending(&self) -> Option<&PendingTransfer> {
        match self {
            LockState::Unlocked => None,
            LockState::Held { pending, .. } => pending.as_ref(),
        }
    }

    /// Gate for every mutating operation except creation: the caller must
    /// hold the lock or find it free.
    pub fn check_editable(&self, caller: &str) -> Result<(), LockConflict> {
        match self.owner() {
            Some(owner) if owner != caller => Err(LockConflict::EditedBySomeoneElse),
            _ => Ok(()),
        }
    }

    /// Takes the lock. Idempotent for the current holder.
    pub fn acquire(self, caller: &str, now: Timestamp) -> Result<LockState, LockConflict> {
        match self {
            LockState::Unlocked => Ok(LockState::Held {
                owner: caller.to_string(),
                locked_at: now,
                pending: None,
            }),
            LockState::Held { ref owner, .. } if owner == caller => Ok(self),
            LockState::Held { .. } => Err(LockConflict::LockedBySomeoneElse),
        }
    }

    /// Drops the lock and any pending request. Ignored unless `caller` holds it.
    pub fn release(self, caller: &str) -> LockState {
        match self {
            LockState::Held { ref owner, .. } if owner == caller => LockState::Unlocked,
            other => other,
        }
    }

    /// Records `requester` as the pending transfer, replacing a request from
    /// anybody else.
    pub fn request_transfer(
        self,
        requester: &str,
        now: Timestamp,
    ) -> Result<LockState, LockConflict> {
        match self {
            LockState::Unlocked => Err(LockConflict::NotLocked),
            LockState::Held { ref owner, .. } if owner == requester => {
                Err(LockConflict::HeldByRequester)
            }
            LockState::Held {
                pending: Some(ref p),
                ..
            } if p.requester == requester => Err(LockConflict::AlreadyRequested),
            LockState::Held {
                owner, locked_at, ..
            } => Ok(LockState::Held {
                owner,
                locked_at,
                pending: Some(PendingTransfer {
                    requester: requester.to_string(),
                    requested_at: now,
                }),
            }),
        }
    }

    /// Withdraws the caller's own request. Ignored otherwise.
    pub fn cancel_transfer(self, requester: &str) -> LockState {
        match self {
            LockState::Held {
                owner,
                locked_at,
                pending: Some(p),
            } if p.requester == requester => LockState::Held {
                owner,
                locked_at,
                pending: None,
            },
            other => other,
        }
    }

    /// Takes the lock over once `cooldown_ms` has passed since the request.
    pub fn claim_transfer(
        self,
        requester: &str,
        now: Timestamp,
        cooldown_ms: i64,
    ) -> Result<LockState, LockConflict> {
        let Some(pending) = self.pending() else {
            return Err(LockConflict::NoPendingRequest);
        };
        if pending.requester != requester {
            return Err(LockConflict::RequestSuperseded);
        }
        let elapsed = now - pending.requested_at;
        if elapsed < cooldown_ms {
            return Err(LockConflict::MustWait {
                remaining_ms: cooldown_ms - elapsed,
            });
        }
        Ok(LockState::Held {
            owner: requester.to_string(),
            locked_at: now,
            pending: None,
        })
    }

    /// Rejects the pending request, keeping the lock where it is.
    pub fn deny_transfer(self, caller: &str) -> Result<LockState, LockConflict> {
        self.check_editable(caller)?;
        Ok(match self {
            LockState::Held {
                owner, locked_at, ..
            } => LockState::Held {
                owner,
                locked_at,
                pending: None,
            },
            LockState::Unlocked => LockState::Unlocked,
        })
    }

    /// Hands the lock to the requester recorded on this task.
    /// Without a pending request nothing changes.
    pub fn allow_transfer(self, caller: &str, now: Timestamp) -> Result<LockState, LockConflict> {
        self.check_editable(caller)?;
        Ok(match self {
            LockState::Held {
                pending: Some(p), ..
            } => LockState::Held {
                owner: p.requester,
                locked_at: now,
                pending: None,
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: &str = "token-one";
    const T2: &str = "token-two";
    const T3: &str = "token-three";

    fn held_by(owner: &str) -> LockState {
        LockState::Unlocked.acquire(owner, 1_000).unwrap()
    }

    #[test]
    fn test_acquire_unlocked_and_idempotent() {
        let state = held_by(T1);
        assert_eq!(state.owner(), Some(T1));

        let again = state.clone().acquire(T1, 2_000).unwrap();
        assert_eq!(again, state);
    }

    #[test]
    fn test_acquire_held_by_other_conflicts() {
        let err = held_by(T1).acquire(T2, 2_000).unwrap_err();
        assert_eq!(err, LockConflict::LockedBySomeoneElse);
    }

    #[test]
    fn test_editable_gate() {
        assert!(LockState::Unlocked.check_editable(T2).is_ok());
        assert!(held_by(T1).check_editable(T1).is_ok());
        assert_eq!(
            held_by(T1).check_editable(T2),
            Err(LockConflict::EditedBySomeoneElse)
        );
    }

    #[test]
    fn test_release_only_by_holder() {
        let state = held_by(T1).request_transfer(T2, 1_500).unwrap();
        let untouched = state.clone().release(T2);
        assert_eq!(untouched, state);

        assert_eq!(state.release(T1), LockState::Unlocked);
    }

    #[test]
    fn test_request_transfer_preconditions() {
        assert_eq!(
            LockState::Unlocked.request_transfer(T2, 10),
            Err(LockConflict::NotLocked)
        );
        assert_eq!(
            held_by(T1).request_transfer(T1, 10),
            Err(LockConflict::HeldByRequester)
        );

        let requested = held_by(T1).request_transfer(T2, 10).unwrap();
        assert_eq!(requested.pending().unwrap().requester, T2);
        assert_eq!(
            requested.request_transfer(T2, 20),
            Err(LockConflict::AlreadyRequested)
        );
    }

    #[test]
    fn test_newer_request_supersedes_older() {
        let state = held_by(T1)
            .request_transfer(T2, 10)
            .unwrap()
            .request_transfer(T3, 20)
            .unwrap();
        assert_eq!(state.pending().unwrap().requester, T3);
        assert_eq!(
            state.claim_transfer(T2, 10_000, DEFAULT_TRANSFER_COOLDOWN_MS),
            Err(LockConflict::RequestSuperseded)
        );
    }

    #[test]
    fn test_cancel_transfer_only_own_request() {
        let state = held_by(T1).request_transfer(T2, 10).unwrap();
        assert_eq!(state.clone().cancel_transfer(T3), state);

        let cancelled = state.cancel_transfer(T2);
        assert_eq!(cancelled.owner(), Some(T1));
        assert!(cancelled.pending().is_none());
    }

    #[test]
    fn test_claim_respects_cooldown() {
        let state = held_by(T1).request_transfer(T2, 10_000).unwrap();

        let err = state
            .clone()
            .claim_transfer(T2, 10_000, DEFAULT_TRANSFER_COOLDOWN_MS)
            .unwrap_err();
        assert_eq!(err, LockConflict::MustWait { remaining_ms: 5_000 });

        let err = state
            .clone()
            .claim_transfer(T2, 14_999, DEFAULT_TRANSFER_COOLDOWN_MS)
            .unwrap_err();
        assert_eq!(err, LockConflict::MustWait { remaining_ms: 1 });

        let claimed = state
            .claim_transfer(T2, 15_000, DEFAULT_TRANSFER_COOLDOWN_MS)
            .unwrap();
        assert_eq!(
            claimed,
            LockState::Held {
                owner: T2.to_string(),
                locked_at: 15_000,
                pending: None,
            }
        );
    }

    #[test]
    fn test_claim_by_other_token_always_fails() {
        let state = held_by(T1).request_transfer(T2, 0).unwrap();
        assert_eq!(
            state.claim_transfer(T3, 1_000_000, DEFAULT_TRANSFER_COOLDOWN_MS),
            Err(LockConflict::RequestSuperseded)
        );
    }

    #[test]
    fn test_deny_keeps_holder_and_clears_request() {
        let state = held_by(T1).request_transfer(T2, 10).unwrap();
        assert_eq!(
            state.clone().deny_transfer(T2),
            Err(LockConflict::EditedBySomeoneElse)
        );

        let denied = state.deny_transfer(T1).unwrap();
        assert_eq!(denied.owner(), Some(T1));
        assert!(denied.pending().is_none());
        assert_eq!(
            denied.claim_transfer(T2, 100_000, DEFAULT_TRANSFER_COOLDOWN_MS),
            Err(LockConflict::NoPendingRequest)
        );
    }

    #[test]
    fn test_allow_grants_recorded_requester() {
        let state = held_by(T1).request_transfer(T2, 10).unwrap();
        assert_eq!(
            state.clone().allow_transfer(T3, 20),
            Err(LockConflict::EditedBySomeoneElse)
        );

        let allowed = state.allow_transfer(T1, 20).unwrap();
        assert_eq!(
            allowed,
            LockState::Held {
                owner: T2.to_string(),
                locked_at: 20,
                pending: None,
            }
        );
    }

    #[test]
    fn test_allow_without_request_is_noop() {
        let state = held_by(T1);
        assert_eq!(state.clone().allow_transfer(T1, 20).unwrap(), state);
        assert_eq!(
            LockState::Unlocked.allow_transfer(T1, 20).unwrap(),
            LockState::Unlocked
        );
    }
}
