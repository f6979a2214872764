//! The shared status transition function.
//!
//! Both ingestion paths, webhook push and reconciliation sweep, funnel
//! every proposed status change through [`decide`] and persist through the
//! conditional write in [`apply`]. Neither path ever writes a status
//! directly, which is what makes their racing safe: terminal states are
//! sticky, repeated proposals are no-ops, and a lost conditional write just
//! means the other writer already finished the job.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{Purchase, PurchaseStatus};

/// Outcome of the pure decision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply(PurchaseStatus),
    Noop(NoopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    /// Current status is terminal; nothing automated may change it
    Terminal,
    /// Proposed status equals current; avoids updated_at churn
    Unchanged,
}

/// Decide what a proposed status means given the current one.
pub fn decide(current: PurchaseStatus, proposed: PurchaseStatus) -> Decision {
    if current.is_terminal() {
        return Decision::Noop(NoopReason::Terminal);
    }
    if proposed == current {
        return Decision::Noop(NoopReason::Unchanged);
    }
    Decision::Apply(proposed)
}

/// Outcome of a decide-and-persist attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Transitioned {
        from: PurchaseStatus,
        to: PurchaseStatus,
    },
    Skipped(NoopReason),
    /// The conditional write failed: a concurrent writer changed the status
    /// between our read and our write. Treated as success.
    LostRace,
}

impl ApplyOutcome {
    pub fn did_transition(self) -> bool {
        matches!(self, ApplyOutcome::Transitioned { .. })
    }
}

/// Apply a proposed status to a purchase as read by the caller.
///
/// The write is guarded by the status the decision was computed from, so a
/// stale read can never clobber a more advanced state.
pub fn apply(
    conn: &Connection,
    purchase: &Purchase,
    proposed: PurchaseStatus,
) -> Result<ApplyOutcome> {
    match decide(purchase.status, proposed) {
        Decision::Noop(reason) => Ok(ApplyOutcome::Skipped(reason)),
        Decision::Apply(next) => {
            if queries::try_transition_status(conn, &purchase.id, purchase.status, next)? {
                tracing::info!(
                    "purchase {} transitioned {} -> {}",
                    purchase.id,
                    purchase.status.as_ref(),
                    next.as_ref()
                );
                Ok(ApplyOutcome::Transitioned {
                    from: purchase.status,
                    to: next,
                })
            } else {
                tracing::debug!(
                    "purchase {} transition to {} lost the race, leaving as-is",
                    purchase.id,
                    next.as_ref()
                );
                Ok(ApplyOutcome::LostRace)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PurchaseStatus::*;

    #[test]
    fn test_pending_advances_to_any_proposal() {
        assert_eq!(decide(Pending, Approved), Decision::Apply(Approved));
        assert_eq!(decide(Pending, Rejected), Decision::Apply(Rejected));
        assert_eq!(decide(Pending, Cancelled), Decision::Apply(Cancelled));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for current in [Approved, Rejected, Cancelled] {
            for proposed in [Pending, Approved, Rejected, Cancelled] {
                assert_eq!(
                    decide(current, proposed),
                    Decision::Noop(NoopReason::Terminal),
                    "{:?} -> {:?} must be a no-op",
                    current,
                    proposed
                );
            }
        }
    }

    #[test]
    fn test_same_status_is_noop() {
        assert_eq!(decide(Pending, Pending), Decision::Noop(NoopReason::Unchanged));
    }

    #[test]
    fn test_decide_is_idempotent() {
        // Applying the decision's result and deciding again always no-ops
        let Decision::Apply(next) = decide(Pending, Approved) else {
            panic!("expected Apply");
        };
        assert_eq!(decide(next, Approved), Decision::Noop(NoopReason::Terminal));
    }
}
