//! # Dispute Sub-machine
//!
//! The restricted transition set reachable only from `FUNDED` with
//! `fiat_paid = true`:
//!
//! ```text
//! FUNDED(fiat_paid) ─open_dispute(buyer|seller)──▶ DISPUTED
//! DISPUTED ─resolve_dispute(arbitrator, payout)──▶ RESOLVED  (funds → route_payout)
//! DISPUTED ─resolve_dispute(arbitrator, refund)──▶ RESOLVED  (funds → seller)
//! ```
//!
//! Bonds, evidence submission, and response windows are not modelled here;
//! they would extend [`DisputeStatus`] with further sub-states between
//! `Open` and `Resolved`.

use serde::{Deserialize, Serialize};

use escrow_core::Timestamp;

use crate::error::EscrowError;
use crate::linker::route_payout;
use crate::state::{EscrowState, Role};
use crate::transition::{FundsMovement, RecordChange, Transition};
use crate::validator::Guard;

/// The arbitrator's ruling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeDecision {
    /// Pay out as a normal release would.
    Payout,
    /// Refund the seller.
    Refund,
}

impl DisputeDecision {
    /// `true` → payout, `false` → refund.
    pub fn from_bool(decision: bool) -> Self {
        if decision {
            Self::Payout
        } else {
            Self::Refund
        }
    }

    /// The boolean form used by external callers.
    pub fn as_bool(&self) -> bool {
        matches!(self, Self::Payout)
    }
}

impl From<bool> for DisputeDecision {
    fn from(decision: bool) -> Self {
        Self::from_bool(decision)
    }
}

/// Dispute bookkeeping on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisputeStatus {
    /// No dispute has been opened.
    #[default]
    NotDisputed,
    /// Dispute open, awaiting the arbitrator.
    Open {
        /// Who opened it.
        opened_by: Role,
        /// When it was opened.
        opened_at: Timestamp,
    },
    /// Dispute decided.
    Resolved {
        /// Who opened it.
        opened_by: Role,
        /// The ruling.
        decision: DisputeDecision,
        /// When it was decided.
        resolved_at: Timestamp,
    },
}

impl DisputeStatus {
    /// The state a record with this dispute status must be in, if fixed.
    pub(crate) fn required_state(&self) -> Option<EscrowState> {
        match self {
            Self::NotDisputed => None,
            Self::Open { .. } => Some(EscrowState::Disputed),
            Self::Resolved { .. } => Some(EscrowState::Resolved),
        }
    }
}

pub(crate) fn open(guard: &Guard<'_>) -> Result<Transition, EscrowError> {
    let role = guard.authorize(&[Role::Buyer, Role::Seller])?;
    guard.require_state(EscrowState::Funded)?;
    if !guard.record.fiat_paid() {
        return Err(guard.invalid("disputes require confirmed fiat payment"));
    }
    Ok(guard.plan(role, EscrowState::Disputed, RecordChange::DisputeOpened, None))
}

pub(crate) fn resolve(
    guard: &Guard<'_>,
    decision: DisputeDecision,
) -> Result<Transition, EscrowError> {
    let role = guard.authorize(&[Role::Arbitrator])?;
    guard.require_state(EscrowState::Disputed)?;
    let movement = match decision {
        DisputeDecision::Payout => {
            let route = route_payout(guard.record, guard.op)?;
            FundsMovement::Payout {
                route,
                amount: guard.held_amount()?,
            }
        }
        DisputeDecision::Refund => FundsMovement::Refund {
            to: guard.record.seller().clone(),
            amount: guard.held_amount()?,
        },
    };
    Ok(guard.plan(
        role,
        EscrowState::Resolved,
        RecordChange::DisputeResolved { decision },
        Some(movement),
    ))
}
