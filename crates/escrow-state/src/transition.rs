//! # Transition Plans
//!
//! The output of the validator: a fully decided, not-yet-applied change to
//! one record. A [`Transition`] names the operation, the caller's role, the
//! source and target states, the record fields that change, and at most one
//! funds movement for the ledger to execute.
//!
//! A plan is bound to the record's counter at validation time. Applying it
//! to a record whose counter has since moved is rejected, so a plan can be
//! committed at most once.

use serde::{Deserialize, Serialize};

use escrow_core::{Address, Amount, EscrowId, Timestamp};

use crate::dispute::DisputeDecision;
use crate::linker::PayoutRoute;
use crate::state::{EscrowState, Role, SequentialTarget};

/// The public operations of the escrow lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Seller opens a new escrow.
    Create,
    /// Seller deposits the escrowed amount.
    Fund,
    /// Buyer confirms off-ledger fiat payment.
    MarkFiatPaid,
    /// Buyer names the next leg's escrow address.
    UpdateSequentialAddress,
    /// Seller or arbitrator pays out.
    Release,
    /// Seller or arbitrator cancels.
    Cancel,
    /// Buyer or seller opens a dispute.
    OpenDispute,
    /// Arbitrator decides a dispute.
    ResolveDispute,
    /// Arbitrator cancels after a lapsed deadline.
    AutoCancel,
}

impl OperationKind {
    /// The canonical operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Fund => "fund",
            Self::MarkFiatPaid => "mark_fiat_paid",
            Self::UpdateSequentialAddress => "update_sequential_address",
            Self::Release => "release",
            Self::Cancel => "cancel",
            Self::OpenDispute => "open_dispute",
            Self::ResolveDispute => "resolve_dispute",
            Self::AutoCancel => "auto_cancel",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record fields changed by a transition, beyond state and counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordChange {
    /// Deposit taken into custody; the fiat deadline is re-anchored.
    Funded {
        /// Authoritative fiat deadline (`funding time + fiat window`).
        fiat_deadline: Timestamp,
    },
    /// `fiat_paid` set. Never reset.
    FiatPaid,
    /// Sequential destination overwritten (last write wins).
    SequentialTarget {
        /// The destination before this write.
        previous: SequentialTarget,
        /// The new destination.
        next: Address,
    },
    /// Dispute opened by the caller.
    DisputeOpened,
    /// Dispute decided by the arbitrator.
    DisputeResolved {
        /// The arbitrator's decision.
        decision: DisputeDecision,
    },
    /// Record closed by release or cancellation.
    Closed,
}

/// A movement of the custody asset the ledger must execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundsMovement {
    /// Seller's deposit into the record's custody.
    Deposit {
        /// The depositing seller.
        from: Address,
        /// The deposited amount.
        amount: Amount,
    },
    /// Held funds paid to the buyer or the next leg.
    Payout {
        /// Where the funds go.
        route: PayoutRoute,
        /// The paid amount.
        amount: Amount,
    },
    /// Held funds returned to the seller.
    Refund {
        /// The seller receiving the refund.
        to: Address,
        /// The refunded amount.
        amount: Amount,
    },
}

impl FundsMovement {
    /// The amount moved.
    pub fn amount(&self) -> Amount {
        match self {
            Self::Deposit { amount, .. }
            | Self::Payout { amount, .. }
            | Self::Refund { amount, .. } => *amount,
        }
    }

    /// Whether funds leave the record's custody.
    pub fn is_outgoing(&self) -> bool {
        !matches!(self, Self::Deposit { .. })
    }

    /// The receiving address of an outgoing movement.
    pub fn destination(&self) -> Option<&Address> {
        match self {
            Self::Deposit { .. } => None,
            Self::Payout { route, .. } => Some(route.destination()),
            Self::Refund { to, .. } => Some(to),
        }
    }
}

/// A validated, not-yet-applied transition of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// The record this plan was validated against.
    pub escrow_id: EscrowId,
    /// The operation.
    pub operation: OperationKind,
    /// The caller identity.
    pub caller: Address,
    /// The caller's role on the record.
    pub role: Role,
    /// State at validation time.
    pub from: EscrowState,
    /// State after commit.
    pub to: EscrowState,
    /// Counter at validation time.
    pub counter_before: u64,
    /// Time of the call.
    pub at: Timestamp,
    /// Field changes.
    pub change: RecordChange,
    /// Funds the ledger must move, if any.
    pub movement: Option<FundsMovement>,
}

impl Transition {
    /// The record counter once this plan is committed.
    pub fn counter_after(&self) -> u64 {
        self.counter_before.saturating_add(1)
    }
}
