//! # Escrow Record
//!
//! The canonical per-leg entity. Fields are private: a record is built only
//! by [`EscrowRecord::create`] and changed only by [`EscrowRecord::apply`]
//! with a [`Transition`] the validator produced for it. That keeps the
//! held-funds slot exclusively owned by the record between `fund` and the
//! payout or refund that empties it.
//!
//! ## Invariants
//!
//! - `0 < amount`; the configured cap is enforced at creation.
//! - `held` is `Holding(amount)` iff the state is `FUNDED` or `DISPUTED`.
//! - `sequential_target` is `Unset` for direct trades.
//! - `fiat_paid`, once set, is never reset; `DISPUTED` and `RESOLVED`
//!   imply it.
//! - `counter` advances by exactly one per committed transition.
//! - Terminal records are never modified again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_core::{Address, Amount, EscrowConfig, EscrowId, Timestamp, TradeId};

use crate::deadline::DeadlinePolicy;
use crate::dispute::DisputeStatus;
use crate::error::EscrowError;
use crate::state::{EscrowState, HeldFunds, Role, SequentialTarget};
use crate::transition::{FundsMovement, OperationKind, RecordChange, Transition};
use crate::validator::{check_create, CreateEscrow};

/// One escrow leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    escrow_id: EscrowId,
    trade_id: TradeId,
    seller: Address,
    buyer: Address,
    arbitrator: Address,
    amount: Amount,
    deposit_deadline: Timestamp,
    fiat_deadline: Timestamp,
    state: EscrowState,
    sequential: bool,
    sequential_target: SequentialTarget,
    fiat_paid: bool,
    counter: u64,
    held: HeldFunds,
    dispute: DisputeStatus,
    created_at: Timestamp,
    funded_at: Option<Timestamp>,
    updated_at: Timestamp,
}

/// A record that fails the invariants listed in the module docs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{escrow_id} violates record invariant: {detail}")]
pub struct InvariantViolation {
    /// The offending record.
    pub escrow_id: EscrowId,
    /// Which invariant failed.
    pub detail: String,
}

impl EscrowRecord {
    /// Validate a `create` call and build the new record in `CREATED`.
    ///
    /// The arbitrator is taken from `config`. The deposit deadline is
    /// `now + deposit window`; the fiat deadline is a placeholder
    /// (`now + fiat window`) until funding re-anchors it.
    ///
    /// # Errors
    ///
    /// See [`check_create`]. Additionally E105 if the sequential destination
    /// is the new record's own custody address.
    pub fn create(
        escrow_id: EscrowId,
        request: &CreateEscrow,
        caller: &Address,
        now: Timestamp,
        config: &EscrowConfig,
    ) -> Result<Self, EscrowError> {
        check_create(request, caller, config)?;
        if request.sequential_address.as_ref() == Some(&Address::for_escrow(escrow_id)) {
            return Err(EscrowError::InvalidTransition {
                escrow_id: escrow_id.to_string(),
                operation: OperationKind::Create.as_str(),
                state: EscrowState::Created,
                reason: "escrow cannot forward into its own custody".to_string(),
            });
        }
        let policy = DeadlinePolicy::from_config(config);
        Ok(Self {
            escrow_id,
            trade_id: request.trade_id,
            seller: request.seller.clone(),
            buyer: request.buyer.clone(),
            arbitrator: config.arbitrator.clone(),
            amount: request.amount,
            deposit_deadline: policy.deposit_deadline(now),
            fiat_deadline: policy.fiat_deadline(now),
            state: EscrowState::Created,
            sequential: request.sequential,
            sequential_target: request.sequential_address.clone().into(),
            fiat_paid: false,
            counter: 0,
            held: HeldFunds::Empty,
            dispute: DisputeStatus::NotDisputed,
            created_at: now,
            funded_at: None,
            updated_at: now,
        })
    }

    /// Commit a validated transition.
    ///
    /// # Errors
    ///
    /// E105 if the plan was validated against a different record, state, or
    /// counter, or if its funds movement disagrees with the held-funds slot.
    /// The record is unchanged on error.
    pub fn apply(&mut self, transition: &Transition) -> Result<(), EscrowError> {
        let stale = |reason: &str| EscrowError::InvalidTransition {
            escrow_id: self.escrow_id.to_string(),
            operation: transition.operation.as_str(),
            state: self.state,
            reason: reason.to_string(),
        };
        if transition.escrow_id != self.escrow_id {
            return Err(stale("transition belongs to another escrow"));
        }
        if transition.from != self.state || transition.counter_before != self.counter {
            return Err(stale("transition is stale"));
        }
        let held = match &transition.movement {
            Some(FundsMovement::Deposit { amount, .. }) => {
                if self.held.is_holding() {
                    return Err(stale("funds already held"));
                }
                HeldFunds::Holding(*amount)
            }
            Some(movement) => {
                if self.held.amount() != Some(movement.amount()) {
                    return Err(stale("outgoing amount does not match held funds"));
                }
                HeldFunds::Empty
            }
            None => self.held,
        };
        let counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| stale("counter exhausted"))?;

        match &transition.change {
            RecordChange::Funded { fiat_deadline } => {
                self.fiat_deadline = *fiat_deadline;
                self.funded_at = Some(transition.at);
            }
            RecordChange::FiatPaid => self.fiat_paid = true,
            RecordChange::SequentialTarget { next, .. } => {
                self.sequential_target = SequentialTarget::Address(next.clone());
            }
            RecordChange::DisputeOpened => {
                self.dispute = DisputeStatus::Open {
                    opened_by: transition.role,
                    opened_at: transition.at,
                };
            }
            RecordChange::DisputeResolved { decision } => {
                let opened_by = match self.dispute {
                    DisputeStatus::Open { opened_by, .. } => opened_by,
                    _ => return Err(stale("no open dispute")),
                };
                self.dispute = DisputeStatus::Resolved {
                    opened_by,
                    decision: *decision,
                    resolved_at: transition.at,
                };
            }
            RecordChange::Closed => {}
        }
        self.held = held;
        self.state = transition.to;
        self.counter = counter;
        self.updated_at = transition.at;
        Ok(())
    }

    /// The record as it would be after committing `transition`, which must
    /// leave every invariant intact. `self` is not modified.
    ///
    /// # Errors
    ///
    /// E105 if [`apply`](Self::apply) rejects the plan or the result fails
    /// [`check_invariants`](Self::check_invariants).
    pub fn advanced(&self, transition: &Transition) -> Result<Self, EscrowError> {
        let mut next = self.clone();
        next.apply(transition)?;
        next.check_invariants()
            .map_err(|violation| EscrowError::InvalidTransition {
                escrow_id: self.escrow_id.to_string(),
                operation: transition.operation.as_str(),
                state: self.state,
                reason: violation.to_string(),
            })?;
        Ok(next)
    }

    /// Check every record invariant.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let violation = |detail: &str| InvariantViolation {
            escrow_id: self.escrow_id,
            detail: detail.to_string(),
        };
        if self.amount.is_zero() {
            return Err(violation("amount is zero"));
        }
        match self.held {
            HeldFunds::Holding(a) if !self.state.holds_funds() => {
                return Err(violation(&format!("holds {a} in state {}", self.state)));
            }
            HeldFunds::Holding(a) if a != self.amount => {
                return Err(violation("held amount differs from escrowed amount"));
            }
            HeldFunds::Empty if self.state.holds_funds() => {
                return Err(violation(&format!("state {} without held funds", self.state)));
            }
            _ => {}
        }
        if !self.sequential && self.sequential_target.is_set() {
            return Err(violation("direct trade carries a sequential destination"));
        }
        let requires_fiat = matches!(
            self.state,
            EscrowState::Disputed | EscrowState::Resolved | EscrowState::Released
        );
        if requires_fiat && !self.fiat_paid {
            return Err(violation("state requires confirmed fiat payment"));
        }
        if self.fiat_paid && self.state == EscrowState::Created {
            return Err(violation("fiat paid before funding"));
        }
        match self.dispute.required_state() {
            Some(required) if required != self.state => {
                return Err(violation("dispute status disagrees with state"));
            }
            None if matches!(self.state, EscrowState::Disputed | EscrowState::Resolved) => {
                return Err(violation("disputed state without dispute status"));
            }
            _ => {}
        }
        if self.state == EscrowState::Created && self.funded_at.is_some() {
            return Err(violation("funding time recorded before funding"));
        }
        if self.deposit_deadline < self.created_at {
            return Err(violation("deposit deadline precedes creation"));
        }
        Ok(())
    }

    /// The role `caller` holds on this record, if any.
    pub fn role_of(&self, caller: &Address) -> Option<Role> {
        if *caller == self.seller {
            Some(Role::Seller)
        } else if *caller == self.buyer {
            Some(Role::Buyer)
        } else if *caller == self.arbitrator {
            Some(Role::Arbitrator)
        } else {
            None
        }
    }

    /// The ledger address of this record, used as a leg-1 destination.
    pub fn address(&self) -> Address {
        Address::for_escrow(self.escrow_id)
    }

    /// Escrow identifier.
    pub fn escrow_id(&self) -> EscrowId {
        self.escrow_id
    }

    /// External trade identifier.
    pub fn trade_id(&self) -> TradeId {
        self.trade_id
    }

    /// Seller identity.
    pub fn seller(&self) -> &Address {
        &self.seller
    }

    /// Buyer identity.
    pub fn buyer(&self) -> &Address {
        &self.buyer
    }

    /// Arbitrator identity fixed at creation.
    pub fn arbitrator(&self) -> &Address {
        &self.arbitrator
    }

    /// Escrowed amount.
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Deadline for the seller's deposit.
    pub fn deposit_deadline(&self) -> Timestamp {
        self.deposit_deadline
    }

    /// Deadline for the buyer's fiat confirmation.
    pub fn fiat_deadline(&self) -> Timestamp {
        self.fiat_deadline
    }

    /// Current state.
    pub fn state(&self) -> EscrowState {
        self.state
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the payout forwards into another escrow.
    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    /// The sequential destination slot.
    pub fn sequential_target(&self) -> &SequentialTarget {
        &self.sequential_target
    }

    /// Whether the buyer confirmed fiat payment.
    pub fn fiat_paid(&self) -> bool {
        self.fiat_paid
    }

    /// Committed transitions so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// The held-funds slot.
    pub fn held_funds(&self) -> HeldFunds {
        self.held
    }

    /// Dispute bookkeeping.
    pub fn dispute(&self) -> DisputeStatus {
        self.dispute
    }

    /// Creation time.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Funding time, once funded.
    pub fn funded_at(&self) -> Option<Timestamp> {
        self.funded_at
    }

    /// Time of the last committed transition.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }
}
