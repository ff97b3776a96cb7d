//! # Transition Validator
//!
//! Pure decision logic: given a record, a request (caller, operation, time,
//! optional expected counter), and the deadline policy, return either a
//! [`Transition`] plan or the [`EscrowError`] that rejects it. No I/O, no
//! clock reads, no mutation.
//!
//! ## Guard order
//!
//! 1. Terminal state (E107), for every caller.
//! 2. Expected counter, when supplied (E105). Replays of a committed call
//!    carry a stale counter and are rejected here.
//! 3. For `cancel` / `auto_cancel`: the fiat-paid lock (E105), for every
//!    caller and every time.
//! 4. Caller role (E102).
//! 5. Current state (E105).
//! 6. Time window (E103 / E104).
//! 7. Payload: amount (E100), sequential destination (E106).
//!
//! ## Authorization
//!
//! | Operation | Roles |
//! |---|---|
//! | create, fund | seller |
//! | mark_fiat_paid, update_sequential_address | buyer |
//! | release, cancel | seller, arbitrator |
//! | open_dispute | buyer, seller |
//! | resolve_dispute, auto_cancel | arbitrator |
//!
//! A record can also be funded by a payout forwarded from the preceding
//! leg; [`validate_forward`] plans that funding with the preceding leg's
//! custody account as the depositor.

use serde::{Deserialize, Serialize};

use escrow_core::{Address, Amount, EscrowConfig, Timestamp, TradeId};

use crate::deadline::{deposit_expired, fiat_expired, DeadlinePolicy};
use crate::dispute::{self, DisputeDecision};
use crate::error::EscrowError;
use crate::linker::{route_payout, PayoutRoute};
use crate::record::EscrowRecord;
use crate::state::{EscrowState, Role};
use crate::transition::{FundsMovement, OperationKind, RecordChange, Transition};

/// Parameters of a `create` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEscrow {
    /// The depositing party; must be the caller.
    pub seller: Address,
    /// The receiving party.
    pub buyer: Address,
    /// Escrowed amount in smallest units.
    pub amount: Amount,
    /// External trade id.
    pub trade_id: TradeId,
    /// Whether the payout forwards into another escrow.
    pub sequential: bool,
    /// The next leg's escrow address. Required when `sequential`.
    pub sequential_address: Option<Address>,
}

/// An operation on an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Deposit exactly the escrowed amount.
    Fund {
        /// The amount offered.
        amount: Amount,
    },
    /// Confirm fiat payment.
    MarkFiatPaid,
    /// Name or overwrite the next leg's escrow address.
    UpdateSequentialAddress {
        /// The new destination.
        address: Address,
    },
    /// Pay out held funds.
    Release,
    /// Cancel and refund any held funds.
    Cancel,
    /// Open a dispute.
    OpenDispute,
    /// Decide an open dispute.
    ResolveDispute {
        /// Payout or refund.
        decision: DisputeDecision,
    },
    /// Cancel after a lapsed deadline.
    AutoCancel,
}

impl Operation {
    /// The operation kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Fund { .. } => OperationKind::Fund,
            Self::MarkFiatPaid => OperationKind::MarkFiatPaid,
            Self::UpdateSequentialAddress { .. } => OperationKind::UpdateSequentialAddress,
            Self::Release => OperationKind::Release,
            Self::Cancel => OperationKind::Cancel,
            Self::OpenDispute => OperationKind::OpenDispute,
            Self::ResolveDispute { .. } => OperationKind::ResolveDispute,
            Self::AutoCancel => OperationKind::AutoCancel,
        }
    }
}

/// A call against an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// The caller identity.
    pub caller: Address,
    /// The requested operation.
    pub operation: Operation,
    /// Time of the call.
    pub now: Timestamp,
    /// The counter the caller believes the record is at.
    pub expected_counter: Option<u64>,
}

impl OperationRequest {
    /// A request without a counter expectation.
    pub fn new(caller: Address, operation: Operation, now: Timestamp) -> Self {
        Self {
            caller,
            operation,
            now,
            expected_counter: None,
        }
    }

    /// Require the record to be at `counter` when the request is validated.
    pub fn expecting_counter(mut self, counter: u64) -> Self {
        self.expected_counter = Some(counter);
        self
    }
}

/// Validate a `create` call.
///
/// # Errors
///
/// - E102 if the caller is not the seller, or seller, buyer, and arbitrator
///   are not pairwise distinct.
/// - E100 / E101 if the amount is zero or above the configured cap.
/// - E106 if `sequential` is set without a destination address.
/// - E105 if a destination address is supplied for a direct trade, or if the
///   seller or buyer address is an escrow custody account.
///
/// A destination naming the new record itself is caught by
/// [`EscrowRecord::create`], which knows the allocated id.
pub fn check_create(
    request: &CreateEscrow,
    caller: &Address,
    config: &EscrowConfig,
) -> Result<(), EscrowError> {
    const NEW: &str = "new";
    let operation = OperationKind::Create.as_str();
    let unauthorized = || EscrowError::Unauthorized {
        escrow_id: NEW.to_string(),
        operation,
        caller: caller.clone(),
    };
    if *caller != request.seller {
        return Err(unauthorized());
    }
    if request.seller == request.buyer
        || request.seller == config.arbitrator
        || request.buyer == config.arbitrator
    {
        return Err(unauthorized());
    }
    if request.seller.escrow_id().is_some() || request.buyer.escrow_id().is_some() {
        return Err(EscrowError::InvalidTransition {
            escrow_id: NEW.to_string(),
            operation,
            state: EscrowState::Created,
            reason: "party address lies in the escrow custody namespace".to_string(),
        });
    }
    if request.amount.is_zero() {
        return Err(EscrowError::InvalidAmount {
            escrow_id: NEW.to_string(),
            amount: request.amount,
            reason: "amount must be positive".to_string(),
        });
    }
    let cap = config.max_amount();
    if request.amount > cap {
        return Err(EscrowError::AmountExceedsCap {
            amount: request.amount,
            cap,
        });
    }
    match (request.sequential, &request.sequential_address) {
        (true, None) => Err(EscrowError::MissingSequentialAddress {
            escrow_id: NEW.to_string(),
            operation,
        }),
        (false, Some(_)) => Err(EscrowError::InvalidTransition {
            escrow_id: NEW.to_string(),
            operation,
            state: EscrowState::Created,
            reason: "destination address supplied for a direct trade".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Decide whether `request` may be applied to `record`.
pub fn validate(
    record: &EscrowRecord,
    request: &OperationRequest,
    policy: &DeadlinePolicy,
) -> Result<Transition, EscrowError> {
    let guard = Guard::new(record, request);
    guard.require_live()?;
    guard.require_counter()?;

    match &request.operation {
        Operation::Fund { amount } => fund(&guard, *amount, policy),
        Operation::MarkFiatPaid => mark_fiat_paid(&guard),
        Operation::UpdateSequentialAddress { address } => {
            update_sequential_address(&guard, address)
        }
        Operation::Release => release(&guard),
        Operation::Cancel => cancel(&guard),
        Operation::OpenDispute => dispute::open(&guard),
        Operation::ResolveDispute { decision } => dispute::resolve(&guard, *decision),
        Operation::AutoCancel => auto_cancel(&guard),
    }
}

fn fund(guard: &Guard<'_>, amount: Amount, policy: &DeadlinePolicy) -> Result<Transition, EscrowError> {
    let role = guard.authorize(&[Role::Seller])?;
    guard.require_state(EscrowState::Created)?;
    let record = guard.record;
    let now = guard.request.now;
    if deposit_expired(record, now) {
        return Err(guard.deposit_window(true));
    }
    if amount != record.amount() {
        return Err(EscrowError::InvalidAmount {
            escrow_id: guard.escrow_id(),
            amount,
            reason: format!("deposit must equal escrowed amount {}", record.amount()),
        });
    }
    Ok(guard.plan(
        role,
        EscrowState::Funded,
        RecordChange::Funded {
            fiat_deadline: policy.fiat_deadline(now),
        },
        Some(FundsMovement::Deposit {
            from: record.seller().clone(),
            amount,
        }),
    ))
}

/// Plan the funding of `leg2` by a payout that forwards into its custody.
///
/// The forwarding record's custody account stands in as the depositor, so
/// `leg2` holds the forwarded funds exactly as it would hold a seller
/// deposit and can pay them out or refund them later.
///
/// # Errors
///
/// - E105 if `payout` does not forward into `leg2`, or forwards a record
///   into itself.
/// - E107 if `leg2` is terminal; E105 if it is no longer `CREATED`.
/// - E103 if `leg2`'s deposit deadline has passed at the time of the payout.
/// - E100 if the forwarded amount differs from `leg2`'s escrowed amount.
pub fn validate_forward(
    leg2: &EscrowRecord,
    payout: &Transition,
    policy: &DeadlinePolicy,
) -> Result<Transition, EscrowError> {
    let upstream = Address::for_escrow(payout.escrow_id);
    let amount = payout
        .movement
        .as_ref()
        .map_or(Amount::ZERO, FundsMovement::amount);
    let request = OperationRequest::new(upstream.clone(), Operation::Fund { amount }, payout.at);
    let guard = Guard::new(leg2, &request);

    let forwards_here = matches!(
        &payout.movement,
        Some(FundsMovement::Payout { route: PayoutRoute::SequentialEscrow(to), .. })
            if *to == leg2.address()
    );
    if !forwards_here {
        return Err(guard.invalid("payout does not forward into this escrow"));
    }
    if payout.escrow_id == leg2.escrow_id() {
        return Err(guard.invalid("escrow cannot forward into its own custody"));
    }
    guard.require_live()?;
    guard.require_state(EscrowState::Created)?;
    if deposit_expired(leg2, payout.at) {
        return Err(guard.deposit_window(true));
    }
    if amount != leg2.amount() {
        return Err(EscrowError::InvalidAmount {
            escrow_id: guard.escrow_id(),
            amount,
            reason: format!("forwarded payout must equal escrowed amount {}", leg2.amount()),
        });
    }
    Ok(guard.plan(
        Role::PrecedingLeg,
        EscrowState::Funded,
        RecordChange::Funded {
            fiat_deadline: policy.fiat_deadline(payout.at),
        },
        Some(FundsMovement::Deposit {
            from: upstream,
            amount,
        }),
    ))
}

fn mark_fiat_paid(guard: &Guard<'_>) -> Result<Transition, EscrowError> {
    let role = guard.authorize(&[Role::Buyer])?;
    guard.require_state(EscrowState::Funded)?;
    if guard.record.fiat_paid() {
        return Err(guard.invalid("fiat payment already confirmed"));
    }
    if fiat_expired(guard.record, guard.request.now) {
        return Err(guard.fiat_window(true));
    }
    Ok(guard.plan(role, EscrowState::Funded, RecordChange::FiatPaid, None))
}

// No proof of address ownership is required: the buyer's latest write wins.
fn update_sequential_address(
    guard: &Guard<'_>,
    address: &Address,
) -> Result<Transition, EscrowError> {
    let role = guard.authorize(&[Role::Buyer])?;
    let record = guard.record;
    if !record.is_sequential() {
        return Err(guard.invalid("record is not a sequential trade"));
    }
    if *address == record.address() {
        return Err(guard.invalid("escrow cannot forward into its own custody"));
    }
    Ok(guard.plan(
        role,
        record.state(),
        RecordChange::SequentialTarget {
            previous: record.sequential_target().clone(),
            next: address.clone(),
        },
        None,
    ))
}

fn release(guard: &Guard<'_>) -> Result<Transition, EscrowError> {
    let role = guard.authorize(&[Role::Seller, Role::Arbitrator])?;
    guard.require_state(EscrowState::Funded)?;
    if !guard.record.fiat_paid() {
        return Err(guard.invalid("fiat payment not confirmed"));
    }
    let route = route_payout(guard.record, guard.op)?;
    let amount = guard.held_amount()?;
    Ok(guard.plan(
        role,
        EscrowState::Released,
        RecordChange::Closed,
        Some(FundsMovement::Payout { route, amount }),
    ))
}

fn cancel(guard: &Guard<'_>) -> Result<Transition, EscrowError> {
    guard.require_fiat_unpaid()?;
    let role = guard.authorize(&[Role::Seller, Role::Arbitrator])?;
    match guard.record.state() {
        EscrowState::Created => Ok(guard.plan(role, EscrowState::Cancelled, RecordChange::Closed, None)),
        EscrowState::Funded => {
            if !fiat_expired(guard.record, guard.request.now) {
                return Err(guard.fiat_window(false));
            }
            guard.refund_plan(role)
        }
        _ => Err(guard.invalid("only created or funded escrows can be cancelled")),
    }
}

fn auto_cancel(guard: &Guard<'_>) -> Result<Transition, EscrowError> {
    guard.require_fiat_unpaid()?;
    let role = guard.authorize(&[Role::Arbitrator])?;
    let now = guard.request.now;
    match guard.record.state() {
        EscrowState::Created => {
            if !deposit_expired(guard.record, now) {
                return Err(guard.deposit_window(false));
            }
            Ok(guard.plan(role, EscrowState::Cancelled, RecordChange::Closed, None))
        }
        EscrowState::Funded => {
            if !fiat_expired(guard.record, now) {
                return Err(guard.fiat_window(false));
            }
            guard.refund_plan(role)
        }
        _ => Err(guard.invalid("only created or funded escrows can be auto-cancelled")),
    }
}

/// Shared guard helpers bound to one record and one request.
pub(crate) struct Guard<'a> {
    pub(crate) record: &'a EscrowRecord,
    pub(crate) request: &'a OperationRequest,
    pub(crate) op: OperationKind,
}

impl<'a> Guard<'a> {
    fn new(record: &'a EscrowRecord, request: &'a OperationRequest) -> Self {
        Self {
            record,
            request,
            op: request.operation.kind(),
        }
    }

    pub(crate) fn escrow_id(&self) -> String {
        self.record.escrow_id().to_string()
    }

    fn require_live(&self) -> Result<(), EscrowError> {
        let state = self.record.state();
        if state.is_terminal() {
            return Err(EscrowError::TerminalState {
                escrow_id: self.escrow_id(),
                operation: self.op.as_str(),
                state,
            });
        }
        Ok(())
    }

    fn require_counter(&self) -> Result<(), EscrowError> {
        match self.request.expected_counter {
            Some(expected) if expected != self.record.counter() => Err(self.invalid(&format!(
                "expected counter {expected}, record is at {}",
                self.record.counter()
            ))),
            _ => Ok(()),
        }
    }

    fn require_fiat_unpaid(&self) -> Result<(), EscrowError> {
        if self.record.fiat_paid() {
            return Err(self.invalid("fiat payment confirmed; cancellation is locked"));
        }
        Ok(())
    }

    pub(crate) fn authorize(&self, allowed: &[Role]) -> Result<Role, EscrowError> {
        self.record
            .role_of(&self.request.caller)
            .filter(|role| allowed.contains(role))
            .ok_or_else(|| EscrowError::Unauthorized {
                escrow_id: self.escrow_id(),
                operation: self.op.as_str(),
                caller: self.request.caller.clone(),
            })
    }

    pub(crate) fn require_state(&self, expected: EscrowState) -> Result<(), EscrowError> {
        if self.record.state() != expected {
            return Err(self.invalid(&format!("requires state {expected}")));
        }
        Ok(())
    }

    pub(crate) fn invalid(&self, reason: &str) -> EscrowError {
        EscrowError::InvalidTransition {
            escrow_id: self.escrow_id(),
            operation: self.op.as_str(),
            state: self.record.state(),
            reason: reason.to_string(),
        }
    }

    fn deposit_window(&self, passed: bool) -> EscrowError {
        EscrowError::DepositDeadline {
            escrow_id: self.escrow_id(),
            operation: self.op.as_str(),
            deadline: self.record.deposit_deadline(),
            now: self.request.now,
            passed,
        }
    }

    fn fiat_window(&self, passed: bool) -> EscrowError {
        EscrowError::FiatDeadline {
            escrow_id: self.escrow_id(),
            operation: self.op.as_str(),
            deadline: self.record.fiat_deadline(),
            now: self.request.now,
            passed,
        }
    }

    /// The held amount. Every transfer-out path goes through here.
    pub(crate) fn held_amount(&self) -> Result<Amount, EscrowError> {
        self.record
            .held_funds()
            .amount()
            .ok_or_else(|| self.invalid("no funds held"))
    }

    pub(crate) fn refund_plan(&self, role: Role) -> Result<Transition, EscrowError> {
        let amount = self.held_amount()?;
        Ok(self.plan(
            role,
            EscrowState::Cancelled,
            RecordChange::Closed,
            Some(FundsMovement::Refund {
                to: self.record.seller().clone(),
                amount,
            }),
        ))
    }

    pub(crate) fn plan(
        &self,
        role: Role,
        to: EscrowState,
        change: RecordChange,
        movement: Option<FundsMovement>,
    ) -> Transition {
        Transition {
            escrow_id: self.record.escrow_id(),
            operation: self.op,
            caller: self.request.caller.clone(),
            role,
            from: self.record.state(),
            to,
            counter_before: self.record.counter(),
            at: self.request.now,
            change,
            movement,
        }
    }
}
