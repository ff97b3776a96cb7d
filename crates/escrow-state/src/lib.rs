#![deny(missing_docs)]

//! # escrow-state — Escrow State Machine
//!
//! The decision core of the remittance escrow: a total function from
//! (record, caller, operation, time) to either a transition plan or a coded
//! rejection.
//!
//! - **Record** ([`record`]): the per-leg [`EscrowRecord`] and its invariants.
//! - **Validator** ([`validator`]): guard evaluation producing a
//!   [`Transition`] or an [`EscrowError`]. Pure, no I/O.
//! - **Linker** ([`linker`]): the single payout-routing rule shared by
//!   release and dispute payout, plus leg1 → leg2 chain checks.
//! - **Dispute** ([`dispute`]): the `FUNDED → DISPUTED → RESOLVED` branch.
//! - **Deadline** ([`deadline`]): deposit/fiat deadline computation and
//!   expiry predicates.
//!
//! ## State graph
//!
//! ```text
//! CREATED  --fund(seller, ≤ deposit_deadline, exact amount)-->          FUNDED
//! CREATED  --payout forwarded by the preceding leg (exact amount)-->    FUNDED
//! CREATED  --cancel(seller|arbitrator)-->                               CANCELLED
//! CREATED  --auto_cancel(arbitrator, > deposit_deadline)-->             CANCELLED
//! FUNDED   --mark_fiat_paid(buyer, ≤ fiat_deadline)-->                  FUNDED (fiat_paid)
//! FUNDED   --cancel(seller|arbitrator, !fiat_paid, > fiat_deadline)-->  CANCELLED
//! FUNDED   --auto_cancel(arbitrator, !fiat_paid, > fiat_deadline)-->    CANCELLED
//! FUNDED   --release(seller|arbitrator, fiat_paid, destination)-->      RELEASED
//! FUNDED   --open_dispute(buyer|seller, fiat_paid)-->                   DISPUTED
//! DISPUTED --resolve_dispute(arbitrator, payout|refund)-->              RESOLVED
//! ```
//!
//! Applying a plan is the only way to change a record, and a plan can be
//! applied once: it is bound to the counter it was validated against.

pub mod deadline;
pub mod dispute;
pub mod error;
pub mod linker;
pub mod record;
pub mod state;
pub mod transition;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use deadline::{deposit_expired, fiat_expired, DeadlinePolicy};
pub use dispute::{DisputeDecision, DisputeStatus};
pub use error::{ErrorCode, EscrowError};
pub use linker::{link_target, route_payout, verify_chain, ChainMismatch, PayoutRoute};
pub use record::{EscrowRecord, InvariantViolation};
pub use state::{EscrowState, HeldFunds, Role, SequentialTarget};
pub use transition::{FundsMovement, OperationKind, RecordChange, Transition};
pub use validator::{
    check_create, validate, validate_forward, CreateEscrow, Operation, OperationRequest,
};
