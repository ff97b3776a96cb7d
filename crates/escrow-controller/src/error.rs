//! # Controller Error Types
//!
//! A call fails either because the state machine rejected it (a coded
//! [`EscrowError`]) or because an external collaborator could not prepare
//! its part of the transaction. In both cases nothing is committed: the
//! record, its counter, the ledger, and the event log are unchanged.

use thiserror::Error;

use escrow_core::{Address, Amount, EscrowId};
use escrow_state::{ChainMismatch, ErrorCode, EscrowError};

/// Errors returned by the lifecycle controller.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The state machine rejected the call.
    #[error(transparent)]
    Rejected(#[from] EscrowError),

    /// No record with this identifier exists.
    #[error("{0} not found")]
    UnknownEscrow(EscrowId),

    /// The ledger refused to prepare the funds movement.
    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),

    /// The event sink refused to stage the audit record.
    #[error("event sink failure: {0}")]
    EventSink(#[from] EventSinkError),

    /// Two records do not form a leg1 → leg2 chain.
    #[error("chain check failed: {0}")]
    Chain(#[from] ChainMismatch),
}

impl ControllerError {
    /// The stable rejection code, for state-machine rejections.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected(e) => Some(e.code()),
            _ => None,
        }
    }
}

/// Failures preparing a ledger transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The debited account cannot cover the transfer.
    #[error("account {account} holds {available}, transfer requires {required}")]
    InsufficientFunds {
        /// The debited account.
        account: Address,
        /// The transfer amount.
        required: Amount,
        /// The available balance.
        available: Amount,
    },

    /// The ledger is unavailable or refused the transaction.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Failures staging an audit event.
#[derive(Error, Debug)]
pub enum EventSinkError {
    /// The event could not be serialized.
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink's backing writer failed.
    #[error("event sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The sink is unavailable.
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}
