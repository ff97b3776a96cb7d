//! # Escrow Error Types
//!
//! The closed rejection taxonomy of the escrow state machine. Every variant
//! maps to exactly one stable code (`E100`..`E107`) that callers may match on;
//! the display text carries the diagnostic context (escrow, operation,
//! current state, deadline) for operators.
//!
//! A rejection never has partial effect: no funds move, the record's counter
//! does not advance, and no audit event is emitted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_core::{Address, Amount, Timestamp};

use crate::state::EscrowState;

/// Stable error codes surfaced to external callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Amount is zero or otherwise invalid.
    E100,
    /// Amount exceeds the configured cap.
    E101,
    /// Caller is not authorized for this operation.
    E102,
    /// Deposit deadline window violated.
    E103,
    /// Fiat-payment deadline window violated.
    E104,
    /// Transition is illegal from the current state.
    E105,
    /// Sequential trade is missing its destination address.
    E106,
    /// Escrow is already in a terminal state.
    E107,
}

impl ErrorCode {
    /// The canonical code string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E100 => "E100",
            Self::E101 => "E101",
            Self::E102 => "E102",
            Self::E103 => "E103",
            Self::E104 => "E104",
            Self::E105 => "E105",
            Self::E106 => "E106",
            Self::E107 => "E107",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejections produced by the transition validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Amount is zero or does not match the escrowed amount.
    #[error("[E100] invalid amount {amount} for {escrow_id}: {reason}")]
    InvalidAmount {
        /// The escrow identifier (or `new` during creation).
        escrow_id: String,
        /// The rejected amount.
        amount: Amount,
        /// Why the amount was rejected.
        reason: String,
    },

    /// Amount exceeds the configured cap.
    #[error("[E101] amount {amount} exceeds cap {cap}")]
    AmountExceedsCap {
        /// The rejected amount.
        amount: Amount,
        /// The inclusive cap.
        cap: Amount,
    },

    /// Caller is not authorized for the requested operation.
    #[error("[E102] {caller} is not authorized to {operation} on {escrow_id}")]
    Unauthorized {
        /// The escrow identifier (or `new` during creation).
        escrow_id: String,
        /// The attempted operation.
        operation: &'static str,
        /// The caller identity.
        caller: Address,
    },

    /// The deposit deadline window does not permit the operation.
    #[error(
        "[E103] {operation} on {escrow_id} rejected: deposit deadline {deadline} {} at {now}",
        window_phrase(.passed)
    )]
    DepositDeadline {
        /// The escrow identifier.
        escrow_id: String,
        /// The attempted operation.
        operation: &'static str,
        /// The deposit deadline.
        deadline: Timestamp,
        /// The time of the call.
        now: Timestamp,
        /// Whether the deadline had already passed.
        passed: bool,
    },

    /// The fiat-payment deadline window does not permit the operation.
    #[error(
        "[E104] {operation} on {escrow_id} rejected: fiat deadline {deadline} {} at {now}",
        window_phrase(.passed)
    )]
    FiatDeadline {
        /// The escrow identifier.
        escrow_id: String,
        /// The attempted operation.
        operation: &'static str,
        /// The fiat deadline.
        deadline: Timestamp,
        /// The time of the call.
        now: Timestamp,
        /// Whether the deadline had already passed.
        passed: bool,
    },

    /// The operation is not legal from the record's current state.
    #[error("[E105] cannot {operation} {escrow_id} in state {state}: {reason}")]
    InvalidTransition {
        /// The escrow identifier.
        escrow_id: String,
        /// The attempted operation.
        operation: &'static str,
        /// The current state.
        state: EscrowState,
        /// Human-readable reason for the rejection.
        reason: String,
    },

    /// A sequential trade has no destination escrow address yet.
    #[error("[E106] sequential {escrow_id} has no destination escrow address for {operation}")]
    MissingSequentialAddress {
        /// The escrow identifier.
        escrow_id: String,
        /// The attempted operation.
        operation: &'static str,
    },

    /// The record is terminal and accepts no further operations.
    #[error("[E107] {escrow_id} is in terminal state {state}; {operation} rejected")]
    TerminalState {
        /// The escrow identifier.
        escrow_id: String,
        /// The attempted operation.
        operation: &'static str,
        /// The terminal state.
        state: EscrowState,
    },
}

fn window_phrase(passed: &bool) -> &'static str {
    if *passed {
        "has passed"
    } else {
        "has not passed"
    }
}

impl EscrowError {
    /// The stable code for this rejection.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidAmount { .. } => ErrorCode::E100,
            Self::AmountExceedsCap { .. } => ErrorCode::E101,
            Self::Unauthorized { .. } => ErrorCode::E102,
            Self::DepositDeadline { .. } => ErrorCode::E103,
            Self::FiatDeadline { .. } => ErrorCode::E104,
            Self::InvalidTransition { .. } => ErrorCode::E105,
            Self::MissingSequentialAddress { .. } => ErrorCode::E106,
            Self::TerminalState { .. } => ErrorCode::E107,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    #[test]
    fn codes_are_stable() {
        let err = EscrowError::AmountExceedsCap {
            amount: Amount::new(2),
            cap: Amount::new(1),
        };
        assert_eq!(err.code(), ErrorCode::E101);
        assert_eq!(err.code().as_str(), "E101");
    }

    #[test]
    fn display_includes_code_and_context() {
        let err = EscrowError::InvalidTransition {
            escrow_id: "escrow:9".to_string(),
            operation: "release",
            state: EscrowState::Created,
            reason: "fiat payment not confirmed".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("[E105]"));
        assert!(msg.contains("escrow:9"));
        assert!(msg.contains("CREATED"));
        assert!(msg.contains("fiat payment not confirmed"));
    }

    #[test]
    fn deadline_display_distinguishes_direction() {
        let early = EscrowError::FiatDeadline {
            escrow_id: "escrow:1".to_string(),
            operation: "cancel",
            deadline: ts(1_800),
            now: ts(1_740),
            passed: false,
        };
        let late = EscrowError::FiatDeadline {
            escrow_id: "escrow:1".to_string(),
            operation: "mark_fiat_paid",
            deadline: ts(1_800),
            now: ts(1_860),
            passed: true,
        };
        assert!(format!("{early}").contains("has not passed"));
        assert!(format!("{late}").contains("has passed"));
        assert_eq!(early.code(), ErrorCode::E104);
    }

    #[test]
    fn error_code_serializes_as_string() {
        assert_eq!(serde_json::to_string(&ErrorCode::E106).unwrap(), "\"E106\"");
    }
}
