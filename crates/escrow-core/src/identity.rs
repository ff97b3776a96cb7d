//! # Identity Newtypes
//!
//! Identifiers used throughout the escrow core. Each is a distinct type:
//! you cannot pass a [`TradeId`] where an [`EscrowId`] is expected.
//!
//! ## Validation
//!
//! [`Address`] validates at construction time (non-empty, no whitespace).
//! [`EscrowId`] is allocated by the record store and always valid.
//! [`TradeId`] follows the leg convention `N00` (leg 1), `N01` (leg 2), ...

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Escrow identifiers
// ---------------------------------------------------------------------------

/// A unique identifier for an escrow record. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EscrowId(u64);

impl EscrowId {
    /// Wrap a raw escrow number.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Access the raw escrow number.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EscrowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "escrow:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Trade identifiers
// ---------------------------------------------------------------------------

/// External trade identifier.
///
/// Multi-leg remittance trades share a base number `N`; leg 1 is `N00`,
/// leg 2 is `N01`, and so on up to leg 100 (`N99`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(u64);

impl TradeId {
    /// Wrap a raw trade number as supplied by the caller.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Build the trade id for `leg` (1-based) of base trade `base`.
    pub fn leg(base: u64, leg: u8) -> Result<Self, ValidationError> {
        if leg == 0 || leg > 100 {
            return Err(ValidationError::InvalidTradeLeg { base, leg });
        }
        base.checked_mul(100)
            .and_then(|n| n.checked_add(u64::from(leg - 1)))
            .map(Self)
            .ok_or(ValidationError::InvalidTradeLeg { base, leg })
    }

    /// Access the raw trade number.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The base trade number shared by every leg.
    pub fn base(&self) -> u64 {
        self.0 / 100
    }

    /// The 1-based leg number.
    pub fn leg_number(&self) -> u8 {
        // Remainder is < 100, so the cast cannot truncate.
        (self.0 % 100) as u8 + 1
    }

    /// The trade id of the following leg, if one can exist.
    pub fn next_leg(&self) -> Option<Self> {
        if self.0 % 100 == 99 {
            return None;
        }
        self.0.checked_add(1).map(Self)
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Party and escrow addresses
// ---------------------------------------------------------------------------

/// An identity on the custody ledger: a counterparty, the arbitrator,
/// or another escrow record acting as a sequential destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Create a validated address.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAddress`] if the string is empty
    /// or contains whitespace.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidAddress(s));
        }
        Ok(Self(s))
    }

    /// The ledger address of an escrow record.
    pub fn for_escrow(id: EscrowId) -> Self {
        Self(id.to_string())
    }

    /// The escrow whose custody account this is, if the address lies in
    /// the `escrow:<n>` namespace.
    pub fn escrow_id(&self) -> Option<EscrowId> {
        self.0
            .strip_prefix("escrow:")
            .and_then(|n| n.parse().ok())
            .map(EscrowId)
            .filter(|id| Self::for_escrow(*id) == *self)
    }

    /// Access the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}
