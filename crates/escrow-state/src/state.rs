//! # Escrow States and Sum-Typed Slots
//!
//! The six lifecycle states and the explicit sum types that replace
//! "unset" sentinels on the record.
//!
//! ```text
//! CREATED ─fund──▶ FUNDED ─release──────▶ RELEASED
//!    │               │  │
//!    │            cancel open_dispute
//!  cancel /          │  │
//!  auto_cancel       ▼  ▼
//!    │         CANCELLED DISPUTED ─resolve_dispute──▶ RESOLVED
//!    ▼
//! CANCELLED
//! ```
//!
//! Terminal states: `RELEASED`, `CANCELLED`, `RESOLVED`.

use serde::{Deserialize, Serialize};

use escrow_core::{Address, Amount};

/// Lifecycle state of an escrow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowState {
    /// Created by the seller, awaiting the deposit.
    Created,
    /// Deposit held; awaiting fiat confirmation and release.
    Funded,
    /// Funds paid out to the buyer or the next leg. Terminal.
    Released,
    /// Cancelled; any held funds refunded to the seller. Terminal.
    Cancelled,
    /// Dispute open; only the arbitrator can move the funds.
    Disputed,
    /// Dispute decided by the arbitrator. Terminal.
    Resolved,
}

impl EscrowState {
    /// All states, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Funded,
        Self::Released,
        Self::Cancelled,
        Self::Disputed,
        Self::Resolved,
    ];

    /// Whether this state accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Cancelled | Self::Resolved)
    }

    /// Whether a record in this state must hold the deposited funds.
    pub fn holds_funds(&self) -> bool {
        matches!(self, Self::Funded | Self::Disputed)
    }

    /// Whether `next` is reachable from `self` in a single committed
    /// operation. Self-loops are allowed only on `FUNDED` (fiat confirmation,
    /// address update) and the other non-terminal states (address update).
    pub fn can_transition_to(&self, next: Self) -> bool {
        use EscrowState::*;
        match (self, next) {
            (Created, Created | Funded | Cancelled) => true,
            (Funded, Funded | Released | Cancelled | Disputed) => true,
            (Disputed, Disputed | Resolved) => true,
            _ => false,
        }
    }

    /// The canonical state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Funded => "FUNDED",
            Self::Released => "RELEASED",
            Self::Cancelled => "CANCELLED",
            Self::Disputed => "DISPUTED",
            Self::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The funds slot of a record. `Holding` exactly while the state is
/// `FUNDED` or `DISPUTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeldFunds {
    /// Nothing held.
    #[default]
    Empty,
    /// The record holds this amount.
    Holding(Amount),
}

impl HeldFunds {
    /// The held amount, if any.
    pub fn amount(&self) -> Option<Amount> {
        match self {
            Self::Empty => None,
            Self::Holding(a) => Some(*a),
        }
    }

    /// Whether funds are present.
    pub fn is_holding(&self) -> bool {
        matches!(self, Self::Holding(_))
    }
}

/// Destination of a sequential trade's payout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SequentialTarget {
    /// No destination escrow named yet.
    #[default]
    Unset,
    /// The next leg's escrow address.
    Address(Address),
}

impl SequentialTarget {
    /// The destination address, if set.
    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::Unset => None,
            Self::Address(a) => Some(a),
        }
    }

    /// Whether a destination has been named.
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Address(_))
    }
}

impl From<Option<Address>> for SequentialTarget {
    fn from(a: Option<Address>) -> Self {
        a.map_or(Self::Unset, Self::Address)
    }
}

/// The role a caller holds on a specific record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The party depositing the asset.
    Seller,
    /// The party receiving the asset after paying fiat.
    Buyer,
    /// The configured dispute-resolution authority.
    Arbitrator,
    /// The custody account of a preceding leg whose payout funds this
    /// record. Never held by an external caller.
    PrecedingLeg,
}

impl Role {
    /// The canonical role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seller => "seller",
            Self::Buyer => "buyer",
            Self::Arbitrator => "arbitrator",
            Self::PrecedingLeg => "preceding_leg",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
