//! # Sequential Linker
//!
//! Payout routing for chained (multi-leg) remittance trades. A direct trade
//! pays the buyer; a sequential trade pays the next leg's escrow record.
//!
//! [`route_payout`] is the single routing rule. Both the normal `release`
//! path and the dispute `decision = payout` path call it, so the two payout
//! sites cannot drift apart.
//!
//! Legs are coupled by address only: leg 1 stores leg 2's escrow address as
//! its sequential destination. No state is shared between the records. A
//! payout forwarded into leg 2 funds it
//! ([`validate_forward`](crate::validator::validate_forward)), so the
//! forwarded amount is always held by a record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use escrow_core::{Address, EscrowId, TradeId};

use crate::error::EscrowError;
use crate::record::EscrowRecord;
use crate::transition::OperationKind;

/// Audit indicator for payouts to the buyer.
pub const DIRECT_TO_BUYER: &str = "direct to buyer";
/// Audit indicator for payouts to the next leg.
pub const SEQUENTIAL_ESCROW: &str = "sequential escrow";

/// Where a payout goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutRoute {
    /// Paid straight to the buyer.
    DirectToBuyer(Address),
    /// Forwarded into the next leg's escrow.
    SequentialEscrow(Address),
}

impl PayoutRoute {
    /// The receiving address.
    pub fn destination(&self) -> &Address {
        match self {
            Self::DirectToBuyer(a) | Self::SequentialEscrow(a) => a,
        }
    }

    /// The payout-destination indicator written to audit records.
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::DirectToBuyer(_) => DIRECT_TO_BUYER,
            Self::SequentialEscrow(_) => SEQUENTIAL_ESCROW,
        }
    }

    /// Whether the payout forwards into another escrow.
    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::SequentialEscrow(_))
    }
}

/// Resolve the payout destination of `record`.
///
/// `destination = sequential ? sequential_escrow_address : buyer`.
///
/// # Errors
///
/// [`EscrowError::MissingSequentialAddress`] (E106) if the record is
/// sequential and no destination has been set.
pub fn route_payout(
    record: &EscrowRecord,
    operation: OperationKind,
) -> Result<PayoutRoute, EscrowError> {
    if !record.is_sequential() {
        return Ok(PayoutRoute::DirectToBuyer(record.buyer().clone()));
    }
    record
        .sequential_target()
        .address()
        .cloned()
        .map(PayoutRoute::SequentialEscrow)
        .ok_or_else(|| EscrowError::MissingSequentialAddress {
            escrow_id: record.escrow_id().to_string(),
            operation: operation.as_str(),
        })
}

/// The address a leg-1 record must name to forward into `leg2`.
pub fn link_target(leg2: &EscrowRecord) -> Address {
    leg2.address()
}

/// Why two records do not form a valid leg1 → leg2 chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainMismatch {
    /// Leg 1 is a direct trade.
    #[error("{0} is not a sequential trade")]
    NotSequential(EscrowId),

    /// Leg 1 has not named a destination yet.
    #[error("{0} has no destination escrow address")]
    DestinationUnset(EscrowId),

    /// Leg 1 forwards somewhere other than leg 2.
    #[error("{leg1} forwards to {actual}, expected {expected}")]
    DestinationMismatch {
        /// The leg-1 record.
        leg1: EscrowId,
        /// Leg 2's escrow address.
        expected: Address,
        /// The address leg 1 actually names.
        actual: Address,
    },

    /// Trade ids do not follow the `N00 → N01` leg convention.
    #[error("trade {leg2} does not follow trade {leg1}")]
    TradeNotSuccessor {
        /// Leg 1's trade id.
        leg1: TradeId,
        /// Leg 2's trade id.
        leg2: TradeId,
    },
}

/// Check that `leg1` forwards into `leg2` and that their trade ids are
/// consecutive legs of the same base trade.
pub fn verify_chain(leg1: &EscrowRecord, leg2: &EscrowRecord) -> Result<(), ChainMismatch> {
    if !leg1.is_sequential() {
        return Err(ChainMismatch::NotSequential(leg1.escrow_id()));
    }
    let actual = leg1
        .sequential_target()
        .address()
        .ok_or(ChainMismatch::DestinationUnset(leg1.escrow_id()))?;
    let expected = link_target(leg2);
    if *actual != expected {
        return Err(ChainMismatch::DestinationMismatch {
            leg1: leg1.escrow_id(),
            expected,
            actual: actual.clone(),
        });
    }
    if leg1.trade_id().next_leg() != Some(leg2.trade_id()) {
        return Err(ChainMismatch::TradeNotSuccessor {
            leg1: leg1.trade_id(),
            leg2: leg2.trade_id(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, created_record, created_sequential, created_with_trade};

    #[test]
    fn direct_trade_routes_to_buyer() {
        let record = created_record(1, 50);
        let route = route_payout(&record, OperationKind::Release).unwrap();
        assert_eq!(route, PayoutRoute::DirectToBuyer(addr("0xb0b")));
        assert_eq!(route.indicator(), "direct to buyer");
        assert!(!route.is_sequential());
    }

    #[test]
    fn sequential_trade_routes_to_next_leg() {
        let record = created_sequential(1, 50, Some(addr("escrow:2")));
        let route = route_payout(&record, OperationKind::ResolveDispute).unwrap();
        assert_eq!(route, PayoutRoute::SequentialEscrow(addr("escrow:2")));
        assert_eq!(route.indicator(), "sequential escrow");
    }

    #[test]
    fn sequential_without_address_is_e106() {
        let record = created_sequential(1, 50, None);
        let err = route_payout(&record, OperationKind::Release).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::E106);
    }

    #[test]
    fn chain_verifies_address_and_trade_succession() {
        let leg2 = created_with_trade(2, TradeId::leg(4, 2).unwrap(), false, None);
        let leg1 = created_with_trade(
            1,
            TradeId::leg(4, 1).unwrap(),
            true,
            Some(link_target(&leg2)),
        );
        assert_eq!(verify_chain(&leg1, &leg2), Ok(()));
    }

    #[test]
    fn chain_rejects_wrong_destination() {
        let leg2 = created_with_trade(2, TradeId::leg(4, 2).unwrap(), false, None);
        let leg1 = created_with_trade(
            1,
            TradeId::leg(4, 1).unwrap(),
            true,
            Some(addr("escrow:99")),
        );
        assert!(matches!(
            verify_chain(&leg1, &leg2),
            Err(ChainMismatch::DestinationMismatch { .. })
        ));
    }

    #[test]
    fn chain_rejects_non_successor_trade() {
        let leg2 = created_with_trade(2, TradeId::leg(5, 2).unwrap(), false, None);
        let leg1 = created_with_trade(
            1,
            TradeId::leg(4, 1).unwrap(),
            true,
            Some(link_target(&leg2)),
        );
        assert!(matches!(
            verify_chain(&leg1, &leg2),
            Err(ChainMismatch::TradeNotSuccessor { .. })
        ));
    }

    #[test]
    fn chain_rejects_direct_and_unset() {
        let leg2 = created_record(2, 50);
        let direct = created_record(1, 50);
        assert_eq!(
            verify_chain(&direct, &leg2),
            Err(ChainMismatch::NotSequential(direct.escrow_id()))
        );
        let unset = created_sequential(3, 50, None);
        assert_eq!(
            verify_chain(&unset, &leg2),
            Err(ChainMismatch::DestinationUnset(unset.escrow_id()))
        );
    }
}
