//! # Known trust gaps
//!
//! Behaviour that is deliberately preserved but weak. These tests pin it so
//! that a future change (for example, requiring a signed proof of control
//! over the next-leg address) shows up as a visible test update.

mod common;

use common::*;
use escrow_controller::EventDetail;
use escrow_core::Amount;
use escrow_state::ErrorCode;

/// The buyer can repoint a sequential payout at any address, at any time
/// before the record closes, without proving control of it. The last write
/// wins.
#[test]
fn sequential_address_update_is_unauthenticated_last_write_wins() {
    let c = controller();
    let id = paid(&c, 50, true, Some(addr("escrow:agreed-leg")));

    c.update_sequential_address(id, &addr(BUYER), addr("0xattacker"), at(3 * MINUTE))
        .unwrap();
    let receipt = c
        .update_sequential_address(id, &addr(BUYER), addr("0xelsewhere"), at(3 * MINUTE))
        .unwrap();
    match &receipt.event.detail {
        EventDetail::SequentialAddressUpdated { previous, address } => {
            assert_eq!(previous.as_ref(), Some(&addr("0xattacker")));
            assert_eq!(address, &addr("0xelsewhere"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    c.release(id, &addr(SELLER), at(4 * MINUTE)).unwrap();
    assert_eq!(c.ledger().balance_of(&addr("0xelsewhere")), Amount::new(50));
    assert_eq!(c.ledger().balance_of(&addr("escrow:agreed-leg")), Amount::ZERO);
}

/// Only the buyer identity is checked; the seller and arbitrator cannot
/// redirect the payout.
#[test]
fn only_the_buyer_may_redirect() {
    let c = controller();
    let id = open(&c, 50, true, Some(addr("escrow:agreed-leg")));
    for caller in [SELLER, ARBITRATOR, STRANGER] {
        let err = c
            .update_sequential_address(id, &addr(caller), addr("0xattacker"), at(MINUTE))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E102));
    }
}
