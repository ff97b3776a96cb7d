//! Fixtures shared by the integration test binaries.

#![allow(dead_code)]

use escrow_controller::{EscrowController, EscrowEvent, InMemoryLedger, MemoryEventLog};
use escrow_core::{Address, Amount, EscrowConfig, EscrowId, Timestamp, TradeId};
use escrow_state::CreateEscrow;

pub const SELLER: &str = "0x5e11e4";
pub const BUYER: &str = "0xb0b";
pub const ARBITRATOR: &str = "0xa4b1";
pub const STRANGER: &str = "0x5742";
/// 2026-01-15T12:00:00Z
pub const T0: i64 = 1_768_478_400;
pub const MINUTE: i64 = 60;
pub const SELLER_FUNDS: u64 = 10_000;

pub type Controller = EscrowController<InMemoryLedger, MemoryEventLog>;

pub fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

pub fn at(offset_secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(T0 + offset_secs).unwrap()
}

pub fn config() -> EscrowConfig {
    EscrowConfig::new(addr(ARBITRATOR))
}

pub fn controller() -> Controller {
    let ledger = InMemoryLedger::new();
    ledger.mint(&addr(SELLER), Amount::new(SELLER_FUNDS));
    EscrowController::new(config(), ledger, MemoryEventLog::new()).unwrap()
}

pub fn request(amount: u64, sequential: bool, address: Option<Address>) -> CreateEscrow {
    CreateEscrow {
        seller: addr(SELLER),
        buyer: addr(BUYER),
        amount: Amount::new(amount),
        trade_id: TradeId::leg(42, 1).unwrap(),
        sequential,
        sequential_address: address,
    }
}

/// Create at `T0` and return the new id.
pub fn open(c: &Controller, amount: u64, sequential: bool, address: Option<Address>) -> EscrowId {
    c.create(&addr(SELLER), &request(amount, sequential, address), at(0))
        .unwrap()
        .record
        .escrow_id()
}

/// Create, fund at `T0 + 1min`, and mark fiat paid at `T0 + 2min`.
pub fn paid(c: &Controller, amount: u64, sequential: bool, address: Option<Address>) -> EscrowId {
    let id = open(c, amount, sequential, address);
    c.fund(id, &addr(SELLER), Amount::new(amount), at(MINUTE)).unwrap();
    c.mark_fiat_paid(id, &addr(BUYER), at(2 * MINUTE)).unwrap();
    id
}

pub fn event_names(events: &[EscrowEvent]) -> Vec<&'static str> {
    events.iter().map(EscrowEvent::name).collect()
}
