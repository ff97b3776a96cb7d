//! Shared fixtures for unit tests.

use escrow_core::{Address, Amount, EscrowConfig, EscrowId, Timestamp, TradeId};
use escrow_state::{CreateEscrow, EscrowRecord};

use crate::controller::EscrowController;
use crate::ledger::InMemoryLedger;
use crate::sink::MemoryEventLog;

pub(crate) const SELLER: &str = "0x5e11e4";
pub(crate) const BUYER: &str = "0xb0b";
pub(crate) const ARBITRATOR: &str = "0xa4b1";
/// 2026-01-15T12:00:00Z
pub(crate) const T0: i64 = 1_768_478_400;
pub(crate) const SELLER_FUNDS: u64 = 1_000;

pub(crate) type TestController = EscrowController<InMemoryLedger, MemoryEventLog>;

pub(crate) fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

pub(crate) fn ts(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(secs).unwrap()
}

pub(crate) fn config() -> EscrowConfig {
    EscrowConfig::new(addr(ARBITRATOR))
}

pub(crate) fn create_request(
    amount: u64,
    sequential: bool,
    sequential_address: Option<Address>,
) -> CreateEscrow {
    CreateEscrow {
        seller: addr(SELLER),
        buyer: addr(BUYER),
        amount: Amount::new(amount),
        trade_id: TradeId::leg(1, 1).unwrap(),
        sequential,
        sequential_address,
    }
}

pub(crate) fn created(id: u64) -> EscrowRecord {
    EscrowRecord::create(
        EscrowId::new(id),
        &create_request(50, false, None),
        &addr(SELLER),
        ts(T0),
        &config(),
    )
    .unwrap()
}

pub(crate) fn controller_with_funds(seller_funds: u64) -> TestController {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let ledger = InMemoryLedger::new();
    ledger.mint(&addr(SELLER), Amount::new(seller_funds));
    EscrowController::new(config(), ledger, MemoryEventLog::new()).unwrap()
}

pub(crate) fn controller() -> TestController {
    controller_with_funds(SELLER_FUNDS)
}
