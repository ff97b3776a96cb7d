//! Shared fixtures for unit tests.

use escrow_core::{Address, Amount, EscrowConfig, EscrowId, Timestamp, TradeId};

use crate::deadline::DeadlinePolicy;
use crate::error::EscrowError;
use crate::record::EscrowRecord;
use crate::transition::Transition;
use crate::validator::{validate, CreateEscrow, Operation, OperationRequest};

pub(crate) const SELLER: &str = "0x5e11e4";
pub(crate) const BUYER: &str = "0xb0b";
pub(crate) const ARBITRATOR: &str = "0xa4b1";
/// 2026-01-15T12:00:00Z
pub(crate) const T0: i64 = 1_768_478_400;

pub(crate) fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

pub(crate) fn ts(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(secs).unwrap()
}

pub(crate) fn config() -> EscrowConfig {
    EscrowConfig::new(addr(ARBITRATOR))
}

pub(crate) fn decide(
    record: &EscrowRecord,
    caller: &str,
    operation: Operation,
    at: i64,
) -> Result<Transition, EscrowError> {
    let request = OperationRequest::new(addr(caller), operation, ts(at));
    validate(record, &request, &DeadlinePolicy::default())
}

pub(crate) fn step(record: &mut EscrowRecord, caller: &str, operation: Operation, at: i64) {
    let t = decide(record, caller, operation, at).unwrap();
    record.apply(&t).unwrap();
}

pub(crate) fn create_request(
    amount: u64,
    trade_id: TradeId,
    sequential: bool,
    sequential_address: Option<Address>,
) -> CreateEscrow {
    CreateEscrow {
        seller: addr(SELLER),
        buyer: addr(BUYER),
        amount: Amount::new(amount),
        trade_id,
        sequential,
        sequential_address,
    }
}

pub(crate) fn created_with_trade(
    id: u64,
    trade_id: TradeId,
    sequential: bool,
    sequential_address: Option<Address>,
) -> EscrowRecord {
    let request = create_request(50, trade_id, sequential, sequential_address);
    EscrowRecord::create(EscrowId::new(id), &request, &addr(SELLER), ts(T0), &config()).unwrap()
}

pub(crate) fn created_record(id: u64, amount: u64) -> EscrowRecord {
    let request = create_request(amount, TradeId::leg(id, 1).unwrap(), false, None);
    EscrowRecord::create(EscrowId::new(id), &request, &addr(SELLER), ts(T0), &config()).unwrap()
}

/// A sequential record. `sequential_address: None` yields a record with an
/// unset destination, which `create` itself would reject.
pub(crate) fn created_sequential(
    id: u64,
    amount: u64,
    sequential_address: Option<Address>,
) -> EscrowRecord {
    let trade_id = TradeId::leg(id, 1).unwrap();
    match sequential_address {
        Some(a) => {
            let request = create_request(amount, trade_id, true, Some(a));
            EscrowRecord::create(EscrowId::new(id), &request, &addr(SELLER), ts(T0), &config())
                .unwrap()
        }
        None => {
            let record = created_sequential(id, amount, Some(addr("escrow:placeholder")));
            let mut json = serde_json::to_value(&record).unwrap();
            json["sequential_target"] = serde_json::json!("Unset");
            serde_json::from_value(json).unwrap()
        }
    }
}

pub(crate) fn funded_record(id: u64, amount: u64) -> EscrowRecord {
    let mut record = created_record(id, amount);
    step(&mut record, SELLER, Operation::Fund { amount: Amount::new(amount) }, T0 + 60);
    record
}

pub(crate) fn fiat_paid_record(id: u64, amount: u64) -> EscrowRecord {
    let mut record = funded_record(id, amount);
    step(&mut record, BUYER, Operation::MarkFiatPaid, T0 + 120);
    record
}

pub(crate) fn disputed_record(id: u64, amount: u64) -> EscrowRecord {
    let mut record = fiat_paid_record(id, amount);
    step(&mut record, BUYER, Operation::OpenDispute, T0 + 180);
    record
}
