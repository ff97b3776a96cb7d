#![deny(missing_docs)]

//! # escrow-controller — Escrow Lifecycle Controller
//!
//! Drives the escrow state machine against the outside world.
//!
//! - **Controller** ([`controller`]): the public operations. Serializes calls
//!   per record and commits each accepted call all-or-nothing.
//! - **Ledger** ([`ledger`]): the two-phase custody ledger seam and an
//!   in-memory reference ledger.
//! - **Events** ([`event`], [`sink`]): one audit event per committed call,
//!   emitted through a two-phase sink (in-memory log or JSON lines).
//! - **Store** ([`store`]): per-record locked storage.
//!
//! ## Usage
//!
//! ```
//! use escrow_controller::{EscrowController, InMemoryLedger, MemoryEventLog};
//! use escrow_core::{Address, Amount, EscrowConfig, Timestamp, TradeId};
//! use escrow_state::CreateEscrow;
//!
//! let seller = Address::new("0x5e11e4").unwrap();
//! let buyer = Address::new("0xb0b").unwrap();
//! let config = EscrowConfig::new(Address::new("0xa4b1").unwrap());
//!
//! let ledger = InMemoryLedger::new();
//! ledger.mint(&seller, Amount::new(50));
//! let controller = EscrowController::new(config, ledger, MemoryEventLog::new()).unwrap();
//!
//! let now = Timestamp::now();
//! let request = CreateEscrow {
//!     seller: seller.clone(),
//!     buyer: buyer.clone(),
//!     amount: Amount::new(50),
//!     trade_id: TradeId::leg(1, 1).unwrap(),
//!     sequential: false,
//!     sequential_address: None,
//! };
//! let id = controller.create(&seller, &request, now).unwrap().record.escrow_id();
//! controller.fund(id, &seller, Amount::new(50), now).unwrap();
//! controller.mark_fiat_paid(id, &buyer, now).unwrap();
//! let receipt = controller.release(id, &seller, now).unwrap();
//! assert_eq!(receipt.record.counter(), 3);
//! ```

pub mod controller;
pub mod error;
pub mod event;
pub mod ledger;
pub mod sink;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{EscrowController, Receipt};
pub use error::{ControllerError, EventSinkError, LedgerError};
pub use event::{EscrowEvent, EventDetail, PayoutIndicator, Settlement};
pub use ledger::{InMemoryLedger, Ledger, LedgerTransfer, PreparedTransfer};
pub use sink::{EventSink, JsonLinesSink, MemoryEventLog, StagedEvent};
pub use store::{RecordHandle, RecordStore};
