//! # Custody Ledger
//!
//! The external asset ledger the controller moves funds through. The
//! controller never touches balances itself: every committed transition
//! with a [`FundsMovement`] becomes one [`LedgerTransfer`].
//!
//! ## Two-phase contract
//!
//! ```text
//! prepare(transfer) --Ok(ticket)--> commit(ticket)   funds moved
//!                               \-> abort(ticket)    nothing moved
//! prepare(transfer) --Err------->                    nothing moved
//! ```
//!
//! `prepare` does every check that can fail (balance, availability) and
//! reserves the debit. `commit` and `abort` are infallible. This is what
//! lets the controller keep a transition all-or-nothing across the ledger,
//! the event sink, and the record.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use escrow_core::{Address, Amount, EscrowId};
use escrow_state::FundsMovement;

use crate::error::LedgerError;

/// One movement of the custody asset, bound to the escrow it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransfer {
    /// The escrow the movement belongs to.
    pub escrow_id: EscrowId,
    /// The escrow's custody account.
    pub custody: Address,
    /// What moves where.
    pub movement: FundsMovement,
}

impl LedgerTransfer {
    /// The debited account.
    pub fn source(&self) -> &Address {
        match &self.movement {
            FundsMovement::Deposit { from, .. } => from,
            FundsMovement::Payout { .. } | FundsMovement::Refund { .. } => &self.custody,
        }
    }

    /// The credited account.
    pub fn target(&self) -> &Address {
        self.movement.destination().unwrap_or(&self.custody)
    }

    /// The amount moved.
    pub fn amount(&self) -> Amount {
        self.movement.amount()
    }
}

/// A prepared, not yet committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransfer {
    id: Uuid,
    transfer: LedgerTransfer,
}

impl PreparedTransfer {
    /// Issue a ticket for `transfer`.
    pub fn new(transfer: LedgerTransfer) -> Self {
        Self {
            id: Uuid::new_v4(),
            transfer,
        }
    }

    /// The ticket id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The prepared transfer.
    pub fn transfer(&self) -> &LedgerTransfer {
        &self.transfer
    }
}

/// An asset ledger with two-phase transfers.
pub trait Ledger: Send + Sync {
    /// Check and reserve a transfer.
    ///
    /// # Errors
    ///
    /// Any reason the transfer cannot be guaranteed to commit.
    fn prepare(&self, transfer: LedgerTransfer) -> Result<PreparedTransfer, LedgerError>;

    /// Execute a prepared transfer.
    fn commit(&self, prepared: PreparedTransfer);

    /// Release a prepared transfer without moving funds.
    fn abort(&self, prepared: PreparedTransfer);
}

// ── In-memory ledger ────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<Address, Amount>,
    pending: HashMap<Uuid, LedgerTransfer>,
    journal: Vec<LedgerTransfer>,
    fail_next: Option<String>,
}

impl Book {
    fn balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    fn credit(&mut self, account: &Address, amount: Amount) {
        let entry = self.balances.entry(account.clone()).or_insert(Amount::ZERO);
        *entry = Amount::new(entry.value().saturating_add(amount.value()));
    }
}

/// Reference ledger keeping balances in memory.
///
/// Prepare debits the source into a reservation; commit credits the
/// target; abort returns the reservation to the source.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    book: Mutex<Book>,
}

impl InMemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `account` from outside the escrow system.
    pub fn mint(&self, account: &Address, amount: Amount) {
        self.book.lock().credit(account, amount);
    }

    /// Current balance of `account`, excluding reservations.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.book.lock().balance(account)
    }

    /// Committed transfers in commit order.
    pub fn journal(&self) -> Vec<LedgerTransfer> {
        self.book.lock().journal.clone()
    }

    /// Number of prepared but unsettled transfers.
    pub fn pending_count(&self) -> usize {
        self.book.lock().pending.len()
    }

    /// Make the next `prepare` fail with [`LedgerError::Unavailable`].
    pub fn fail_next_prepare(&self, reason: impl Into<String>) {
        self.book.lock().fail_next = Some(reason.into());
    }
}

impl Ledger for InMemoryLedger {
    fn prepare(&self, transfer: LedgerTransfer) -> Result<PreparedTransfer, LedgerError> {
        let mut book = self.book.lock();
        if let Some(reason) = book.fail_next.take() {
            return Err(LedgerError::Unavailable(reason));
        }
        let required = transfer.amount();
        let available = book.balance(transfer.source());
        let remaining = available.value().checked_sub(required.value()).ok_or_else(|| {
            LedgerError::InsufficientFunds {
                account: transfer.source().clone(),
                required,
                available,
            }
        })?;
        book.balances
            .insert(transfer.source().clone(), Amount::new(remaining));
        let prepared = PreparedTransfer::new(transfer);
        book.pending.insert(prepared.id, prepared.transfer.clone());
        debug!(ticket = %prepared.id, escrow_id = %prepared.transfer.escrow_id, "ledger transfer prepared");
        Ok(prepared)
    }

    fn commit(&self, prepared: PreparedTransfer) {
        let mut book = self.book.lock();
        match book.pending.remove(&prepared.id) {
            Some(transfer) => {
                book.credit(transfer.target(), transfer.amount());
                book.journal.push(transfer);
            }
            None => warn!(ticket = %prepared.id, "commit of unknown ledger ticket ignored"),
        }
    }

    fn abort(&self, prepared: PreparedTransfer) {
        let mut book = self.book.lock();
        match book.pending.remove(&prepared.id) {
            Some(transfer) => book.credit(transfer.source(), transfer.amount()),
            None => warn!(ticket = %prepared.id, "abort of unknown ledger ticket ignored"),
        }
    }
}
