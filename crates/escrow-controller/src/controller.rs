//! # Lifecycle Controller
//!
//! Public entry points of the escrow lifecycle. For each call the
//! controller locks the target record, asks the validator for a plan, and
//! commits the plan's effects atomically:
//!
//! ```text
//! lock record
//!   validate                     -> Err: reject, nothing changes
//!   record.advanced(plan)        -> Err: reject (E105), nothing changes
//!   ledger.prepare(movement)     -> Err: reject, nothing changes
//!   sink.stage(event)            -> Err: discard staged, ledger.abort, reject
//!   ledger.commit
//!   sink.publish
//!   write record (counter += 1)
//! unlock
//! ```
//!
//! A payout into another escrow's custody locks both records in id order
//! and funds the receiving record in the same commit: one ledger transfer,
//! two events, two record writes.
//!
//! Calls on the same record are serialized by its lock; a second call sees
//! the first call's committed record. Calls on different records never
//! contend beyond the brief map lookup, except for a forwarding payout.

use escrow_core::{Address, Amount, ConfigError, EscrowConfig, EscrowId, Timestamp};
use escrow_state::{
    check_create, link_target, validate, validate_forward, verify_chain, CreateEscrow,
    DeadlinePolicy, DisputeDecision, EscrowError, EscrowRecord, FundsMovement, Operation,
    OperationRequest, PayoutRoute, Transition,
};

use crate::error::ControllerError;
use crate::event::EscrowEvent;
use crate::ledger::{Ledger, LedgerTransfer};
use crate::sink::{EventSink, MemoryEventLog};
use crate::store::{RecordHandle, RecordStore};

/// A committed call: the record after the commit and the emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Record snapshot after the commit.
    pub record: EscrowRecord,
    /// The audit event emitted for the commit.
    pub event: EscrowEvent,
}

/// Owns the record store and drives every lifecycle operation.
#[derive(Debug)]
pub struct EscrowController<L, S> {
    config: EscrowConfig,
    policy: DeadlinePolicy,
    store: RecordStore,
    ledger: L,
    sink: S,
}

impl<L: Ledger, S: EventSink> EscrowController<L, S> {
    /// Build a controller over `ledger` and `sink`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if `config` fails validation.
    pub fn new(config: EscrowConfig, ledger: L, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = DeadlinePolicy::from_config(&config);
        tracing::info!(
            arbitrator = %config.arbitrator,
            max_amount = %config.max_amount(),
            deposit_window_secs = config.deposit_window_secs,
            fiat_window_secs = config.fiat_window_secs,
            "escrow controller ready"
        );
        Ok(Self {
            config,
            policy,
            store: RecordStore::new(),
            ledger,
            sink,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// The ledger collaborator.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The event sink collaborator.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Open a new escrow in `CREATED`. The caller must be the seller.
    ///
    /// Identifiers are allocated only for calls that pass [`check_create`].
    /// A destination naming the freshly allocated id is rejected after
    /// allocation, and that id is not reused.
    pub fn create(
        &self,
        caller: &Address,
        request: &CreateEscrow,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        let created = check_create(request, caller, &self.config).and_then(|()| {
            let escrow_id = self.store.allocate_id();
            EscrowRecord::create(escrow_id, request, caller, now, &self.config)
        });
        let record = match created {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    caller = %caller,
                    trade_id = %request.trade_id,
                    code = e.code().as_str(),
                    error = %e,
                    "escrow create rejected"
                );
                return Err(e.into());
            }
        };
        let escrow_id = record.escrow_id();
        let event = EscrowEvent::created(&record);
        let mut inserted = false;
        self.settle(None, std::slice::from_ref(&event), || {
            inserted = self.store.insert(record.clone());
        })?;
        debug_assert!(inserted, "fresh escrow id collided");
        tracing::info!(
            %escrow_id,
            trade_id = %record.trade_id(),
            amount = %record.amount(),
            sequential = record.is_sequential(),
            "escrow created"
        );
        Ok(Receipt { record, event })
    }

    /// Seller deposits exactly the escrowed amount.
    pub fn fund(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.call(escrow_id, caller, Operation::Fund { amount }, now)
    }

    /// Buyer confirms fiat payment.
    pub fn mark_fiat_paid(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.call(escrow_id, caller, Operation::MarkFiatPaid, now)
    }

    /// Buyer names the next leg's escrow address. Last write wins.
    pub fn update_sequential_address(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        address: Address,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.call(
            escrow_id,
            caller,
            Operation::UpdateSequentialAddress { address },
            now,
        )
    }

    /// Seller or arbitrator pays out held funds.
    pub fn release(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.call(escrow_id, caller, Operation::Release, now)
    }

    /// Seller or arbitrator cancels, refunding any held funds.
    pub fn cancel(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.call(escrow_id, caller, Operation::Cancel, now)
    }

    /// Buyer or seller opens a dispute.
    pub fn open_dispute(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.call(escrow_id, caller, Operation::OpenDispute, now)
    }

    /// Arbitrator decides a dispute: `true` pays out, `false` refunds.
    pub fn resolve_dispute(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        decision: bool,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        let decision = DisputeDecision::from_bool(decision);
        self.call(escrow_id, caller, Operation::ResolveDispute { decision }, now)
    }

    /// Arbitrator cancels after a lapsed deadline.
    pub fn auto_cancel(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.call(escrow_id, caller, Operation::AutoCancel, now)
    }

    /// Point leg 1's payout at leg 2's escrow address.
    ///
    /// The caller must be leg 1's buyer.
    pub fn link_legs(
        &self,
        leg1: EscrowId,
        leg2: EscrowId,
        caller: &Address,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        let target = link_target(&self.require(leg2)?);
        self.update_sequential_address(leg1, caller, target, now)
    }

    /// Run any operation. Set `request.expected_counter` to reject replays
    /// and stale submissions with E105.
    ///
    /// A payout that forwards into another escrow's custody also funds that
    /// escrow; both records commit together or neither does.
    pub fn execute(
        &self,
        escrow_id: EscrowId,
        request: OperationRequest,
    ) -> Result<Receipt, ControllerError> {
        let handle = self
            .store
            .handle(escrow_id)
            .ok_or(ControllerError::UnknownEscrow(escrow_id))?;
        let span = tracing::debug_span!("escrow_call", %escrow_id, operation = %request.operation.kind());
        let _entered = span.enter();

        loop {
            let mut record = handle.lock();
            let transition = match validate(&record, &request, &self.policy) {
                Ok(t) => t,
                Err(e) => return Err(self.rejected(&record, &request, e)),
            };
            let Some(target) = forward_target(&transition) else {
                return self.commit(&mut record, &transition);
            };
            if target == escrow_id {
                let err = validate_forward(&record, &transition, &self.policy)
                    .err()
                    .unwrap_or_else(|| unknown_target(&record, &transition));
                return Err(self.rejected(&record, &request, err));
            }
            drop(record);
            if let Some(receipt) = self.execute_forward(escrow_id, &handle, &request, target)? {
                return Ok(receipt);
            }
            tracing::debug!(%escrow_id, %target, "forwarding target changed; revalidating");
        }
    }

    /// Lock both legs in id order, revalidate, and commit the payout with
    /// the funding it forwards into `target`. `None` if the payout no longer
    /// forwards into `target` once both locks are held.
    fn execute_forward(
        &self,
        escrow_id: EscrowId,
        handle: &RecordHandle,
        request: &OperationRequest,
        target: EscrowId,
    ) -> Result<Option<Receipt>, ControllerError> {
        let Some(target_handle) = self.store.handle(target) else {
            let record = handle.lock();
            let err = match validate(&record, request, &self.policy) {
                Ok(t) if forward_target(&t) == Some(target) => unknown_target(&record, &t),
                Ok(_) => return Ok(None),
                Err(e) => e,
            };
            return Err(self.rejected(&record, request, err));
        };
        let (mut record, mut leg2) = if escrow_id < target {
            let record = handle.lock();
            (record, target_handle.lock())
        } else {
            let leg2 = target_handle.lock();
            (handle.lock(), leg2)
        };

        let transition = match validate(&record, request, &self.policy) {
            Ok(t) => t,
            Err(e) => return Err(self.rejected(&record, request, e)),
        };
        if forward_target(&transition) != Some(target) {
            return Ok(None);
        }
        let funding = match validate_forward(&leg2, &transition, &self.policy) {
            Ok(t) => t,
            Err(e) => return Err(self.rejected(&record, request, e)),
        };
        let next = record.advanced(&transition).map_err(|e| self.refused(e))?;
        let next_leg2 = leg2.advanced(&funding).map_err(|e| self.refused(e))?;

        let events = [
            EscrowEvent::from_transition(&transition, &next),
            EscrowEvent::from_transition(&funding, &next_leg2),
        ];
        self.settle(transfer_for(&transition, &next), &events, || {
            *record = next;
            *leg2 = next_leg2;
        })?;
        committed(&transition);
        committed(&funding);
        let [event, _] = events;
        Ok(Some(Receipt {
            record: record.clone(),
            event,
        }))
    }

    fn commit(
        &self,
        record: &mut EscrowRecord,
        transition: &Transition,
    ) -> Result<Receipt, ControllerError> {
        let next = record.advanced(transition).map_err(|e| self.refused(e))?;
        let event = EscrowEvent::from_transition(transition, &next);
        self.settle(
            transfer_for(transition, &next),
            std::slice::from_ref(&event),
            || *record = next,
        )?;
        committed(transition);
        Ok(Receipt {
            record: record.clone(),
            event,
        })
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Snapshot of one record.
    pub fn get(&self, escrow_id: EscrowId) -> Option<EscrowRecord> {
        self.store.get(escrow_id)
    }

    /// Snapshots of all records, ordered by id.
    pub fn list(&self) -> Vec<EscrowRecord> {
        self.store.list()
    }

    /// Whether the record's deposit deadline has passed at `now`.
    pub fn deposit_expired(
        &self,
        escrow_id: EscrowId,
        now: Timestamp,
    ) -> Result<bool, ControllerError> {
        Ok(escrow_state::deposit_expired(&self.require(escrow_id)?, now))
    }

    /// Whether the record's fiat deadline has passed at `now`.
    pub fn fiat_expired(
        &self,
        escrow_id: EscrowId,
        now: Timestamp,
    ) -> Result<bool, ControllerError> {
        Ok(escrow_state::fiat_expired(&self.require(escrow_id)?, now))
    }

    /// Check that `leg1` forwards into `leg2`.
    pub fn verify_chain(&self, leg1: EscrowId, leg2: EscrowId) -> Result<(), ControllerError> {
        verify_chain(&self.require(leg1)?, &self.require(leg2)?)?;
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn call(
        &self,
        escrow_id: EscrowId,
        caller: &Address,
        operation: Operation,
        now: Timestamp,
    ) -> Result<Receipt, ControllerError> {
        self.execute(escrow_id, OperationRequest::new(caller.clone(), operation, now))
    }

    fn require(&self, escrow_id: EscrowId) -> Result<EscrowRecord, ControllerError> {
        self.store
            .get(escrow_id)
            .ok_or(ControllerError::UnknownEscrow(escrow_id))
    }

    fn rejected(
        &self,
        record: &EscrowRecord,
        request: &OperationRequest,
        error: EscrowError,
    ) -> ControllerError {
        tracing::warn!(
            escrow_id = %record.escrow_id(),
            operation = %request.operation.kind(),
            caller = %request.caller,
            state = %record.state(),
            code = error.code().as_str(),
            error = %error,
            "escrow operation rejected"
        );
        error.into()
    }

    fn refused(&self, error: EscrowError) -> ControllerError {
        tracing::error!(
            code = error.code().as_str(),
            error = %error,
            "validated transition refused at commit"
        );
        error.into()
    }

    /// Move funds, emit the events, and write the records, or do none of it.
    fn settle(
        &self,
        transfer: Option<LedgerTransfer>,
        events: &[EscrowEvent],
        write_records: impl FnOnce(),
    ) -> Result<(), ControllerError> {
        let prepared = match transfer.map(|t| self.ledger.prepare(t)).transpose() {
            Ok(p) => p,
            Err(e) => {
                if let Some(event) = events.first() {
                    tracing::error!(escrow_id = %event.escrow_id, error = %e, "ledger prepare failed");
                }
                return Err(e.into());
            }
        };
        let mut staged = Vec::with_capacity(events.len());
        for event in events {
            match self.sink.stage(event.clone()) {
                Ok(s) => staged.push(s),
                Err(e) => {
                    for s in staged {
                        self.sink.discard(s);
                    }
                    if let Some(p) = prepared {
                        self.ledger.abort(p);
                    }
                    tracing::error!(
                        escrow_id = %event.escrow_id,
                        error = %e,
                        "event staging failed; ledger transfer aborted"
                    );
                    return Err(e.into());
                }
            }
        }
        if let Some(p) = prepared {
            self.ledger.commit(p);
        }
        for s in staged {
            tracing::debug!(
                escrow_id = %s.event().escrow_id,
                event = s.event().name(),
                counter = s.event().counter,
                "event published"
            );
            self.sink.publish(s);
        }
        write_records();
        Ok(())
    }
}

/// The escrow a payout forwards into, if its destination is an escrow
/// custody account.
fn forward_target(transition: &Transition) -> Option<EscrowId> {
    match &transition.movement {
        Some(FundsMovement::Payout {
            route: PayoutRoute::SequentialEscrow(to),
            ..
        }) => to.escrow_id(),
        _ => None,
    }
}

fn unknown_target(record: &EscrowRecord, transition: &Transition) -> EscrowError {
    EscrowError::InvalidTransition {
        escrow_id: record.escrow_id().to_string(),
        operation: transition.operation.as_str(),
        state: record.state(),
        reason: "payout forwards into an escrow that does not exist".to_string(),
    }
}

fn transfer_for(transition: &Transition, next: &EscrowRecord) -> Option<LedgerTransfer> {
    transition.movement.clone().map(|movement| LedgerTransfer {
        escrow_id: next.escrow_id(),
        custody: next.address(),
        movement,
    })
}

fn committed(transition: &Transition) {
    tracing::info!(
        escrow_id = %transition.escrow_id,
        operation = %transition.operation,
        caller = %transition.caller,
        from = %transition.from,
        to = %transition.to,
        counter = transition.counter_after(),
        "escrow transition committed"
    );
}

impl<L: Ledger> EscrowController<L, MemoryEventLog> {
    /// Published events of one escrow, in order.
    pub fn events_for(&self, escrow_id: EscrowId) -> Vec<EscrowEvent> {
        self.sink.events_for(escrow_id)
    }
}
