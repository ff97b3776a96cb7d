//! # Audit Events
//!
//! One [`EscrowEvent`] per committed operation, emitted exactly once and
//! only after the commit succeeds. Every event names the escrow, its trade,
//! the three parties, the caller, the record counter after the commit, and
//! the time of the call. Release events also carry the payout-destination
//! indicator (`"direct to buyer"` or `"sequential escrow"`).
//!
//! Serialized form is flat JSON with an `event` tag:
//!
//! ```json
//! {"escrow_id":1,"trade_id":100,"counter":3,"event":"released",
//!  "payout":"direct to buyer", ...}
//! ```

use serde::{Deserialize, Serialize};

use escrow_core::{Address, Amount, EscrowId, Timestamp, TradeId};
use escrow_state::linker::{DIRECT_TO_BUYER, SEQUENTIAL_ESCROW};
use escrow_state::{
    DisputeDecision, EscrowRecord, EscrowState, FundsMovement, OperationKind, PayoutRoute,
    RecordChange, Role, Transition,
};

/// Payout-destination indicator recorded on payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutIndicator {
    /// Paid to the buyer.
    #[serde(rename = "direct to buyer")]
    DirectToBuyer,
    /// Forwarded into the next leg.
    #[serde(rename = "sequential escrow")]
    SequentialEscrow,
}

impl PayoutIndicator {
    /// The indicator text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectToBuyer => DIRECT_TO_BUYER,
            Self::SequentialEscrow => SEQUENTIAL_ESCROW,
        }
    }
}

impl From<&PayoutRoute> for PayoutIndicator {
    fn from(route: &PayoutRoute) -> Self {
        if route.is_sequential() {
            Self::SequentialEscrow
        } else {
            Self::DirectToBuyer
        }
    }
}

impl std::fmt::Display for PayoutIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the funds of a dispute ruling went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Amount moved.
    pub amount: Amount,
    /// Receiving address.
    pub destination: Address,
    /// Set for payouts, absent for refunds.
    pub payout: Option<PayoutIndicator>,
}

impl Settlement {
    /// Describe funds leaving custody. Deposits have no settlement.
    pub fn from_outgoing(movement: &FundsMovement) -> Option<Self> {
        match movement {
            FundsMovement::Payout { route, amount } => Some(Self {
                amount: *amount,
                destination: route.destination().clone(),
                payout: Some(route.into()),
            }),
            FundsMovement::Refund { to, amount } => Some(Self {
                amount: *amount,
                destination: to.clone(),
                payout: None,
            }),
            FundsMovement::Deposit { .. } => None,
        }
    }
}

/// Operation-specific event fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventDetail {
    /// Record opened.
    Created {
        /// Escrowed amount.
        amount: Amount,
        /// Whether the payout forwards into another escrow.
        sequential: bool,
        /// Initial next-leg address.
        sequential_address: Option<Address>,
        /// Deposit deadline.
        deposit_deadline: Timestamp,
    },
    /// Deposit taken into custody.
    Funded {
        /// Deposited amount.
        amount: Amount,
        /// The depositor: the seller, or the custody account of the
        /// preceding leg whose payout funded this record.
        from: Address,
        /// Fiat deadline anchored at funding time.
        fiat_deadline: Timestamp,
    },
    /// Buyer confirmed fiat payment.
    FiatPaid,
    /// Next-leg address overwritten.
    SequentialAddressUpdated {
        /// Address before the write.
        previous: Option<Address>,
        /// Address after the write.
        address: Address,
    },
    /// Held funds paid out.
    Released {
        /// Paid amount.
        amount: Amount,
        /// Receiving address.
        destination: Address,
        /// Destination indicator.
        payout: PayoutIndicator,
    },
    /// Record cancelled.
    Cancelled {
        /// Amount refunded to the seller, if funds were held.
        refund: Option<Amount>,
        /// Whether this was an arbitrator auto-cancel.
        automatic: bool,
    },
    /// Dispute opened.
    DisputeOpened {
        /// The opening party's role.
        opened_by: Role,
    },
    /// Dispute decided.
    DisputeResolved {
        /// The ruling.
        decision: DisputeDecision,
        /// Where the held funds went.
        settlement: Option<Settlement>,
    },
}

impl EventDetail {
    /// The event tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Funded { .. } => "funded",
            Self::FiatPaid => "fiat_paid",
            Self::SequentialAddressUpdated { .. } => "sequential_address_updated",
            Self::Released { .. } => "released",
            Self::Cancelled { .. } => "cancelled",
            Self::DisputeOpened { .. } => "dispute_opened",
            Self::DisputeResolved { .. } => "dispute_resolved",
        }
    }
}

/// An audit record of one committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEvent {
    /// The escrow.
    pub escrow_id: EscrowId,
    /// Its trade.
    pub trade_id: TradeId,
    /// Depositing party.
    pub seller: Address,
    /// Receiving party.
    pub buyer: Address,
    /// Dispute resolver.
    pub arbitrator: Address,
    /// Who made the call.
    pub caller: Address,
    /// Record counter after the commit.
    pub counter: u64,
    /// Record state after the commit.
    pub state: EscrowState,
    /// Time of the call.
    pub at: Timestamp,
    /// Operation-specific fields.
    #[serde(flatten)]
    pub detail: EventDetail,
}

impl EscrowEvent {
    /// The event for a freshly created record.
    pub fn created(record: &EscrowRecord) -> Self {
        Self::with_parties(
            record,
            record.seller().clone(),
            record.counter(),
            record.state(),
            record.created_at(),
            EventDetail::Created {
                amount: record.amount(),
                sequential: record.is_sequential(),
                sequential_address: record.sequential_target().address().cloned(),
                deposit_deadline: record.deposit_deadline(),
            },
        )
    }

    /// The event for `transition` applied to `record`.
    pub fn from_transition(transition: &Transition, record: &EscrowRecord) -> Self {
        let detail = match (&transition.change, transition.movement.as_ref()) {
            (RecordChange::Funded { fiat_deadline }, movement) => {
                let (from, amount) = match movement {
                    Some(FundsMovement::Deposit { from, amount }) => (from.clone(), *amount),
                    _ => (record.seller().clone(), record.amount()),
                };
                EventDetail::Funded {
                    amount,
                    from,
                    fiat_deadline: *fiat_deadline,
                }
            }
            (RecordChange::FiatPaid, _) => EventDetail::FiatPaid,
            (RecordChange::SequentialTarget { previous, next }, _) => {
                EventDetail::SequentialAddressUpdated {
                    previous: previous.address().cloned(),
                    address: next.clone(),
                }
            }
            (RecordChange::DisputeOpened, _) => EventDetail::DisputeOpened {
                opened_by: transition.role,
            },
            (RecordChange::DisputeResolved { decision }, movement) => {
                EventDetail::DisputeResolved {
                    decision: *decision,
                    settlement: movement.and_then(Settlement::from_outgoing),
                }
            }
            (RecordChange::Closed, Some(FundsMovement::Payout { route, amount })) => {
                EventDetail::Released {
                    amount: *amount,
                    destination: route.destination().clone(),
                    payout: route.into(),
                }
            }
            (RecordChange::Closed, movement) => EventDetail::Cancelled {
                refund: movement.map(FundsMovement::amount),
                automatic: transition.operation == OperationKind::AutoCancel,
            },
        };
        Self::with_parties(
            record,
            transition.caller.clone(),
            transition.counter_after(),
            transition.to,
            transition.at,
            detail,
        )
    }

    fn with_parties(
        record: &EscrowRecord,
        caller: Address,
        counter: u64,
        state: EscrowState,
        at: Timestamp,
        detail: EventDetail,
    ) -> Self {
        Self {
            escrow_id: record.escrow_id(),
            trade_id: record.trade_id(),
            seller: record.seller().clone(),
            buyer: record.buyer().clone(),
            arbitrator: record.arbitrator().clone(),
            caller,
            counter,
            state,
            at,
            detail,
        }
    }

    /// The event tag.
    pub fn name(&self) -> &'static str {
        self.detail.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use escrow_state::{validate, DeadlinePolicy, Operation, OperationRequest};

    fn plan(record: &EscrowRecord, caller: &str, operation: Operation, at: i64) -> Transition {
        let request = OperationRequest::new(addr(caller), operation, ts(at));
        validate(record, &request, &DeadlinePolicy::default()).unwrap()
    }

    #[test]
    fn created_event_carries_parties_and_counter_zero() {
        let record = created(1);
        let event = EscrowEvent::created(&record);
        assert_eq!(event.name(), "created");
        assert_eq!(event.counter, 0);
        assert_eq!(event.caller, addr(SELLER));
        assert_eq!(event.arbitrator, addr(ARBITRATOR));
        assert_eq!(event.state, EscrowState::Created);
    }

    #[test]
    fn release_event_carries_indicator() {
        let mut record = created(1);
        let fund = plan(&record, SELLER, Operation::Fund { amount: Amount::new(50) }, T0 + 60);
        record.apply(&fund).unwrap();
        let paid = plan(&record, BUYER, Operation::MarkFiatPaid, T0 + 120);
        record.apply(&paid).unwrap();
        let release = plan(&record, SELLER, Operation::Release, T0 + 180);
        let event = EscrowEvent::from_transition(&release, &record);
        assert_eq!(event.counter, 3);
        assert_eq!(event.state, EscrowState::Released);
        match &event.detail {
            EventDetail::Released {
                amount,
                destination,
                payout,
            } => {
                assert_eq!(*amount, Amount::new(50));
                assert_eq!(destination, &addr(BUYER));
                assert_eq!(payout.as_str(), "direct to buyer");
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn cancel_of_unfunded_record_has_no_refund() {
        let record = created(1);
        let cancel = plan(&record, SELLER, Operation::Cancel, T0 + 10);
        let event = EscrowEvent::from_transition(&cancel, &record);
        assert_eq!(
            event.detail,
            EventDetail::Cancelled {
                refund: None,
                automatic: false
            }
        );
    }

    #[test]
    fn auto_cancel_is_flagged() {
        let record = created(1);
        let cancel = plan(&record, ARBITRATOR, Operation::AutoCancel, T0 + 901);
        let event = EscrowEvent::from_transition(&cancel, &record);
        assert!(matches!(
            event.detail,
            EventDetail::Cancelled { automatic: true, .. }
        ));
        assert_eq!(event.caller, addr(ARBITRATOR));
    }

    #[test]
    fn serialized_form_is_flat_and_tagged() {
        let event = EscrowEvent::created(&created(1));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "created");
        assert_eq!(json["counter"], 0);
        assert!(json.get("detail").is_none());
        let back: EscrowEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn indicator_serializes_as_text() {
        let json = serde_json::to_string(&PayoutIndicator::SequentialEscrow).unwrap();
        assert_eq!(json, "\"sequential escrow\"");
    }

    #[test]
    fn settlement_describes_outgoing_funds_only() {
        let deposit = FundsMovement::Deposit {
            from: addr(SELLER),
            amount: Amount::new(50),
        };
        assert_eq!(Settlement::from_outgoing(&deposit), None);

        let refund = FundsMovement::Refund {
            to: addr(SELLER),
            amount: Amount::new(50),
        };
        let settlement = Settlement::from_outgoing(&refund).unwrap();
        assert_eq!(settlement.destination, addr(SELLER));
        assert_eq!(settlement.payout, None);

        let payout = FundsMovement::Payout {
            route: PayoutRoute::SequentialEscrow(addr("escrow:2")),
            amount: Amount::new(50),
        };
        let settlement = Settlement::from_outgoing(&payout).unwrap();
        assert_eq!(settlement.destination, addr("escrow:2"));
        assert_eq!(settlement.payout, Some(PayoutIndicator::SequentialEscrow));
    }

    #[test]
    fn funded_event_names_depositor() {
        let record = created(1);
        let fund = plan(&record, SELLER, Operation::Fund { amount: Amount::new(50) }, T0 + 60);
        let event = EscrowEvent::from_transition(&fund, &record);
        assert!(matches!(
            &event.detail,
            EventDetail::Funded { from, amount, .. } if *from == addr(SELLER) && *amount == Amount::new(50)
        ));
    }
}
