use serde::{Deserialize, Serialize};

use crate::traits::{OrderReversal, OrderSettlement, PayoutResolution, TopupReversal, TopupSettlement};

/// Fired after a coin top-up credit has committed. Only fired for the winning settlement call,
/// never for replays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupSettledEvent {
    pub settlement: TopupSettlement,
}

impl TopupSettledEvent {
    pub fn new(settlement: TopupSettlement) -> Self {
        Self { settlement }
    }
}

/// Fired after a shop-order sale credit has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub settlement: OrderSettlement,
}

impl OrderSettledEvent {
    pub fn new(settlement: OrderSettlement) -> Self {
        Self { settlement }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentReversal {
    Topup(TopupReversal),
    Order(OrderReversal),
}

impl PaymentReversal {
    /// Whether this call actually clawed anything back, as opposed to replaying a reversal that
    /// had already been applied.
    pub fn reversed(&self) -> bool {
        match self {
            Self::Topup(r) => r.reversed,
            Self::Order(r) => r.reversed,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            Self::Topup(r) => &r.reference,
            Self::Order(r) => &r.reference,
        }
    }
}

/// Fired after a settled payment has been clawed back and the ledger mutation committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReversedEvent {
    pub reversal: PaymentReversal,
}

impl PaymentReversedEvent {
    pub fn topup(reversal: TopupReversal) -> Self {
        Self { reversal: PaymentReversal::Topup(reversal) }
    }

    pub fn order(reversal: OrderReversal) -> Self {
        Self { reversal: PaymentReversal::Order(reversal) }
    }
}

/// Fired when a pending payout resolves, either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutResolvedEvent {
    pub resolution: PayoutResolution,
}

impl PayoutResolvedEvent {
    pub fn new(resolution: PayoutResolution) -> Self {
        Self { resolution }
    }
}
