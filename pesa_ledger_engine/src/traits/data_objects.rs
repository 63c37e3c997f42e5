use plg_common::{Coins, Tzs};
use serde::{Deserialize, Serialize};

use crate::db_types::{IntentKind, Order, PaymentIntent, WithdrawalStatus};

/// Everything settlement needs to know about a payment. Usually built from the stored intent;
/// when the local row is missing, it is reconstructed from the webhook payload, since the
/// gateway's view is authoritative over a lost local row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementContext {
    pub reference: String,
    pub user_id: String,
    pub amount: Tzs,
    pub kind: IntentKind,
    pub order_id: Option<String>,
    /// Fallback settlement wallet, used only when no local order row exists.
    pub shop_id: Option<String>,
}

impl From<&PaymentIntent> for SettlementContext {
    fn from(intent: &PaymentIntent) -> Self {
        Self {
            reference: intent.reference.clone(),
            user_id: intent.user_id.clone(),
            amount: intent.amount,
            kind: intent.kind,
            order_id: intent.order_id.clone(),
            shop_id: None,
        }
    }
}

/// Result of settling a completed coin top-up. `credited` is false when the deposit row already
/// existed and the call was a no-op replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupSettlement {
    pub credited: bool,
    pub reference: String,
    pub user_id: String,
    pub coins: Coins,
    /// Wallet balance after the credit (or the current balance, on a replay).
    pub balance: Coins,
}

/// Result of settling a completed shop-order payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettlement {
    pub credited: bool,
    pub reference: String,
    pub shop_id: String,
    pub amount: Tzs,
    pub balance: Tzs,
    /// The order as it stands after settlement. `None` when the local order row was missing and
    /// settlement fell back to the payment amount.
    pub order: Option<Order>,
}

/// Result of reversing a previously settled coin top-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupReversal {
    pub reversed: bool,
    pub reference: String,
    pub user_id: String,
    pub coins: Coins,
    pub balance: Coins,
}

/// Result of reversing a previously settled shop-order payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReversal {
    pub reversed: bool,
    pub reference: String,
    pub shop_id: String,
    pub amount: Tzs,
    pub balance: Tzs,
    pub order: Option<Order>,
}

/// Whether a payout reference belongs to a user coin withdrawal or a shop settlement withdrawal.
/// Both share one reference namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutKind {
    User,
    Shop,
}

/// Result of resolving a pending payout. `restored` is true when a failed payout put the debited
/// amount back on the source wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutResolution {
    pub kind: PayoutKind,
    pub reference: String,
    pub owner_id: String,
    pub status: WithdrawalStatus,
    pub net_amount: Tzs,
    pub restored: bool,
}

/// Result of an atomic coin gift between two wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftTransfer {
    pub reference: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub coins: Coins,
    pub sender_balance: Coins,
    pub recipient_balance: Coins,
}
