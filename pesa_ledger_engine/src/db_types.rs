use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use plg_common::{Coins, Tzs, TZS_CURRENCY_CODE};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

//--------------------------------------    IntentStatus     ---------------------------------------------------------
/// Local view of a payment or payout intent's lifecycle. Statuses only advance; the single
/// exception is `Completed` -> `Reversed`, which is how the gateway reports a clawed-back payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
    Reversed,
}

impl IntentStatus {
    /// Whether a status update from the gateway is allowed to land. Anything else is a stale or
    /// duplicate signal and must be ignored.
    pub fn can_transition_to(&self, new: IntentStatus) -> bool {
        use IntentStatus::*;
        match (self, new) {
            (Pending, Processing | Completed | Failed | Expired) => true,
            (Processing, Completed | Failed | Expired) => true,
            (Completed, Reversed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Failed | IntentStatus::Expired | IntentStatus::Reversed)
    }
}

impl Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentStatus::Pending => write!(f, "Pending"),
            IntentStatus::Processing => write!(f, "Processing"),
            IntentStatus::Completed => write!(f, "Completed"),
            IntentStatus::Failed => write!(f, "Failed"),
            IntentStatus::Expired => write!(f, "Expired"),
            IntentStatus::Reversed => write!(f, "Reversed"),
        }
    }
}

impl FromStr for IntentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Expired" => Ok(Self::Expired),
            "Reversed" => Ok(Self::Reversed),
            s => Err(ConversionError(format!("Invalid intent status: {s}"))),
        }
    }
}

impl From<String> for IntentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid intent status in DB: {value}. But this conversion cannot fail. Defaulting to Pending");
            IntentStatus::Pending
        })
    }
}

//--------------------------------------    IntentChannel    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentChannel {
    Mobile,
    Card,
}

impl Display for IntentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentChannel::Mobile => write!(f, "Mobile"),
            IntentChannel::Card => write!(f, "Card"),
        }
    }
}

impl FromStr for IntentChannel {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mobile" => Ok(Self::Mobile),
            "Card" => Ok(Self::Card),
            s => Err(ConversionError(format!("Invalid payment channel: {s}"))),
        }
    }
}

impl From<String> for IntentChannel {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment channel in DB: {value}. Defaulting to Mobile");
            IntentChannel::Mobile
        })
    }
}

//--------------------------------------     IntentKind      ---------------------------------------------------------
/// What a completed intent settles into: a coin top-up credits the payer's coin wallet, a shop
/// order credits the selling shop's settlement wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CoinTopup,
    ShopOrder,
}

impl Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentKind::CoinTopup => write!(f, "CoinTopup"),
            IntentKind::ShopOrder => write!(f, "ShopOrder"),
        }
    }
}

impl FromStr for IntentKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CoinTopup" | "coin_topup" => Ok(Self::CoinTopup),
            "ShopOrder" | "shop_order" => Ok(Self::ShopOrder),
            s => Err(ConversionError(format!("Invalid intent kind: {s}"))),
        }
    }
}

impl From<String> for IntentKind {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid intent kind in DB: {value}. Defaulting to CoinTopup");
            IntentKind::CoinTopup
        })
    }
}

//--------------------------------------    PaymentIntent    ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: i64,
    /// The gateway-assigned reference. The join key for webhooks, polls and ledger rows.
    pub reference: String,
    pub user_id: String,
    pub amount: Tzs,
    pub currency: String,
    pub channel: IntentChannel,
    pub kind: IntentKind,
    /// Present when `kind` is `ShopOrder`.
    pub order_id: Option<String>,
    pub idempotency_key: String,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub reference: String,
    pub user_id: String,
    pub amount: Tzs,
    pub currency: String,
    pub channel: IntentChannel,
    pub kind: IntentKind,
    pub order_id: Option<String>,
    pub idempotency_key: String,
}

impl NewPaymentIntent {
    pub fn coin_topup(
        reference: String,
        user_id: String,
        amount: Tzs,
        channel: IntentChannel,
        idempotency_key: String,
    ) -> Self {
        Self {
            reference,
            user_id,
            amount,
            currency: TZS_CURRENCY_CODE.to_string(),
            channel,
            kind: IntentKind::CoinTopup,
            order_id: None,
            idempotency_key,
        }
    }

    pub fn shop_order(
        reference: String,
        user_id: String,
        amount: Tzs,
        channel: IntentChannel,
        order_id: String,
        idempotency_key: String,
    ) -> Self {
        Self {
            reference,
            user_id,
            amount,
            currency: TZS_CURRENCY_CODE.to_string(),
            channel,
            kind: IntentKind::ShopOrder,
            order_id: Some(order_id),
            idempotency_key,
        }
    }
}

//--------------------------------------     CoinTxType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinTxType {
    Deposit,
    Withdraw,
    Gift,
    Adjustment,
}

impl Display for CoinTxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoinTxType::Deposit => write!(f, "Deposit"),
            CoinTxType::Withdraw => write!(f, "Withdraw"),
            CoinTxType::Gift => write!(f, "Gift"),
            CoinTxType::Adjustment => write!(f, "Adjustment"),
        }
    }
}

impl From<String> for CoinTxType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Deposit" => Self::Deposit,
            "Withdraw" => Self::Withdraw,
            "Gift" => Self::Gift,
            "Adjustment" => Self::Adjustment,
            _ => {
                error!("Invalid coin transaction type in DB: {value}. Defaulting to Adjustment");
                Self::Adjustment
            },
        }
    }
}

//--------------------------------------   CoinTransaction   ---------------------------------------------------------
/// Immutable coin-ledger entry. The wallet balance is only ever mutated alongside an insert here,
/// in the same database transaction.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CoinTransaction {
    pub id: i64,
    pub user_id: String,
    /// Gateway or transfer reference. `(reference, tx_type)` is unique when present, which is the
    /// at-most-once gate for all crediting logic.
    pub reference: Option<String>,
    pub tx_type: CoinTxType,
    /// Signed amount. Credits positive, debits negative.
    pub coins: Coins,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CoinWallet {
    pub user_id: String,
    pub balance: Coins,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     ShopTxType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShopTxType {
    Sale,
    Refund,
    Payout,
    Adjustment,
}

impl Display for ShopTxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShopTxType::Sale => write!(f, "Sale"),
            ShopTxType::Refund => write!(f, "Refund"),
            ShopTxType::Payout => write!(f, "Payout"),
            ShopTxType::Adjustment => write!(f, "Adjustment"),
        }
    }
}

impl From<String> for ShopTxType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Sale" => Self::Sale,
            "Refund" => Self::Refund,
            "Payout" => Self::Payout,
            "Adjustment" => Self::Adjustment,
            _ => {
                error!("Invalid shop transaction type in DB: {value}. Defaulting to Adjustment");
                Self::Adjustment
            },
        }
    }
}

//--------------------------------------   ShopTransaction   ---------------------------------------------------------
/// Immutable shop settlement-ledger entry, in shillings. Mirrors the coin ledger structure.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShopTransaction {
    pub id: i64,
    pub shop_id: String,
    pub reference: Option<String>,
    pub tx_type: ShopTxType,
    pub amount: Tzs,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShopWallet {
    pub shop_id: String,
    pub balance: Tzs,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------  WithdrawalStatus   ---------------------------------------------------------
/// A withdrawal resolves exactly once; `Pending` -> `Completed` or `Pending` -> `Failed`, never
/// reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Failed,
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "Pending"),
            WithdrawalStatus::Completed => write!(f, "Completed"),
            WithdrawalStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl From<String> for WithdrawalStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            _ => {
                error!("Invalid withdrawal status in DB: {value}. Defaulting to Pending");
                Self::Pending
            },
        }
    }
}

//--------------------------------------     Withdrawal      ---------------------------------------------------------
/// A user coin withdrawal. The coin wallet is debited pessimistically when this row is created;
/// a failed payout restores the balance via the reversal path.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    pub reference: String,
    pub user_id: String,
    /// Coins debited from the wallet.
    pub coins: Coins,
    /// Gross payout value in shillings, before fees.
    pub amount: Tzs,
    pub fee_amount: Tzs,
    /// What actually gets disbursed: `amount - fee_amount`.
    pub net_amount: Tzs,
    pub msisdn: String,
    pub idempotency_key: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub reference: String,
    pub user_id: String,
    pub coins: Coins,
    pub amount: Tzs,
    pub fee_amount: Tzs,
    pub net_amount: Tzs,
    pub msisdn: String,
    pub idempotency_key: String,
}

//--------------------------------------   ShopWithdrawal    ---------------------------------------------------------
/// The shop variant. Debits the shop settlement wallet instead of a coin wallet; shares the
/// withdrawal reference namespace with [`Withdrawal`].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShopWithdrawal {
    pub id: i64,
    pub reference: String,
    pub shop_id: String,
    pub amount: Tzs,
    pub fee_amount: Tzs,
    pub net_amount: Tzs,
    pub msisdn: String,
    pub idempotency_key: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShopWithdrawal {
    pub reference: String,
    pub shop_id: String,
    pub amount: Tzs,
    pub fee_amount: Tzs,
    pub net_amount: Tzs,
    pub msisdn: String,
    pub idempotency_key: String,
}

//--------------------------------------    OrderStatus      ---------------------------------------------------------
/// Order lifecycle is owned by the commerce module; settlement only moves `PendingPayment` to
/// `Processing` and reversal to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingPayment,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::PendingPayment => write!(f, "PendingPayment"),
            OrderStatus::Processing => write!(f, "Processing"),
            OrderStatus::Shipped => write!(f, "Shipped"),
            OrderStatus::Delivered => write!(f, "Delivered"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PendingPayment" => Self::PendingPayment,
            "Processing" => Self::Processing,
            "Shipped" => Self::Shipped,
            "Delivered" => Self::Delivered,
            "Cancelled" => Self::Cancelled,
            _ => {
                error!("Invalid order status in DB: {value}. Defaulting to PendingPayment");
                Self::PendingPayment
            },
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: String,
    pub shop_id: String,
    pub buyer_id: String,
    pub total_amount: Tzs,
    pub status: OrderStatus,
    /// Raised by the reversal path when a settled payment is clawed back.
    pub payment_issue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Tzs,
}

//--------------------------------------  PayoutDestination  ---------------------------------------------------------
/// A previously verified mobile-money destination. Withdrawals are rejected outright when the
/// requester has none on file.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PayoutDestination {
    pub id: i64,
    pub owner_id: String,
    pub msisdn: String,
    pub account_name: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_transitions() {
        use IntentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Reversed));
        // completed is otherwise final
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Completed));
        // terminal states never move
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Expired.can_transition_to(Completed));
        assert!(!Reversed.can_transition_to(Completed));
        // no going backwards
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn kind_accepts_wire_spelling() {
        assert_eq!("coin_topup".parse::<IntentKind>().unwrap(), IntentKind::CoinTopup);
        assert_eq!("ShopOrder".parse::<IntentKind>().unwrap(), IntentKind::ShopOrder);
        assert!("subscription".parse::<IntentKind>().is_err());
    }
}
