use std::fmt::Display;

use gateway_tools::CardDetails;
use pesa_ledger_engine::db_types::{IntentChannel, IntentStatus};
use plg_common::{Coins, Tzs};
use serde::{Deserialize, Serialize};

/// Request body for starting a coin top-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUpRequest {
    pub user_id: String,
    pub amount: Tzs,
    pub channel: IntentChannel,
    /// Mobile money number, required for the mobile channel.
    pub msisdn: Option<String>,
    /// Card details, required for the card channel.
    pub card: Option<CardDetails>,
    /// Client-supplied idempotency key. Retrying with the same key returns the original intent
    /// instead of creating a second one.
    pub idempotency_key: Option<String>,
}

/// Request body for paying an existing shop order. The amount comes off the order row, never off
/// the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaymentRequest {
    pub buyer_id: String,
    pub order_id: String,
    pub channel: IntentChannel,
    pub msisdn: Option<String>,
    pub card: Option<CardDetails>,
    pub idempotency_key: Option<String>,
}

/// What the client gets back after creating (or replaying) a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentResponse {
    pub reference: String,
    pub status: IntentStatus,
    pub amount: Tzs,
    pub currency: String,
    /// Redirect URL for card payments; absent for mobile push payments.
    pub payment_url: Option<String>,
    /// False when the idempotency key matched an existing intent.
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub user_id: String,
    pub amount: Tzs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopWithdrawalRequest {
    pub shop_id: String,
    pub amount: Tzs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftRequest {
    pub sender_id: String,
    pub recipient_id: String,
    pub coins: Coins,
    /// Client-supplied reference. Retries with the same reference are no-ops; when absent the
    /// server generates one and the request is not retry-safe.
    pub reference: Option<String>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutDestinationRequest {
    pub owner_id: String,
    pub msisdn: String,
    pub account_name: String,
}

/// Webhook acknowledgement. Returned with a 200 status for everything we accepted or consciously
/// ignored; events the gateway should not retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event_type: String,
    pub reference: String,
    pub note: String,
}

impl WebhookAck {
    pub fn handled(event_type: &str, reference: &str, note: impl Display) -> Self {
        Self { received: true, event_type: event_type.into(), reference: reference.into(), note: note.to_string() }
    }

    pub fn ignored(event_type: &str, reference: &str, note: impl Display) -> Self {
        Self { received: false, event_type: event_type.into(), reference: reference.into(), note: note.to_string() }
    }
}
