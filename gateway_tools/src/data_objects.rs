use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use plg_common::Tzs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::GatewayApiError;

//--------------------------------------   GatewayStatus   -----------------------------------------------------------
/// The gateway's view of an intent or payout. The wire values are not entirely uniform (older API
/// versions report "success" and "refunded"), so parsing is lenient and everything funnels into
/// this one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum GatewayStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
    Expired,
}

impl FromStr for GatewayStatus {
    type Err = GatewayApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "created" => Ok(Self::Pending),
            "processing" | "in_progress" => Ok(Self::Processing),
            "completed" | "success" | "succeeded" => Ok(Self::Completed),
            "failed" | "declined" | "rejected" => Ok(Self::Failed),
            "reversed" | "refunded" | "charged_back" => Ok(Self::Reversed),
            "expired" | "timeout" => Ok(Self::Expired),
            other => Err(GatewayApiError::JsonError(format!("Unknown gateway status: {other}"))),
        }
    }
}

impl TryFrom<String> for GatewayStatus {
    type Error = GatewayApiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GatewayStatus> for &'static str {
    fn from(s: GatewayStatus) -> Self {
        match s {
            GatewayStatus::Pending => "pending",
            GatewayStatus::Processing => "processing",
            GatewayStatus::Completed => "completed",
            GatewayStatus::Failed => "failed",
            GatewayStatus::Reversed => "reversed",
            GatewayStatus::Expired => "expired",
        }
    }
}

impl Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s: &'static str = (*self).into();
        write!(f, "{s}")
    }
}

//--------------------------------------   Intent objects   ----------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct NewIntentRequest {
    pub amount: Tzs,
    pub currency: String,
    /// Mobile-money subscriber number, for the mobile channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msisdn: Option<String>,
    /// Card fields, for the card (redirect) channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<CardDetails>,
    /// Free-form metadata echoed back in webhooks. The engine stores `{kind, user_id, order_id}`
    /// here so a settlement can be reconstructed even if the local intent row was lost.
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub holder_name: String,
    pub return_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayIntent {
    pub reference: String,
    pub status: GatewayStatus,
    pub amount: Tzs,
    pub currency: String,
    /// Redirect URL for card/mobile web flows; absent for direct mobile push.
    pub payment_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

//--------------------------------------   Payout objects   ----------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct NewPayoutRequest {
    /// Client-supplied payout reference. The gateway echoes it in webhooks and poll responses,
    /// which is how payout signals join back onto the local withdrawal row.
    pub reference: String,
    pub amount: Tzs,
    pub currency: String,
    pub msisdn: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayout {
    pub reference: String,
    pub status: GatewayStatus,
    pub amount: Tzs,
}

//--------------------------------------   Webhook events   ----------------------------------------------------------
/// A normalized webhook notification. The gateway posts two body shapes: a typed envelope
/// `{"event": "...", "data": {...}}` and (older integrations) a bare `{"reference": ..,
/// "status": ..}` payload. [`GatewayEvent::from_body`] accepts both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEvent {
    /// Dotted event name, e.g. `payment.completed` or `payout.failed`. Synthesized as
    /// `payment.<status>` for bare payloads.
    pub event_type: String,
    pub reference: String,
    pub status: GatewayStatus,
    pub amount: Option<Tzs>,
    pub currency: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub data: WebhookPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub reference: String,
    pub status: GatewayStatus,
    #[serde(default)]
    pub amount: Option<Tzs>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl GatewayEvent {
    /// Parses a raw webhook body, accepting either the typed envelope or the bare payload shape.
    pub fn from_body(body: &[u8]) -> Result<Self, GatewayApiError> {
        if let Ok(envelope) = serde_json::from_slice::<WebhookEnvelope>(body) {
            return Ok(Self::from(envelope));
        }
        let payload =
            serde_json::from_slice::<WebhookPayload>(body).map_err(|e| GatewayApiError::JsonError(e.to_string()))?;
        let event_type = format!("payment.{}", payload.status);
        Ok(Self {
            event_type,
            reference: payload.reference,
            status: payload.status,
            amount: payload.amount,
            currency: payload.currency,
            metadata: payload.metadata,
        })
    }

    /// Payout events use the `payout.*` namespace; everything else is a payment event.
    pub fn is_payout(&self) -> bool {
        self.event_type.starts_with("payout.")
    }
}

impl From<WebhookEnvelope> for GatewayEvent {
    fn from(envelope: WebhookEnvelope) -> Self {
        let WebhookEnvelope { event, data } = envelope;
        Self {
            event_type: event,
            reference: data.reference,
            status: data.status,
            amount: data.amount,
            currency: data.currency,
            metadata: data.metadata,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_typed_envelope() {
        let body = br#"{
            "event": "payment.completed",
            "data": {
                "reference": "PAY-123",
                "status": "completed",
                "amount": 10000,
                "currency": "TZS",
                "metadata": {"kind": "coin_topup", "user_id": "u-1"}
            }
        }"#;
        let event = GatewayEvent::from_body(body).unwrap();
        assert_eq!(event.event_type, "payment.completed");
        assert_eq!(event.reference, "PAY-123");
        assert_eq!(event.status, GatewayStatus::Completed);
        assert_eq!(event.amount, Some(Tzs::from(10_000)));
        assert_eq!(event.metadata["kind"], "coin_topup");
        assert!(!event.is_payout());
    }

    #[test]
    fn parses_bare_payload() {
        let body = br#"{"reference": "PAY-456", "status": "success", "amount": 2500}"#;
        let event = GatewayEvent::from_body(body).unwrap();
        assert_eq!(event.event_type, "payment.completed");
        assert_eq!(event.status, GatewayStatus::Completed);
        assert_eq!(event.currency, None);
    }

    #[test]
    fn payout_namespace() {
        let body = br#"{"event": "payout.failed", "data": {"reference": "WD-1", "status": "failed"}}"#;
        let event = GatewayEvent::from_body(body).unwrap();
        assert!(event.is_payout());
        assert_eq!(event.status, GatewayStatus::Failed);
    }

    #[test]
    fn rejects_missing_reference() {
        let body = br#"{"status": "completed"}"#;
        assert!(GatewayEvent::from_body(body).is_err());
    }

    #[test]
    fn lenient_status_aliases() {
        for (raw, expected) in [
            ("refunded", GatewayStatus::Reversed),
            ("succeeded", GatewayStatus::Completed),
            ("in_progress", GatewayStatus::Processing),
            ("declined", GatewayStatus::Failed),
        ] {
            assert_eq!(raw.parse::<GatewayStatus>().unwrap(), expected);
        }
        assert!("garbage".parse::<GatewayStatus>().is_err());
    }
}
