//! Thin HTTP client for the external payment gateway.
//!
//! The gateway accepts mobile-money and card payment intents, payout (disbursement) requests, and
//! exposes a status-poll endpoint per reference. All mutating calls carry a caller-generated
//! idempotency key. This crate only knows about the gateway's wire formats; ledger semantics live
//! in `pesa_ledger_engine`.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::{new_idempotency_key, GatewayApi};
pub use config::GatewayConfig;
pub use data_objects::{
    CardDetails,
    GatewayEvent,
    GatewayIntent,
    GatewayPayout,
    GatewayStatus,
    NewIntentRequest,
    NewPayoutRequest,
    WebhookEnvelope,
    WebhookPayload,
};
pub use error::GatewayApiError;
