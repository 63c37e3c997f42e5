//! # Pesa Ledger Server
//! This crate hosts the HTTP surface of the payment and ledger subsystem. It is responsible for:
//! * Accepting top-up, order-payment, withdrawal and gift requests and driving them through the
//!   gateway client and the ledger engine.
//! * Listening for incoming webhook requests from the payment gateway, verifying their HMAC
//!   signatures, and applying the signalled state changes.
//! * Running the reconciliation worker that repairs whatever the webhooks missed.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more
//! information.
//!
//! ## Routes
//! See [routes] for the full list. `/health` is a liveness check; everything that moves money
//! lives under its own path and returns JSON.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod gateway_routes;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod reconciler;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
