//! # Payment engine public API
//!
//! The `ple_api` module exposes the programmatic API for the payment engine. The API is modular,
//! so that clients can pick and choose the functionality they want.
//!
//! * [`settlement_api`] is the primary API for handling settlement, reversal, withdrawal and gift
//!   flows in response to gateway webhooks and reconciliation sweeps.
//! * [`wallet_api`] provides read-only access to wallets, ledger histories, intents and
//!   withdrawals.
//!
//! The pattern for using the APIs is the same: an API instance is created by supplying a database
//! backend that implements the traits the API requires.
//!
//! ```rust,ignore
//! use pesa_ledger_engine::{SettlementApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements PaymentLedgerDatabase
//! let api = SettlementApi::new(db, producers);
//! let result = api.process_completed_payment("PAY-123", 0.1, None).await?;
//! ```
pub mod errors;
pub mod ledger_objects;
pub mod settlement_api;
pub mod wallet_api;
