//! Pesa Ledger Engine
//!
//! The Pesa Ledger Engine holds the money-movement logic for the platform: payment intents, the
//! per-user coin ledger, the per-shop settlement ledger, withdrawals and gift transfers. It is
//! gateway-agnostic; everything that talks HTTP lives in the server crate.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). Sqlite is the supported backend. You
//!    should never need to access the database directly. Instead, use the public API provided by
//!    the engine. The exception is the data types used in the database. These are defined in the
//!    [`db_types`] module and are public.
//! 2. The engine public API ([`mod@ple_api`]). This provides the public-facing functionality of
//!    the engine: settlement, reversal, withdrawals, gifts and wallet queries. Backends need to
//!    implement the traits in [`traits`] in order to act as a store for the ledger server.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted
//! after a settlement, reversal or payout resolution commits. A simple Actor framework is used so
//! that you can easily hook into these events and perform custom actions, such as pushing a
//! notification to the payer.
pub mod db_types;
pub mod events;
pub mod helpers;
mod ple_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{AccountManagement, LedgerError, PaymentLedgerDatabase, SettlementContext};
pub use ple_api::{
    errors::SettlementError,
    ledger_objects::{self, FeeSchedule, SettlementResult},
    settlement_api::SettlementApi,
    wallet_api::WalletApi,
};
