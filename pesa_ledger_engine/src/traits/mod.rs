//! # Ledger backend contracts.
//!
//! This module defines the interface contracts that a database backend must implement to power the
//! payment engine.
//!
//! ## Ledgers
//! The engine maintains two ledgers: a per-user coin wallet (funded by top-ups, spent on gifts and
//! withdrawals) and a per-shop settlement wallet (funded by order sales, drained by payouts and
//! refunds). Both are materialized balances; every balance mutation is paired with an immutable
//! transaction row in the same database transaction, and the `(reference, tx_type)` pair on those
//! rows is the sole at-most-once gate for crediting logic.
//!
//! ## Traits
//! * [`PaymentLedgerDatabase`] defines the mutating settlement, reversal, withdrawal and transfer
//!   flows. Every method is safe to call concurrently with itself and with the others; a replay
//!   that hits an idempotency gate reports `credited: false` rather than failing.
//! * [`AccountManagement`] provides read-only queries over intents, wallets, ledger histories,
//!   withdrawals, and orders.
mod account_management;
mod data_objects;
mod payment_ledger_database;

pub use account_management::{AccountApiError, AccountManagement};
pub use data_objects::{
    GiftTransfer,
    OrderReversal,
    OrderSettlement,
    PayoutKind,
    PayoutResolution,
    SettlementContext,
    TopupReversal,
    TopupSettlement,
};
pub use payment_ledger_database::{LedgerError, PaymentLedgerDatabase};
