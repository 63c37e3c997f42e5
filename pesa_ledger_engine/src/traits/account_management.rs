use thiserror::Error;

use crate::db_types::{
    CoinTransaction,
    CoinWallet,
    Order,
    PaymentIntent,
    PayoutDestination,
    ShopTransaction,
    ShopWallet,
    ShopWithdrawal,
    Withdrawal,
};

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        AccountApiError::DatabaseError(e.to_string())
    }
}

/// Read-only queries over the ledger store. The [`PaymentLedgerDatabase`] trait handles the
/// machinery of settling payments against wallets; `AccountManagement` answers questions about
/// the current state.
///
/// [`PaymentLedgerDatabase`]: crate::traits::PaymentLedgerDatabase
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the intent for the given gateway reference. `None` if the local row is missing,
    /// which can legitimately happen when the row failed to persist at creation time.
    async fn fetch_intent_by_reference(&self, reference: &str) -> Result<Option<PaymentIntent>, AccountApiError>;

    async fn fetch_intent_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentIntent>, AccountApiError>;

    /// Fetches the coin wallet for a user. `None` means the user has never had a coin transaction.
    async fn fetch_coin_wallet(&self, user_id: &str) -> Result<Option<CoinWallet>, AccountApiError>;

    async fn fetch_shop_wallet(&self, shop_id: &str) -> Result<Option<ShopWallet>, AccountApiError>;

    /// The most recent coin-ledger entries for a user, newest first.
    async fn fetch_coin_history(&self, user_id: &str, limit: i64) -> Result<Vec<CoinTransaction>, AccountApiError>;

    async fn fetch_shop_history(&self, shop_id: &str, limit: i64) -> Result<Vec<ShopTransaction>, AccountApiError>;

    async fn fetch_withdrawal_by_reference(&self, reference: &str) -> Result<Option<Withdrawal>, AccountApiError>;

    async fn fetch_shop_withdrawal_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ShopWithdrawal>, AccountApiError>;

    async fn fetch_order_by_order_id(&self, order_id: &str) -> Result<Option<Order>, AccountApiError>;

    /// The payout destination on file for a user or shop owner, if any.
    async fn fetch_payout_destination(&self, owner_id: &str) -> Result<Option<PayoutDestination>, AccountApiError>;
}
