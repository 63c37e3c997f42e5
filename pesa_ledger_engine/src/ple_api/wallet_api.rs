use crate::{
    db_types::{CoinTransaction, CoinWallet, Order, PaymentIntent, ShopTransaction, ShopWallet, ShopWithdrawal, Withdrawal},
    traits::{AccountApiError, AccountManagement},
};

/// Read-only queries over wallets, balances and transaction history.
#[derive(Clone)]
pub struct WalletApi<B> {
    db: B,
}

impl<B> WalletApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn intent_by_reference(&self, reference: &str) -> Result<Option<PaymentIntent>, AccountApiError> {
        self.db.fetch_intent_by_reference(reference).await
    }

    pub async fn intent_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentIntent>, AccountApiError> {
        self.db.fetch_intent_by_idempotency_key(key).await
    }

    /// A user's coin balance. A user with no wallet row has a zero balance.
    pub async fn coin_wallet(&self, user_id: &str) -> Result<Option<CoinWallet>, AccountApiError> {
        self.db.fetch_coin_wallet(user_id).await
    }

    pub async fn shop_wallet(&self, shop_id: &str) -> Result<Option<ShopWallet>, AccountApiError> {
        self.db.fetch_shop_wallet(shop_id).await
    }

    pub async fn coin_history(&self, user_id: &str, limit: i64) -> Result<Vec<CoinTransaction>, AccountApiError> {
        self.db.fetch_coin_history(user_id, limit).await
    }

    pub async fn shop_history(&self, shop_id: &str, limit: i64) -> Result<Vec<ShopTransaction>, AccountApiError> {
        self.db.fetch_shop_history(shop_id, limit).await
    }

    pub async fn order_by_order_id(&self, order_id: &str) -> Result<Option<Order>, AccountApiError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn withdrawal_by_reference(&self, reference: &str) -> Result<Option<Withdrawal>, AccountApiError> {
        self.db.fetch_withdrawal_by_reference(reference).await
    }

    pub async fn shop_withdrawal_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ShopWithdrawal>, AccountApiError> {
        self.db.fetch_shop_withdrawal_by_reference(reference).await
    }
}
