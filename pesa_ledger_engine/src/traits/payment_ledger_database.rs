use chrono::Duration;
use plg_common::Coins;
use thiserror::Error;

use crate::{
    db_types::{
        IntentStatus,
        NewPaymentIntent,
        NewShopWithdrawal,
        NewWithdrawal,
        PaymentIntent,
        PayoutDestination,
        ShopWithdrawal,
        Withdrawal,
    },
    traits::{
        data_objects::{
            GiftTransfer,
            OrderReversal,
            OrderSettlement,
            PayoutResolution,
            SettlementContext,
            TopupReversal,
            TopupSettlement,
        },
        AccountApiError,
        AccountManagement,
    },
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Payment intent already exists: {0}")]
    IntentAlreadyExists(String),
    #[error("No payment intent found for reference {0}")]
    IntentNotFound(String),
    #[error("A {1} transaction already exists for reference {0}")]
    TransactionAlreadyExists(String, String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("No withdrawal found for reference {0}")]
    WithdrawalNotFound(String),
    #[error("No order found for order id {0}")]
    OrderNotFound(String),
    #[error("Cannot settle {0}: neither an order row nor a shop id is available")]
    SettlementTargetUnknown(String),
    #[error("Account error: {0}")]
    AccountError(#[from] AccountApiError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// This trait defines the highest level of behaviour for backends supporting the payment engine.
///
/// This behaviour includes:
/// * Persisting payment intents and advancing their status as gateway signals arrive.
/// * Settling completed payments into the coin and shop ledgers, exactly once per reference.
/// * Reversing settlements when the gateway claws a payment back.
/// * The pessimistic-debit withdrawal flow and its failed-payout restore path.
///
/// Webhook handling and the reconciliation sweeps race on the same references by design. Every
/// method here must therefore be idempotent: the loser of a race performs an existence check,
/// mutates nothing, and reports the fact in its result object.
#[allow(async_fn_in_trait)]
pub trait PaymentLedgerDatabase: Clone + AccountManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new payment intent. Idempotent on the reference: if a row for the reference
    /// already exists, the existing row is returned with `false`.
    async fn insert_intent(&self, intent: NewPaymentIntent) -> Result<(PaymentIntent, bool), LedgerError>;

    /// Advances the intent's status. Transitions that the lifecycle does not allow (stale or
    /// duplicate gateway signals) are ignored and return `None`; the caller must not fire side
    /// effects in that case.
    async fn update_intent_status(
        &self,
        reference: &str,
        status: IntentStatus,
    ) -> Result<Option<PaymentIntent>, LedgerError>;

    /// Settles a completed coin top-up, in a single atomic transaction:
    /// * inserts the `Deposit` ledger row for the context's reference. If such a row already
    ///   exists, nothing further is done and the result reports `credited: false`.
    /// * atomically increments the user's coin balance by `coins`.
    async fn settle_coin_topup(&self, ctx: &SettlementContext, coins: Coins) -> Result<TopupSettlement, LedgerError>;

    /// Settles a completed shop-order payment, in a single atomic transaction:
    /// * loads the order named by the context. The credit amount is the order total; if the order
    ///   row is missing, the payment amount is used and `ctx.shop_id` names the wallet.
    /// * inserts the `Sale` ledger row for the reference (idempotency gate, as above).
    /// * atomically increments the shop's settlement balance.
    /// * advances the order from `PendingPayment` to `Processing` and bumps the sold counter on
    ///   each of its products.
    async fn settle_shop_order(&self, ctx: &SettlementContext) -> Result<OrderSettlement, LedgerError>;

    /// Reverses a settled coin top-up by inserting a negative `Adjustment` row (never a second
    /// `Deposit`) and decrementing the balance. The clawed-back amount is read off the deposit
    /// row. Idempotent on `(reference, Adjustment)`.
    async fn reverse_coin_topup(&self, ctx: &SettlementContext) -> Result<TopupReversal, LedgerError>;

    /// Reverses a settled shop-order payment: inserts a negative `Refund` row, decrements the
    /// shop balance, raises the order's payment-issue flag and cancels it. Idempotent on
    /// `(reference, Refund)`.
    async fn reverse_shop_order(&self, ctx: &SettlementContext) -> Result<OrderReversal, LedgerError>;

    /// Creates a user coin withdrawal, in a single atomic transaction:
    /// * debits the coin wallet, guarded so the balance can never go negative. Insufficient funds
    ///   abort the whole call before anything touches the gateway.
    /// * inserts the negative `Withdraw` ledger row and the pending withdrawal record.
    ///
    /// The gateway payout call happens after this commits; a failed payout is restored through
    /// [`resolve_payout`](Self::resolve_payout).
    async fn create_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal, LedgerError>;

    /// The shop variant of [`create_withdrawal`](Self::create_withdrawal), debiting the shop
    /// settlement wallet with a `Payout` ledger row.
    async fn create_shop_withdrawal(&self, withdrawal: NewShopWithdrawal) -> Result<ShopWithdrawal, LedgerError>;

    /// Resolves a pending payout to `Completed` or `Failed`. The reference is looked up in both
    /// withdrawal tables. On failure, the debited amount is credited back via an `Adjustment`
    /// ledger row, gated on `(reference, Adjustment)` so a replay never restores twice.
    ///
    /// Returns `None` when the payout was already resolved (a duplicate signal).
    async fn resolve_payout(&self, reference: &str, success: bool) -> Result<Option<PayoutResolution>, LedgerError>;

    /// Moves `coins` from one user's wallet to another's, atomically. The sender debit is guarded
    /// like a withdrawal; the whole transfer is idempotent on the gift reference.
    async fn transfer_gift(
        &self,
        sender_id: &str,
        recipient_id: &str,
        coins: Coins,
        reference: &str,
        memo: Option<String>,
    ) -> Result<GiftTransfer, LedgerError>;

    /// Marks intents that have sat in `Pending` for longer than `max_age` as `Expired`.
    /// Returns the expired intents.
    async fn expire_stale_intents(&self, max_age: Duration) -> Result<Vec<PaymentIntent>, LedgerError>;

    /// All intents currently in the given status, oldest first. The pending-payment sweep feeds
    /// from this.
    async fn fetch_intents_in_status(&self, status: IntentStatus) -> Result<Vec<PaymentIntent>, LedgerError>;

    /// References of all pending payouts across both withdrawal tables, deduplicated, so the
    /// payout sweep polls each reference exactly once.
    async fn fetch_pending_payout_references(&self) -> Result<Vec<String>, LedgerError>;

    /// Completed intents from the last `window` that have no matching ledger row (`Deposit` or
    /// `Sale`). These are candidates for missing-credit reconciliation.
    async fn fetch_unsettled_completed_intents(&self, window: Duration) -> Result<Vec<PaymentIntent>, LedgerError>;

    /// Registers or replaces the mobile-money destination that payouts for `owner_id` go to.
    async fn upsert_payout_destination(
        &self,
        owner_id: &str,
        msisdn: &str,
        account_name: &str,
    ) -> Result<PayoutDestination, LedgerError>;
}
