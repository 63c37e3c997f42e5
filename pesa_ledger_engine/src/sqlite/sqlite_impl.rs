//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`traits`](crate::traits) module.
//!
//! Every settlement and reversal flow runs inside a single database transaction: the ledger row
//! insert (the idempotency gate) and the balance mutation commit or roll back together, so a
//! balance can never drift from the sum of its ledger rows.
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use plg_common::Coins;
use sqlx::SqlitePool;

use super::db::{coin_ledger, db_url, intents, new_pool, orders, shop_ledger, withdrawals};
use crate::{
    db_types::{
        CoinTransaction,
        CoinTxType,
        CoinWallet,
        IntentStatus,
        NewPaymentIntent,
        NewShopWithdrawal,
        NewWithdrawal,
        Order,
        PaymentIntent,
        PayoutDestination,
        ShopTransaction,
        ShopTxType,
        ShopWallet,
        ShopWithdrawal,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::{
        AccountApiError,
        AccountManagement,
        GiftTransfer,
        LedgerError,
        OrderReversal,
        OrderSettlement,
        PaymentLedgerDatabase,
        PayoutKind,
        PayoutResolution,
        SettlementContext,
        TopupReversal,
        TopupSettlement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database api object using the DB URL from the `PLG_DATABASE_URL` envar.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_intent(&self, intent: NewPaymentIntent) -> Result<(PaymentIntent, bool), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let reference = intent.reference.clone();
        match intents::idempotent_insert(intent, &mut conn).await {
            Ok(intent) => {
                debug!("🗃️ Intent {} has been saved in the DB with id {}", intent.reference, intent.id);
                Ok((intent, true))
            },
            Err(LedgerError::IntentAlreadyExists(_)) => {
                let existing = intents::fetch_by_reference(&reference, &mut conn)
                    .await?
                    .ok_or(LedgerError::IntentNotFound(reference))?;
                Ok((existing, false))
            },
            Err(e) => Err(e),
        }
    }

    async fn update_intent_status(
        &self,
        reference: &str,
        status: IntentStatus,
    ) -> Result<Option<PaymentIntent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let updated = intents::update_status(reference, status, &mut conn).await?;
        match &updated {
            Some(intent) => debug!("🗃️ Intent {reference} moved to {}", intent.status),
            None => trace!("🗃️ Status signal {status} for {reference} was stale or unknown. Ignoring."),
        }
        Ok(updated)
    }

    async fn settle_coin_topup(&self, ctx: &SettlementContext, coins: Coins) -> Result<TopupSettlement, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let memo = Some(format!("Top-up of {}", ctx.amount));
        let reference = ctx.reference.as_str();
        let user_id = ctx.user_id.as_str();
        match coin_ledger::idempotent_insert(user_id, Some(reference), CoinTxType::Deposit, coins, memo, &mut tx).await
        {
            Ok(_) => {
                let balance = coin_ledger::adjust_balance(user_id, coins, &mut tx).await?;
                tx.commit().await?;
                debug!("🗃️ Settled top-up {reference}: {coins} credited to {user_id}, balance now {balance}");
                Ok(TopupSettlement {
                    credited: true,
                    reference: reference.to_string(),
                    user_id: user_id.to_string(),
                    coins,
                    balance,
                })
            },
            Err(LedgerError::TransactionAlreadyExists(..)) => {
                let balance =
                    coin_ledger::fetch_wallet(user_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                tx.commit().await?;
                debug!("🗃️ Top-up {reference} was already settled. No-op.");
                Ok(TopupSettlement {
                    credited: false,
                    reference: reference.to_string(),
                    user_id: user_id.to_string(),
                    coins,
                    balance,
                })
            },
            Err(e) => Err(e),
        }
    }

    async fn settle_shop_order(&self, ctx: &SettlementContext) -> Result<OrderSettlement, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let reference = ctx.reference.as_str();
        let order = match ctx.order_id.as_deref() {
            Some(oid) => orders::fetch_by_order_id(oid, &mut tx).await?,
            None => None,
        };
        let (shop_id, amount) = match &order {
            Some(o) => (o.shop_id.clone(), o.total_amount),
            None => {
                warn!("🗃️ No order row for {reference}. Falling back to the payment amount.");
                let shop_id = ctx
                    .shop_id
                    .clone()
                    .ok_or_else(|| LedgerError::SettlementTargetUnknown(reference.to_string()))?;
                (shop_id, ctx.amount)
            },
        };
        let memo = order.as_ref().map(|o| format!("Sale for order {}", o.order_id));
        match shop_ledger::idempotent_insert(&shop_id, Some(reference), ShopTxType::Sale, amount, memo, &mut tx).await
        {
            Ok(_) => {
                let balance = shop_ledger::adjust_balance(&shop_id, amount, &mut tx).await?;
                let settled_order = match &order {
                    Some(o) => {
                        let updated = orders::mark_processing(&o.order_id, &mut tx).await?;
                        orders::bump_units_sold(&o.order_id, &mut tx).await?;
                        Some(updated.unwrap_or_else(|| o.clone()))
                    },
                    None => None,
                };
                tx.commit().await?;
                debug!("🗃️ Settled order payment {reference}: {amount} credited to shop {shop_id}");
                Ok(OrderSettlement {
                    credited: true,
                    reference: reference.to_string(),
                    shop_id,
                    amount,
                    balance,
                    order: settled_order,
                })
            },
            Err(LedgerError::TransactionAlreadyExists(..)) => {
                let balance =
                    shop_ledger::fetch_wallet(&shop_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                tx.commit().await?;
                debug!("🗃️ Order payment {reference} was already settled. No-op.");
                Ok(OrderSettlement { credited: false, reference: reference.to_string(), shop_id, amount, balance, order })
            },
            Err(e) => Err(e),
        }
    }

    async fn reverse_coin_topup(&self, ctx: &SettlementContext) -> Result<TopupReversal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let reference = ctx.reference.as_str();
        let user_id = ctx.user_id.as_str();
        // The deposit row records what was actually credited; that, not a re-derived amount, is
        // what gets clawed back. No deposit row means there is nothing to reverse.
        let coins = match coin_ledger::fetch_by_reference(reference, CoinTxType::Deposit, &mut tx).await? {
            Some(deposit) => deposit.coins,
            None => {
                warn!("🗃️ Reversal for {reference} arrived but no deposit row exists.");
                let balance =
                    coin_ledger::fetch_wallet(user_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                tx.commit().await?;
                return Ok(TopupReversal {
                    reversed: false,
                    reference: reference.to_string(),
                    user_id: user_id.to_string(),
                    coins: Coins::default(),
                    balance,
                });
            },
        };
        let memo = Some(format!("Reversal of top-up {reference}"));
        match coin_ledger::idempotent_insert(user_id, Some(reference), CoinTxType::Adjustment, -coins, memo, &mut tx)
            .await
        {
            Ok(_) => {
                let balance = coin_ledger::adjust_balance(user_id, -coins, &mut tx).await?;
                tx.commit().await?;
                info!("🗃️ Reversed top-up {reference}: {coins} debited from {user_id}");
                Ok(TopupReversal {
                    reversed: true,
                    reference: reference.to_string(),
                    user_id: user_id.to_string(),
                    coins,
                    balance,
                })
            },
            Err(LedgerError::TransactionAlreadyExists(..)) => {
                let balance =
                    coin_ledger::fetch_wallet(user_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                tx.commit().await?;
                debug!("🗃️ Top-up {reference} was already reversed. No-op.");
                Ok(TopupReversal {
                    reversed: false,
                    reference: reference.to_string(),
                    user_id: user_id.to_string(),
                    coins,
                    balance,
                })
            },
            Err(e) => Err(e),
        }
    }

    async fn reverse_shop_order(&self, ctx: &SettlementContext) -> Result<OrderReversal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let reference = ctx.reference.as_str();
        // The sale row is authoritative for who was credited and by how much
        let sale = shop_ledger::fetch_by_reference(reference, ShopTxType::Sale, &mut tx).await?;
        let (shop_id, amount) = match &sale {
            Some(s) => (s.shop_id.clone(), s.amount),
            None => {
                // nothing was ever credited, so there is nothing to claw back from the wallet
                warn!("🗃️ Reversal for {reference} arrived but no sale row exists.");
                let order = match ctx.order_id.as_deref() {
                    Some(oid) => orders::mark_payment_issue(oid, &mut tx).await?,
                    None => None,
                };
                tx.commit().await?;
                return Ok(OrderReversal {
                    reversed: false,
                    reference: reference.to_string(),
                    shop_id: order.as_ref().map(|o| o.shop_id.clone()).unwrap_or_default(),
                    amount: ctx.amount,
                    balance: Default::default(),
                    order,
                });
            },
        };
        let memo = Some(format!("Refund of sale {reference}"));
        match shop_ledger::idempotent_insert(&shop_id, Some(reference), ShopTxType::Refund, -amount, memo, &mut tx)
            .await
        {
            Ok(_) => {
                let balance = shop_ledger::adjust_balance(&shop_id, -amount, &mut tx).await?;
                let order = match ctx.order_id.as_deref() {
                    Some(oid) => orders::mark_payment_issue(oid, &mut tx).await?,
                    None => None,
                };
                tx.commit().await?;
                info!("🗃️ Reversed order payment {reference}: {amount} debited from shop {shop_id}");
                Ok(OrderReversal { reversed: true, reference: reference.to_string(), shop_id, amount, balance, order })
            },
            Err(LedgerError::TransactionAlreadyExists(..)) => {
                let balance =
                    shop_ledger::fetch_wallet(&shop_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                let order = match ctx.order_id.as_deref() {
                    Some(oid) => orders::fetch_by_order_id(oid, &mut tx).await?,
                    None => None,
                };
                tx.commit().await?;
                debug!("🗃️ Order payment {reference} was already reversed. No-op.");
                Ok(OrderReversal { reversed: false, reference: reference.to_string(), shop_id, amount, balance, order })
            },
            Err(e) => Err(e),
        }
    }

    async fn create_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let balance = coin_ledger::guarded_debit(&withdrawal.user_id, withdrawal.coins, &mut tx).await?;
        let memo = Some(format!("Withdrawal of {} to {}", withdrawal.net_amount, withdrawal.msisdn));
        coin_ledger::idempotent_insert(
            &withdrawal.user_id,
            Some(&withdrawal.reference),
            CoinTxType::Withdraw,
            -withdrawal.coins,
            memo,
            &mut tx,
        )
        .await?;
        let row = withdrawals::insert(withdrawal, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Withdrawal {} created for {}. Coin balance now {balance}", row.reference, row.user_id);
        Ok(row)
    }

    async fn create_shop_withdrawal(&self, withdrawal: NewShopWithdrawal) -> Result<ShopWithdrawal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let balance = shop_ledger::guarded_debit(&withdrawal.shop_id, withdrawal.amount, &mut tx).await?;
        let memo = Some(format!("Settlement payout of {} to {}", withdrawal.net_amount, withdrawal.msisdn));
        shop_ledger::idempotent_insert(
            &withdrawal.shop_id,
            Some(&withdrawal.reference),
            ShopTxType::Payout,
            -withdrawal.amount,
            memo,
            &mut tx,
        )
        .await?;
        let row = withdrawals::insert_shop(withdrawal, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Shop withdrawal {} created for {}. Balance now {balance}", row.reference, row.shop_id);
        Ok(row)
    }

    async fn resolve_payout(&self, reference: &str, success: bool) -> Result<Option<PayoutResolution>, LedgerError> {
        let status = if success { WithdrawalStatus::Completed } else { WithdrawalStatus::Failed };
        let mut tx = self.pool.begin().await?;
        if let Some(w) = withdrawals::resolve(reference, status, &mut tx).await? {
            let mut restored = false;
            if !success {
                let memo = Some(format!("Restore for failed payout {reference}"));
                match coin_ledger::idempotent_insert(
                    &w.user_id,
                    Some(reference),
                    CoinTxType::Adjustment,
                    w.coins,
                    memo,
                    &mut tx,
                )
                .await
                {
                    Ok(_) => {
                        coin_ledger::adjust_balance(&w.user_id, w.coins, &mut tx).await?;
                        restored = true;
                    },
                    Err(LedgerError::TransactionAlreadyExists(..)) => {},
                    Err(e) => return Err(e),
                }
            }
            tx.commit().await?;
            info!("🗃️ Payout {reference} resolved to {status}. Restored: {restored}");
            return Ok(Some(PayoutResolution {
                kind: PayoutKind::User,
                reference: reference.to_string(),
                owner_id: w.user_id,
                status,
                net_amount: w.net_amount,
                restored,
            }));
        }
        if let Some(w) = withdrawals::resolve_shop(reference, status, &mut tx).await? {
            let mut restored = false;
            if !success {
                let memo = Some(format!("Restore for failed payout {reference}"));
                match shop_ledger::idempotent_insert(
                    &w.shop_id,
                    Some(reference),
                    ShopTxType::Adjustment,
                    w.amount,
                    memo,
                    &mut tx,
                )
                .await
                {
                    Ok(_) => {
                        shop_ledger::adjust_balance(&w.shop_id, w.amount, &mut tx).await?;
                        restored = true;
                    },
                    Err(LedgerError::TransactionAlreadyExists(..)) => {},
                    Err(e) => return Err(e),
                }
            }
            tx.commit().await?;
            info!("🗃️ Shop payout {reference} resolved to {status}. Restored: {restored}");
            return Ok(Some(PayoutResolution {
                kind: PayoutKind::Shop,
                reference: reference.to_string(),
                owner_id: w.shop_id,
                status,
                net_amount: w.net_amount,
                restored,
            }));
        }
        // Not pending in either table. Work out whether it was already resolved or never existed.
        let known = withdrawals::fetch_by_reference(reference, &mut tx).await?.is_some()
            || withdrawals::fetch_shop_by_reference(reference, &mut tx).await?.is_some();
        tx.commit().await?;
        if known {
            debug!("🗃️ Payout {reference} was already resolved. No-op.");
            Ok(None)
        } else {
            Err(LedgerError::WithdrawalNotFound(reference.to_string()))
        }
    }

    async fn transfer_gift(
        &self,
        sender_id: &str,
        recipient_id: &str,
        coins: Coins,
        reference: &str,
        memo: Option<String>,
    ) -> Result<GiftTransfer, LedgerError> {
        let mut tx = self.pool.begin().await?;
        // Each leg carries its own suffixed reference so both can be Gift rows under the
        // (reference, tx_type) uniqueness rule. The /out insert doubles as the idempotency gate
        // for the whole transfer.
        let out_ref = format!("{reference}/out");
        let in_ref = format!("{reference}/in");
        match coin_ledger::idempotent_insert(sender_id, Some(&out_ref), CoinTxType::Gift, -coins, memo.clone(), &mut tx)
            .await
        {
            Ok(_) => {},
            Err(LedgerError::TransactionAlreadyExists(..)) => {
                let sender_balance =
                    coin_ledger::fetch_wallet(sender_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                let recipient_balance =
                    coin_ledger::fetch_wallet(recipient_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                tx.commit().await?;
                debug!("🗃️ Gift {reference} was already transferred. No-op.");
                return Ok(GiftTransfer {
                    reference: reference.to_string(),
                    sender_id: sender_id.to_string(),
                    recipient_id: recipient_id.to_string(),
                    coins,
                    sender_balance,
                    recipient_balance,
                });
            },
            Err(e) => return Err(e),
        }
        let sender_balance = coin_ledger::guarded_debit(sender_id, coins, &mut tx).await?;
        coin_ledger::idempotent_insert(recipient_id, Some(&in_ref), CoinTxType::Gift, coins, memo, &mut tx).await?;
        let recipient_balance = coin_ledger::adjust_balance(recipient_id, coins, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Gift {reference}: {coins} moved from {sender_id} to {recipient_id}");
        Ok(GiftTransfer {
            reference: reference.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            coins,
            sender_balance,
            recipient_balance,
        })
    }

    async fn expire_stale_intents(&self, max_age: Duration) -> Result<Vec<PaymentIntent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let expired = intents::expire_older_than(max_age, &mut conn).await?;
        if !expired.is_empty() {
            info!("🗃️ Expired {} stale intents", expired.len());
        }
        Ok(expired)
    }

    async fn fetch_intents_in_status(&self, status: IntentStatus) -> Result<Vec<PaymentIntent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = intents::fetch_in_status(status, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_pending_payout_references(&self) -> Result<Vec<String>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = withdrawals::pending_references(&mut conn).await?;
        Ok(result)
    }

    async fn fetch_unsettled_completed_intents(&self, window: Duration) -> Result<Vec<PaymentIntent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = intents::fetch_unsettled_completed(window, &mut conn).await?;
        Ok(result)
    }

    async fn upsert_payout_destination(
        &self,
        owner_id: &str,
        msisdn: &str,
        account_name: &str,
    ) -> Result<PayoutDestination, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = withdrawals::upsert_payout_destination(owner_id, msisdn, account_name, &mut conn).await?;
        Ok(result)
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_intent_by_reference(&self, reference: &str) -> Result<Option<PaymentIntent>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = intents::fetch_by_reference(reference, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_intent_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentIntent>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = intents::fetch_by_idempotency_key(key, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_coin_wallet(&self, user_id: &str) -> Result<Option<CoinWallet>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = coin_ledger::fetch_wallet(user_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_shop_wallet(&self, shop_id: &str) -> Result<Option<ShopWallet>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = shop_ledger::fetch_wallet(shop_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_coin_history(&self, user_id: &str, limit: i64) -> Result<Vec<CoinTransaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = coin_ledger::history(user_id, limit, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_shop_history(&self, shop_id: &str, limit: i64) -> Result<Vec<ShopTransaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = shop_ledger::history(shop_id, limit, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_withdrawal_by_reference(&self, reference: &str) -> Result<Option<Withdrawal>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = withdrawals::fetch_by_reference(reference, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_shop_withdrawal_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ShopWithdrawal>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = withdrawals::fetch_shop_by_reference(reference, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_order_by_order_id(&self, order_id: &str) -> Result<Option<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::fetch_by_order_id(order_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_payout_destination(&self, owner_id: &str) -> Result<Option<PayoutDestination>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let result = withdrawals::fetch_payout_destination(owner_id, &mut conn).await?;
        Ok(result)
    }
}
