use chrono::Duration;
use log::*;
use plg_common::{Coins, Tzs};

use crate::{
    db_types::{
        IntentKind,
        IntentStatus,
        NewPaymentIntent,
        NewShopWithdrawal,
        NewWithdrawal,
        PaymentIntent,
        ShopWithdrawal,
        Withdrawal,
    },
    events::{
        EventProducers,
        OrderSettledEvent,
        PaymentReversal,
        PaymentReversedEvent,
        PayoutResolvedEvent,
        TopupSettledEvent,
    },
    ple_api::{
        errors::SettlementError,
        ledger_objects::{FeeSchedule, SettlementResult},
    },
    traits::{GiftTransfer, PaymentLedgerDatabase, PayoutResolution, SettlementContext},
};

/// The primary API for the settlement, reversal, withdrawal and gift flows.
///
/// Both the webhook path and the reconciliation sweeps funnel through this one API, which is what
/// makes them idempotent with respect to each other: whoever loses a race on a reference performs
/// a no-op existence check inside the backend and reports `credited: false`.
///
/// Events fire only after the corresponding ledger mutation has committed, and only for the
/// winning call, so side effects never double-execute.
#[derive(Clone)]
pub struct SettlementApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> SettlementApi<B>
where B: PaymentLedgerDatabase
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Stores a freshly created intent. A duplicate reference returns the existing row.
    pub async fn insert_intent(&self, intent: NewPaymentIntent) -> Result<(PaymentIntent, bool), SettlementError> {
        let result = self.db.insert_intent(intent).await?;
        Ok(result)
    }

    /// Status-only update, for gateway signals that carry no side effects. Returns `None` when
    /// the signal was stale or the reference unknown.
    pub async fn update_intent_status(
        &self,
        reference: &str,
        status: IntentStatus,
    ) -> Result<Option<PaymentIntent>, SettlementError> {
        let updated = self.db.update_intent_status(reference, status).await?;
        Ok(updated)
    }

    /// The settlement entry point, shared by webhooks, the reconciliation sweeps and manual
    /// triggers. The stored intent is preferred; `fallback` reconstructs the settlement from
    /// payload metadata when the local row is missing, since the gateway's view is authoritative
    /// over a lost row.
    pub async fn process_completed_payment(
        &self,
        reference: &str,
        coin_rate: f64,
        fallback: Option<SettlementContext>,
    ) -> Result<SettlementResult, SettlementError> {
        let intent = self.db.fetch_intent_by_reference(reference).await?;
        let ctx = match &intent {
            Some(i) => SettlementContext::from(i),
            None => {
                warn!("💰️ No intent row for {reference}. Settling from payload metadata.");
                fallback.ok_or_else(|| SettlementError::UnknownReference(reference.to_string()))?
            },
        };
        if intent.is_some() {
            // The status row moves before any side effect, so a crash after the ledger mutation
            // cannot re-trigger against a stale intent. A stale transition here is normal: it
            // means the intent is already Completed and this is a replay or reconciliation pass.
            let _ = self.db.update_intent_status(reference, IntentStatus::Completed).await?;
        }
        match ctx.kind {
            IntentKind::CoinTopup => {
                let coins = Coins::from_payment(ctx.amount, coin_rate);
                let settlement = self.db.settle_coin_topup(&ctx, coins).await?;
                if settlement.credited {
                    debug!("💰️ Top-up {reference} settled. Firing notifications.");
                    for producer in &self.producers.topup_settled_producer {
                        producer.publish_event(TopupSettledEvent::new(settlement.clone())).await;
                    }
                }
                Ok(SettlementResult::Topup(settlement))
            },
            IntentKind::ShopOrder => {
                let settlement = self.db.settle_shop_order(&ctx).await?;
                if settlement.credited {
                    debug!("💰️ Order payment {reference} settled. Firing notifications.");
                    for producer in &self.producers.order_settled_producer {
                        producer.publish_event(OrderSettledEvent::new(settlement.clone())).await;
                    }
                }
                Ok(SettlementResult::Order(settlement))
            },
        }
    }

    /// Claws back a previously settled payment. `None` means there was nothing to reverse: the
    /// reference is unknown locally, or the intent never reached `Completed`.
    pub async fn process_reversal(&self, reference: &str) -> Result<Option<PaymentReversal>, SettlementError> {
        let Some(intent) = self.db.fetch_intent_by_reference(reference).await? else {
            warn!("💰️ Reversal signal for unknown reference {reference}. Ignoring.");
            return Ok(None);
        };
        let ctx = SettlementContext::from(&intent);
        let updated = self.db.update_intent_status(reference, IntentStatus::Reversed).await?;
        if updated.is_none() && intent.status != IntentStatus::Reversed {
            debug!("💰️ Reversal signal for {reference} in status {}. Nothing was credited.", intent.status);
            return Ok(None);
        }
        match ctx.kind {
            IntentKind::CoinTopup => {
                let reversal = self.db.reverse_coin_topup(&ctx).await?;
                if reversal.reversed {
                    for producer in &self.producers.payment_reversed_producer {
                        producer.publish_event(PaymentReversedEvent::topup(reversal.clone())).await;
                    }
                }
                Ok(Some(PaymentReversal::Topup(reversal)))
            },
            IntentKind::ShopOrder => {
                let reversal = self.db.reverse_shop_order(&ctx).await?;
                if reversal.reversed {
                    for producer in &self.producers.payment_reversed_producer {
                        producer.publish_event(PaymentReversedEvent::order(reversal.clone())).await;
                    }
                }
                Ok(Some(PaymentReversal::Order(reversal)))
            },
        }
    }

    /// Resolves a pending payout to completed or failed, restoring the source balance on
    /// failure. `None` means the payout was already resolved.
    pub async fn process_payout_resolution(
        &self,
        reference: &str,
        success: bool,
    ) -> Result<Option<PayoutResolution>, SettlementError> {
        let resolution = self.db.resolve_payout(reference, success).await?;
        if let Some(res) = &resolution {
            for producer in &self.producers.payout_resolved_producer {
                producer.publish_event(PayoutResolvedEvent::new(res.clone())).await;
            }
        }
        Ok(resolution)
    }

    /// Validates and creates a user coin withdrawal. The wallet debit commits here, before any
    /// gateway call; the caller submits the payout afterwards with the stored idempotency key.
    pub async fn create_withdrawal(
        &self,
        user_id: &str,
        amount: Tzs,
        coin_rate: f64,
        fees: &FeeSchedule,
        reference: String,
        idempotency_key: String,
    ) -> Result<Withdrawal, SettlementError> {
        if amount < fees.minimum {
            return Err(SettlementError::BelowMinimum(fees.minimum));
        }
        let destination = self
            .db
            .fetch_payout_destination(user_id)
            .await?
            .ok_or_else(|| SettlementError::NoPayoutDestination(user_id.to_string()))?;
        let fee_amount = fees.fee_for(amount);
        let net_amount = amount - fee_amount;
        let coins = Coins::from_payment(amount, coin_rate);
        let withdrawal = self
            .db
            .create_withdrawal(NewWithdrawal {
                reference,
                user_id: user_id.to_string(),
                coins,
                amount,
                fee_amount,
                net_amount,
                msisdn: destination.msisdn,
                idempotency_key,
            })
            .await?;
        Ok(withdrawal)
    }

    /// The shop-settlement variant of [`create_withdrawal`](Self::create_withdrawal).
    pub async fn create_shop_withdrawal(
        &self,
        shop_id: &str,
        amount: Tzs,
        fees: &FeeSchedule,
        reference: String,
        idempotency_key: String,
    ) -> Result<ShopWithdrawal, SettlementError> {
        if amount < fees.minimum {
            return Err(SettlementError::BelowMinimum(fees.minimum));
        }
        let destination = self
            .db
            .fetch_payout_destination(shop_id)
            .await?
            .ok_or_else(|| SettlementError::NoPayoutDestination(shop_id.to_string()))?;
        let fee_amount = fees.fee_for(amount);
        let net_amount = amount - fee_amount;
        let withdrawal = self
            .db
            .create_shop_withdrawal(NewShopWithdrawal {
                reference,
                shop_id: shop_id.to_string(),
                amount,
                fee_amount,
                net_amount,
                msisdn: destination.msisdn,
                idempotency_key,
            })
            .await?;
        Ok(withdrawal)
    }

    /// Moves coins between two users' wallets, atomically and idempotently on the reference.
    pub async fn transfer_gift(
        &self,
        sender_id: &str,
        recipient_id: &str,
        coins: Coins,
        reference: &str,
        memo: Option<String>,
    ) -> Result<GiftTransfer, SettlementError> {
        let transfer = self.db.transfer_gift(sender_id, recipient_id, coins, reference, memo).await?;
        Ok(transfer)
    }

    pub async fn expire_stale_intents(&self, max_age: Duration) -> Result<Vec<PaymentIntent>, SettlementError> {
        let expired = self.db.expire_stale_intents(max_age).await?;
        Ok(expired)
    }

    /// Intents that still need an answer from the gateway: everything in `Pending` or
    /// `Processing`, oldest first.
    pub async fn in_flight_intents(&self) -> Result<Vec<PaymentIntent>, SettlementError> {
        let mut result = self.db.fetch_intents_in_status(IntentStatus::Pending).await?;
        result.extend(self.db.fetch_intents_in_status(IntentStatus::Processing).await?);
        Ok(result)
    }

    pub async fn pending_payout_references(&self) -> Result<Vec<String>, SettlementError> {
        let refs = self.db.fetch_pending_payout_references().await?;
        Ok(refs)
    }

    pub async fn unsettled_completed_intents(&self, window: Duration) -> Result<Vec<PaymentIntent>, SettlementError> {
        let intents = self.db.fetch_unsettled_completed_intents(window).await?;
        Ok(intents)
    }
}
