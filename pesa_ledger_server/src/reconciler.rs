//! The reconciliation worker.
//!
//! Webhooks are the fast path, not a reliable one. Everything a webhook can do, a sweep here does
//! eventually: polling in-flight payments, polling pending payouts, retiring stale intents and
//! repairing completed-but-uncredited payments. Both paths funnel through [`SettlementApi`], so
//! whoever arrives second hits the idempotency gates and no-ops.

use gateway_tools::{GatewayApi, GatewayApiError, GatewayStatus, NewPayoutRequest};
use log::*;
use pesa_ledger_engine::{
    db_types::{IntentKind, IntentStatus},
    traits::SettlementContext,
    PaymentLedgerDatabase,
    SettlementApi,
    SqliteDatabase,
};
use plg_common::{Tzs, TZS_CURRENCY_CODE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::{config::ServerConfig, errors::ServerError};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub payments_polled: usize,
    pub payments_advanced: usize,
    pub payouts_polled: usize,
    pub payouts_resolved: usize,
    pub intents_expired: usize,
    pub credits_repaired: usize,
}

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run
/// indefinitely.
pub fn start_reconciler(api: SettlementApi<SqliteDatabase>, gateway: GatewayApi, config: ServerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(config.reconciler.sweep_interval_secs));
        info!("🕰️ Reconciliation worker started (every {}s)", config.reconciler.sweep_interval_secs);
        loop {
            timer.tick().await;
            debug!("🕰️ Running reconciliation sweeps");
            let summary = run_sweeps(&api, &gateway, &config).await;
            if summary.payments_advanced + summary.payouts_resolved + summary.intents_expired + summary.credits_repaired
                > 0
            {
                info!(
                    "🕰️ Sweep results: {} payments advanced, {} payouts resolved, {} intents expired, {} credits \
                     repaired",
                    summary.payments_advanced,
                    summary.payouts_resolved,
                    summary.intents_expired,
                    summary.credits_repaired
                );
            }
        }
    })
}

/// Runs all four sweeps once. Individual failures are logged and skipped; one bad reference must
/// never stall the rest of the pass.
pub async fn run_sweeps<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    gateway: &GatewayApi,
    config: &ServerConfig,
) -> SweepSummary {
    let mut summary = SweepSummary::default();
    sweep_pending_payments(api, gateway, config.coin_rate, &mut summary).await;
    sweep_pending_payouts(api, gateway, &mut summary).await;
    sweep_stale_intents(api, config, &mut summary).await;
    sweep_missing_credits(api, config, &mut summary).await;
    summary
}

async fn sweep_pending_payments<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    gateway: &GatewayApi,
    coin_rate: f64,
    summary: &mut SweepSummary,
) {
    let intents = match api.in_flight_intents().await {
        Ok(intents) => intents,
        Err(e) => {
            error!("🕰️ Could not fetch in-flight intents. {e}");
            return;
        },
    };
    for intent in intents {
        summary.payments_polled += 1;
        match reconcile_payment(api, gateway, coin_rate, &intent.reference).await {
            Ok(true) => summary.payments_advanced += 1,
            Ok(false) => {},
            Err(e) => warn!("🕰️ Could not reconcile payment {}. {e}", intent.reference),
        }
    }
}

/// Polls the gateway for one payment and applies whatever it reports, exactly as the webhook
/// handler would. Returns whether anything changed locally.
pub async fn reconcile_payment<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    gateway: &GatewayApi,
    coin_rate: f64,
    reference: &str,
) -> Result<bool, ServerError> {
    let gw_intent = match gateway.poll_intent(reference).await {
        Ok(intent) => intent,
        Err(GatewayApiError::ReferenceNotFound(r)) => {
            // The gateway has no record of this intent. The expiry sweep will retire it.
            debug!("🕰️ Gateway does not know payment {r}. Leaving it to the expiry sweep.");
            return Ok(false);
        },
        Err(e) => return Err(e.into()),
    };
    let changed = match gw_intent.status {
        GatewayStatus::Completed => {
            let fallback = context_from_metadata(reference, Some(gw_intent.amount), &gw_intent.metadata);
            let result = api.process_completed_payment(reference, coin_rate, fallback).await?;
            result.credited()
        },
        GatewayStatus::Reversed => {
            api.process_reversal(reference).await?.map(|r| r.reversed()).unwrap_or_default()
        },
        GatewayStatus::Processing => api.update_intent_status(reference, IntentStatus::Processing).await?.is_some(),
        GatewayStatus::Failed => {
            // A failure after settlement means the gateway took the money back
            let settled = matches!(
                api.db().fetch_intent_by_reference(reference).await?,
                Some(intent) if intent.status == IntentStatus::Completed
            );
            if settled {
                api.process_reversal(reference).await?.map(|r| r.reversed()).unwrap_or_default()
            } else {
                api.update_intent_status(reference, IntentStatus::Failed).await?.is_some()
            }
        },
        GatewayStatus::Expired => api.update_intent_status(reference, IntentStatus::Expired).await?.is_some(),
        GatewayStatus::Pending => false,
    };
    Ok(changed)
}

async fn sweep_pending_payouts<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    gateway: &GatewayApi,
    summary: &mut SweepSummary,
) {
    let references = match api.pending_payout_references().await {
        Ok(refs) => refs,
        Err(e) => {
            error!("🕰️ Could not fetch pending payout references. {e}");
            return;
        },
    };
    for reference in references {
        summary.payouts_polled += 1;
        let success = match gateway.poll_payout(&reference).await {
            Ok(payout) => match payout.status {
                GatewayStatus::Completed => true,
                GatewayStatus::Failed | GatewayStatus::Expired => false,
                _ => continue,
            },
            Err(GatewayApiError::ReferenceNotFound(_)) => {
                // Submission never reached the gateway (client-supplied references make this
                // unambiguous). Fail the payout so the debit is restored.
                warn!("🕰️ Gateway has no payout {reference}. Failing it and restoring the balance.");
                false
            },
            Err(e) => {
                warn!("🕰️ Could not poll payout {reference}. {e}");
                continue;
            },
        };
        match api.process_payout_resolution(&reference, success).await {
            Ok(Some(_)) => summary.payouts_resolved += 1,
            Ok(None) => {},
            Err(e) => warn!("🕰️ Could not resolve payout {reference}. {e}"),
        }
    }
}

async fn sweep_stale_intents<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    config: &ServerConfig,
    summary: &mut SweepSummary,
) {
    match api.expire_stale_intents(config.reconciler.stale_intent_age).await {
        Ok(expired) => {
            summary.intents_expired += expired.len();
            for intent in &expired {
                debug!("🕰️ Expired stale intent {} for {}", intent.reference, intent.user_id);
            }
        },
        Err(e) => error!("🕰️ Could not expire stale intents. {e}"),
    }
}

async fn sweep_missing_credits<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    config: &ServerConfig,
    summary: &mut SweepSummary,
) {
    let gaps = match api.unsettled_completed_intents(config.reconciler.missing_credit_window).await {
        Ok(gaps) => gaps,
        Err(e) => {
            error!("🕰️ Could not fetch unsettled completed intents. {e}");
            return;
        },
    };
    for intent in gaps {
        warn!("🕰️ Payment {} is Completed but was never credited. Repairing.", intent.reference);
        match api.process_completed_payment(&intent.reference, config.coin_rate, None).await {
            Ok(result) if result.credited() => summary.credits_repaired += 1,
            Ok(_) => {},
            Err(e) => error!("🕰️ Could not repair credit for {}. {e}", intent.reference),
        }
    }
}

/// One-shot status probe shortly after an intent is created. Mobile push payments often confirm
/// within seconds, and this closes the gap for clients that poll immediately.
pub fn probe_payment(api: SettlementApi<SqliteDatabase>, gateway: GatewayApi, config: ServerConfig, reference: String) {
    let delay = std::time::Duration::from_secs(config.reconciler.probe_delay_secs);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trace!("🕰️ Probing payment {reference}");
        if let Err(e) = reconcile_payment(&api, &gateway, config.coin_rate, &reference).await {
            debug!("🕰️ Probe for {reference} failed. {e}");
        }
    });
}

/// Submits the payout for a freshly created withdrawal. The debit has already committed; if the
/// gateway rejects the submission outright, the payout is failed on the spot so the debit is
/// restored. Transient errors leave the payout pending for the sweep to sort out.
pub async fn submit_payout<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    gateway: &GatewayApi,
    reference: &str,
    owner_id: &str,
) -> Result<(), ServerError> {
    let destination = api
        .db()
        .fetch_payout_destination(owner_id)
        .await?
        .ok_or_else(|| ServerError::CannotComplete(format!("No payout destination on file for {owner_id}")))?;
    let (net_amount, idempotency_key) = match api.db().fetch_withdrawal_by_reference(reference).await? {
        Some(w) => (w.net_amount, w.idempotency_key),
        None => match api.db().fetch_shop_withdrawal_by_reference(reference).await? {
            Some(w) => (w.net_amount, w.idempotency_key),
            None => return Err(ServerError::NoRecordFound(format!("withdrawal {reference}"))),
        },
    };
    let request = NewPayoutRequest {
        reference: reference.to_string(),
        amount: net_amount,
        currency: TZS_CURRENCY_CODE.to_string(),
        msisdn: destination.msisdn,
        account_name: destination.account_name,
    };
    match gateway.create_payout(&request, &idempotency_key).await {
        Ok(payout) => {
            info!("🕰️ Payout {reference} submitted ({})", payout.status);
            Ok(())
        },
        Err(e) if e.is_transient() => {
            // The payout stays Pending; the sweep will poll and either find it (the request got
            // through) or fail it (it never arrived).
            warn!("🕰️ Payout submission for {reference} hit a transient error, deferring to the sweep. {e}");
            Ok(())
        },
        Err(e) => {
            error!("🕰️ Gateway rejected payout {reference}. Restoring the balance. {e}");
            api.process_payout_resolution(reference, false).await?;
            Err(e.into())
        },
    }
}

/// Rebuilds a settlement context from webhook metadata, for payments whose local intent row is
/// missing. Returns `None` when the metadata is not rich enough to settle safely.
pub fn context_from_event(event: &gateway_tools::GatewayEvent) -> Option<SettlementContext> {
    context_from_metadata(&event.reference, event.amount, &event.metadata)
}

pub fn context_from_metadata(reference: &str, amount: Option<Tzs>, metadata: &Value) -> Option<SettlementContext> {
    let amount = amount?;
    let kind = metadata.get("kind")?.as_str()?.parse::<IntentKind>().ok()?;
    let user_id = metadata.get("user_id")?.as_str()?.to_string();
    let order_id = metadata.get("order_id").and_then(|v| v.as_str()).map(String::from);
    let shop_id = metadata.get("shop_id").and_then(|v| v.as_str()).map(String::from);
    if kind == IntentKind::ShopOrder && order_id.is_none() && shop_id.is_none() {
        return None;
    }
    Some(SettlementContext { reference: reference.to_string(), user_id, amount, kind, order_id, shop_id })
}

#[cfg(test)]
mod test {
    use gateway_tools::GatewayEvent;
    use pesa_ledger_engine::db_types::IntentKind;
    use plg_common::Tzs;

    use super::context_from_event;

    #[test]
    fn context_from_rich_metadata() {
        let body = br#"{
            "event": "payment.completed",
            "data": {
                "reference": "PAY-55",
                "status": "completed",
                "amount": 50000,
                "metadata": {"kind": "shop_order", "user_id": "user-1", "order_id": "ord-9", "shop_id": "shop-4"}
            }
        }"#;
        let event = GatewayEvent::from_body(body).unwrap();
        let ctx = context_from_event(&event).expect("Context should be recoverable");
        assert_eq!(ctx.kind, IntentKind::ShopOrder);
        assert_eq!(ctx.amount, Tzs::from(50_000));
        assert_eq!(ctx.order_id.as_deref(), Some("ord-9"));
        assert_eq!(ctx.shop_id.as_deref(), Some("shop-4"));
    }

    #[test]
    fn no_context_without_amount_or_kind() {
        let body = br#"{"reference": "PAY-56", "status": "completed", "amount": 1000}"#;
        let event = GatewayEvent::from_body(body).unwrap();
        // No kind in the metadata, so settlement cannot be reconstructed
        assert!(context_from_event(&event).is_none());

        let body = br#"{
            "event": "payment.completed",
            "data": {"reference": "PAY-57", "status": "completed",
                     "metadata": {"kind": "coin_topup", "user_id": "user-1"}}
        }"#;
        let event = GatewayEvent::from_body(body).unwrap();
        // No amount on the wire either
        assert!(context_from_event(&event).is_none());
    }
}
