//----------------------------------------------   Webhooks  ----------------------------------------------------

use actix_web::{web, HttpRequest, HttpResponse};
use gateway_tools::{GatewayEvent, GatewayStatus};
use log::*;
use pesa_ledger_engine::{db_types::IntentStatus, PaymentLedgerDatabase, SettlementApi};

use crate::{config::ServerConfig, data_objects::WebhookAck, errors::ServerError, reconciler::context_from_event, route};

route!(gateway_webhook => Post "/webhook" impl PaymentLedgerDatabase);
/// The gateway webhook endpoint. The HMAC middleware has already verified the body signature by
/// the time this handler runs.
///
/// Events referencing nothing we know about come back as 4xx with zero ledger mutation. Replayed
/// events land on the idempotency gates in the engine and come back as 200 no-ops, so the gateway
/// stops retrying them.
pub async fn gateway_webhook<B: PaymentLedgerDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<SettlementApi<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    trace!("📬️ Received webhook request: {}", req.uri());
    let event = GatewayEvent::from_body(&body).map_err(|e| {
        warn!("📬️ Could not parse webhook body. {e}");
        ServerError::CouldNotDeserializePayload
    })?;
    info!("📬️ Webhook {} for {} ({})", event.event_type, event.reference, event.status);
    let ack = if event.is_payout() {
        handle_payout_event(&api, &event).await?
    } else {
        handle_payment_event(&api, config.coin_rate, &event).await?
    };
    Ok(HttpResponse::Ok().json(ack))
}

async fn handle_payment_event<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    coin_rate: f64,
    event: &GatewayEvent,
) -> Result<WebhookAck, ServerError> {
    let reference = event.reference.as_str();
    let note = match event.status {
        GatewayStatus::Completed => {
            let fallback = context_from_event(event);
            let result = api.process_completed_payment(reference, coin_rate, fallback).await?;
            if result.credited() {
                "Payment settled".to_string()
            } else {
                "Payment was already settled".to_string()
            }
        },
        GatewayStatus::Reversed => match api.process_reversal(reference).await? {
            Some(reversal) if reversal.reversed() => "Payment reversed".to_string(),
            Some(_) => "Reversal was already applied".to_string(),
            None => {
                require_known_intent(api, reference).await?;
                "Nothing to reverse".to_string()
            },
        },
        GatewayStatus::Processing => advance_status(api, reference, IntentStatus::Processing).await?,
        GatewayStatus::Failed => fail_or_reverse(api, reference).await?,
        GatewayStatus::Expired => advance_status(api, reference, IntentStatus::Expired).await?,
        GatewayStatus::Pending => {
            require_known_intent(api, reference).await?;
            "Still pending, nothing to do".to_string()
        },
    };
    Ok(WebhookAck::handled(&event.event_type, reference, note))
}

async fn handle_payout_event<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    event: &GatewayEvent,
) -> Result<WebhookAck, ServerError> {
    let reference = event.reference.as_str();
    let success = match event.status {
        GatewayStatus::Completed => true,
        GatewayStatus::Failed | GatewayStatus::Expired => false,
        GatewayStatus::Pending | GatewayStatus::Processing => {
            return Ok(WebhookAck::handled(&event.event_type, reference, "Payout still in flight"));
        },
        GatewayStatus::Reversed => {
            // Never seen in practice; flag it loudly rather than guessing at semantics
            error!("📬️ Received a payout reversal webhook for {reference}. Manual intervention required.");
            return Ok(WebhookAck::ignored(&event.event_type, reference, "Payout reversals are not handled"));
        },
    };
    let note = match api.process_payout_resolution(reference, success).await? {
        Some(resolution) => {
            info!("📬️ Payout {reference} resolved to {} (restored: {})", resolution.status, resolution.restored);
            format!("Payout {}", resolution.status)
        },
        None => "Payout was already resolved".to_string(),
    };
    Ok(WebhookAck::handled(&event.event_type, reference, note))
}

/// A `failed` signal for a payment we already settled means the gateway clawed the money back
/// after confirming it, so the local credit has to come back too.
async fn fail_or_reverse<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    reference: &str,
) -> Result<String, ServerError> {
    let settled = matches!(
        api.db().fetch_intent_by_reference(reference).await?,
        Some(intent) if intent.status == IntentStatus::Completed
    );
    if settled {
        let note = match api.process_reversal(reference).await? {
            Some(reversal) if reversal.reversed() => "Settled payment failed, credit reversed".to_string(),
            _ => "Reversal was already applied".to_string(),
        };
        return Ok(note);
    }
    advance_status(api, reference, IntentStatus::Failed).await
}

async fn advance_status<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    reference: &str,
    status: IntentStatus,
) -> Result<String, ServerError> {
    match api.update_intent_status(reference, status).await? {
        Some(intent) => Ok(format!("Intent moved to {}", intent.status)),
        None => {
            require_known_intent(api, reference).await?;
            Ok("Stale signal ignored".to_string())
        },
    }
}

/// A status signal that lands on no local row could still be a payment we failed to persist at
/// creation; only `completed` carries enough context to act on it, so everything else is a 404.
async fn require_known_intent<B: PaymentLedgerDatabase>(
    api: &SettlementApi<B>,
    reference: &str,
) -> Result<(), ServerError> {
    if api.db().fetch_intent_by_reference(reference).await?.is_none() {
        return Err(ServerError::NoRecordFound(format!("payment {reference}")));
    }
    Ok(())
}
