//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Long, non-cpu-bound operations (gateway calls, database operations) are all expressed as async
//! functions so worker threads keep serving other requests while they wait.

use actix_web::{get, post, web, HttpResponse, Responder};
use gateway_tools::{new_idempotency_key, CardDetails, GatewayApi, NewIntentRequest};
use log::*;
use pesa_ledger_engine::{
    db_types::{IntentStatus, NewPaymentIntent, OrderStatus, PaymentIntent},
    helpers::new_reference,
    traits::AccountManagement,
    PaymentLedgerDatabase,
    SettlementApi,
    SqliteDatabase,
    WalletApi,
};
use plg_common::{Tzs, TZS_CURRENCY_CODE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    config::ServerConfig,
    data_objects::{
        GiftRequest,
        OrderPaymentRequest,
        PaymentIntentResponse,
        PayoutDestinationRequest,
        ShopWithdrawalRequest,
        TopUpRequest,
        WithdrawalRequest,
    },
    errors::ServerError,
    reconciler::{self, probe_payment},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Payments  ----------------------------------------------------

/// Starts a coin top-up.
///
/// The gateway is asked for a new collection intent first; its reference becomes the local
/// intent's reference. If the client supplied an idempotency key that matches an existing intent,
/// that intent is returned instead and nothing touches the gateway.
///
/// Concrete over [`SqliteDatabase`] because the post-creation status probe runs on a spawned task.
#[post("/topup")]
pub async fn topup(
    body: web::Json<TopUpRequest>,
    api: web::Data<SettlementApi<SqliteDatabase>>,
    gateway: web::Data<GatewayApi>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST topup of {} for {}", request.amount, request.user_id);
    if !request.amount.is_positive() {
        return Err(ServerError::InvalidRequestBody("The top-up amount must be positive".into()));
    }
    let idempotency_key = request.idempotency_key.clone().unwrap_or_else(new_idempotency_key);
    if let Some(existing) = api.db().fetch_intent_by_idempotency_key(&idempotency_key).await? {
        info!("💻️ Top-up replay for key {idempotency_key} returns intent {}", existing.reference);
        return Ok(HttpResponse::Ok().json(intent_response(existing, None, false)));
    }
    let metadata = json!({ "kind": "coin_topup", "user_id": request.user_id });
    let gw_intent = create_gateway_intent(
        &gateway,
        request.amount,
        request.msisdn.clone(),
        request.card.clone(),
        metadata,
        &idempotency_key,
    )
    .await?;
    let intent = NewPaymentIntent::coin_topup(
        gw_intent.reference.clone(),
        request.user_id,
        request.amount,
        request.channel,
        idempotency_key,
    );
    let response = persist_intent_or_log(&api, intent, gw_intent.payment_url).await;
    probe_payment(
        api.get_ref().clone(),
        gateway.get_ref().clone(),
        config.get_ref().clone(),
        response.reference.clone(),
    );
    Ok(HttpResponse::Ok().json(response))
}

/// Starts payment for an existing shop order. The amount always comes off the order row.
#[post("/orders/pay")]
pub async fn pay_order(
    body: web::Json<OrderPaymentRequest>,
    api: web::Data<SettlementApi<SqliteDatabase>>,
    gateway: web::Data<GatewayApi>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST order payment for {} by {}", request.order_id, request.buyer_id);
    let order = api
        .db()
        .fetch_order_by_order_id(&request.order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("order {}", request.order_id)))?;
    if order.status != OrderStatus::PendingPayment {
        return Err(ServerError::CannotComplete(format!(
            "Order {} is in status {} and cannot be paid",
            order.order_id, order.status
        )));
    }
    let idempotency_key = request.idempotency_key.clone().unwrap_or_else(new_idempotency_key);
    if let Some(existing) = api.db().fetch_intent_by_idempotency_key(&idempotency_key).await? {
        info!("💻️ Order payment replay for key {idempotency_key} returns intent {}", existing.reference);
        return Ok(HttpResponse::Ok().json(intent_response(existing, None, false)));
    }
    let metadata = json!({
        "kind": "shop_order",
        "user_id": request.buyer_id,
        "order_id": order.order_id,
        "shop_id": order.shop_id,
    });
    let gw_intent = create_gateway_intent(
        &gateway,
        order.total_amount,
        request.msisdn.clone(),
        request.card.clone(),
        metadata,
        &idempotency_key,
    )
    .await?;
    let intent = NewPaymentIntent::shop_order(
        gw_intent.reference.clone(),
        request.buyer_id,
        order.total_amount,
        request.channel,
        order.order_id,
        idempotency_key,
    );
    let response = persist_intent_or_log(&api, intent, gw_intent.payment_url).await;
    probe_payment(
        api.get_ref().clone(),
        gateway.get_ref().clone(),
        config.get_ref().clone(),
        response.reference.clone(),
    );
    Ok(HttpResponse::Ok().json(response))
}

/// Stores the local intent row for a freshly created gateway intent.
///
/// The money side already exists at the gateway, so a local write failure must not fail the
/// request. The client still gets the gateway's reference and payment URL, and the
/// missing-credit sweep recreates the row from webhook metadata once the payment confirms.
pub async fn persist_intent_or_log(
    api: &SettlementApi<SqliteDatabase>,
    intent: NewPaymentIntent,
    payment_url: Option<String>,
) -> PaymentIntentResponse {
    match api.insert_intent(intent.clone()).await {
        Ok((stored, created)) => intent_response(stored, payment_url, created),
        Err(e) => {
            error!("💻️ Could not persist intent {} locally. Returning gateway data anyway. {e}", intent.reference);
            PaymentIntentResponse {
                reference: intent.reference,
                status: IntentStatus::Pending,
                amount: intent.amount,
                currency: intent.currency,
                payment_url,
                created: true,
            }
        },
    }
}

async fn create_gateway_intent(
    gateway: &GatewayApi,
    amount: Tzs,
    msisdn: Option<String>,
    card: Option<CardDetails>,
    metadata: Value,
    idempotency_key: &str,
) -> Result<gateway_tools::GatewayIntent, ServerError> {
    let gw_request =
        NewIntentRequest { amount, currency: TZS_CURRENCY_CODE.to_string(), msisdn, card, metadata };
    let intent = gateway.create_intent(&gw_request, idempotency_key).await?;
    Ok(intent)
}

fn intent_response(intent: PaymentIntent, payment_url: Option<String>, created: bool) -> PaymentIntentResponse {
    PaymentIntentResponse {
        reference: intent.reference,
        status: intent.status,
        amount: intent.amount,
        currency: intent.currency,
        payment_url,
        created,
    }
}

route!(payment_status => Get "/payments/{reference}" impl AccountManagement);
pub async fn payment_status<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    debug!("💻️ GET payment status for {reference}");
    let intent = api
        .intent_by_reference(&reference)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("payment {reference}")))?;
    Ok(HttpResponse::Ok().json(intent))
}

route!(check_payment => Post "/payments/{reference}/check" impl PaymentLedgerDatabase);
/// Forces a single reconciliation of one payment against the gateway: poll, then act on whatever
/// status comes back. Exactly what the sweeps do, but on demand.
pub async fn check_payment<B: PaymentLedgerDatabase>(
    path: web::Path<String>,
    api: web::Data<SettlementApi<B>>,
    gateway: web::Data<GatewayApi>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    debug!("💻️ POST check payment {reference}");
    reconciler::reconcile_payment(&api, &gateway, config.coin_rate, &reference).await?;
    let intent = api
        .db()
        .fetch_intent_by_reference(&reference)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("payment {reference}")))?;
    Ok(HttpResponse::Ok().json(intent))
}

//----------------------------------------------   Withdrawals  ----------------------------------------------------

route!(withdrawal => Post "/withdrawals" impl PaymentLedgerDatabase);
/// Creates a user coin withdrawal. The wallet debit commits before the payout is submitted to
/// the gateway; if submission fails outright, the debit is restored immediately.
pub async fn withdrawal<B: PaymentLedgerDatabase>(
    body: web::Json<WithdrawalRequest>,
    api: web::Data<SettlementApi<B>>,
    gateway: web::Data<GatewayApi>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST withdrawal of {} for {}", request.amount, request.user_id);
    let reference = new_reference("WD");
    let idempotency_key = new_idempotency_key();
    let withdrawal = api
        .create_withdrawal(
            &request.user_id,
            request.amount,
            config.coin_rate,
            &config.fees,
            reference.clone(),
            idempotency_key,
        )
        .await?;
    reconciler::submit_payout(&api, &gateway, &reference, &request.user_id).await?;
    Ok(HttpResponse::Ok().json(withdrawal))
}

route!(shop_withdrawal => Post "/shop_withdrawals" impl PaymentLedgerDatabase);
pub async fn shop_withdrawal<B: PaymentLedgerDatabase>(
    body: web::Json<ShopWithdrawalRequest>,
    api: web::Data<SettlementApi<B>>,
    gateway: web::Data<GatewayApi>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST shop withdrawal of {} for {}", request.amount, request.shop_id);
    let reference = new_reference("WD");
    let idempotency_key = new_idempotency_key();
    let withdrawal = api
        .create_shop_withdrawal(&request.shop_id, request.amount, &config.fees, reference.clone(), idempotency_key)
        .await?;
    reconciler::submit_payout(&api, &gateway, &reference, &request.shop_id).await?;
    Ok(HttpResponse::Ok().json(withdrawal))
}

route!(withdrawal_status => Get "/withdrawals/{reference}" impl AccountManagement);
pub async fn withdrawal_status<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    debug!("💻️ GET withdrawal status for {reference}");
    // The reference namespace is shared, so check both tables
    if let Some(withdrawal) = api.withdrawal_by_reference(&reference).await? {
        return Ok(HttpResponse::Ok().json(withdrawal));
    }
    if let Some(withdrawal) = api.shop_withdrawal_by_reference(&reference).await? {
        return Ok(HttpResponse::Ok().json(withdrawal));
    }
    Err(ServerError::NoRecordFound(format!("withdrawal {reference}")))
}

route!(payout_destination => Post "/payout_destinations" impl PaymentLedgerDatabase);
pub async fn payout_destination<B: PaymentLedgerDatabase>(
    body: web::Json<PayoutDestinationRequest>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST payout destination for {}", request.owner_id);
    let destination = api
        .db()
        .upsert_payout_destination(&request.owner_id, &request.msisdn, &request.account_name)
        .await
        .map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(destination))
}

//----------------------------------------------   Gifts  ----------------------------------------------------

route!(gift => Post "/gifts" impl PaymentLedgerDatabase);
pub async fn gift<B: PaymentLedgerDatabase>(
    body: web::Json<GiftRequest>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST gift of {} coins from {} to {}", request.coins, request.sender_id, request.recipient_id);
    if request.sender_id == request.recipient_id {
        return Err(ServerError::InvalidRequestBody("Cannot gift coins to yourself".into()));
    }
    if request.coins.value() <= 0 {
        return Err(ServerError::InvalidRequestBody("The gift amount must be positive".into()));
    }
    let reference = request.reference.unwrap_or_else(|| new_reference("GIFT"));
    let transfer =
        api.transfer_gift(&request.sender_id, &request.recipient_id, request.coins, &reference, request.memo).await?;
    Ok(HttpResponse::Ok().json(transfer))
}

//----------------------------------------------   Wallets  ----------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

const DEFAULT_HISTORY_LIMIT: i64 = 50;

route!(wallet => Get "/wallet/{user_id}" impl AccountManagement);
/// A user's coin balance. Users with no ledger activity have a zero balance, not a missing one.
pub async fn wallet<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET wallet for {user_id}");
    match api.coin_wallet(&user_id).await? {
        Some(wallet) => Ok(HttpResponse::Ok().json(wallet)),
        None => Ok(HttpResponse::Ok().json(json!({ "user_id": user_id, "balance": 0 }))),
    }
}

route!(wallet_history => Get "/wallet/{user_id}/history" impl AccountManagement);
pub async fn wallet_history<B: AccountManagement>(
    path: web::Path<String>,
    params: web::Query<HistoryParams>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    debug!("💻️ GET wallet history for {user_id} (limit {limit})");
    let history = api.coin_history(&user_id, limit).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(shop_wallet => Get "/shop_wallet/{shop_id}" impl AccountManagement);
pub async fn shop_wallet<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let shop_id = path.into_inner();
    debug!("💻️ GET shop wallet for {shop_id}");
    match api.shop_wallet(&shop_id).await? {
        Some(wallet) => Ok(HttpResponse::Ok().json(wallet)),
        None => Ok(HttpResponse::Ok().json(json!({ "shop_id": shop_id, "balance": 0 }))),
    }
}

route!(shop_wallet_history => Get "/shop_wallet/{shop_id}/history" impl AccountManagement);
pub async fn shop_wallet_history<B: AccountManagement>(
    path: web::Path<String>,
    params: web::Query<HistoryParams>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let shop_id = path.into_inner();
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    debug!("💻️ GET shop wallet history for {shop_id} (limit {limit})");
    let history = api.shop_history(&shop_id, limit).await?;
    Ok(HttpResponse::Ok().json(history))
}

//----------------------------------------------   Reconciliation  ----------------------------------------------------

route!(reconcile => Post "/reconcile" impl PaymentLedgerDatabase);
/// Runs one full reconciliation pass immediately, outside the normal sweep schedule.
pub async fn reconcile<B: PaymentLedgerDatabase>(
    api: web::Data<SettlementApi<B>>,
    gateway: web::Data<GatewayApi>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ POST reconcile: running all sweeps on demand");
    let summary = reconciler::run_sweeps(&api, &gateway, config.get_ref()).await;
    Ok(HttpResponse::Ok().json(summary))
}
