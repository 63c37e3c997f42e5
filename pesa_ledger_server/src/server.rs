use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use gateway_tools::GatewayApi;
use log::*;
use pesa_ledger_engine::{
    events::{EventHandlers, EventProducers},
    SettlementApi,
    SqliteDatabase,
    WalletApi,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    gateway_routes::GatewayWebhookRoute,
    integrations::notifications::create_notification_hooks,
    middleware::HmacMiddlewareFactory,
    reconciler::start_reconciler,
    routes::{
        health,
        pay_order,
        topup,
        CheckPaymentRoute,
        GiftRoute,
        PaymentStatusRoute,
        PayoutDestinationRoute,
        ReconcileRoute,
        ShopWalletHistoryRoute,
        ShopWalletRoute,
        ShopWithdrawalRoute,
        WalletHistoryRoute,
        WalletRoute,
        WithdrawalRoute,
        WithdrawalStatusRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(50, create_notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let gateway = GatewayApi::new(config.gateway.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.reconciler.enabled {
        let api = SettlementApi::new(db.clone(), producers.clone());
        let _handle = start_reconciler(api, gateway.clone(), config.clone());
    }
    let srv = create_server_instance(config, db, producers, gateway)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    gateway: GatewayApi,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let settlement_api = SettlementApi::new(db.clone(), producers.clone());
        let wallet_api = WalletApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("plg::access_log"))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(wallet_api))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(config.clone()));
        // Webhooks get signature verification; everything under /gateway is gateway-facing
        let webhook_scope = web::scope("/gateway")
            .wrap(HmacMiddlewareFactory::new("X-Gateway-Signature", config.webhook_secret.clone()))
            .service(GatewayWebhookRoute::<SqliteDatabase>::new());
        app.service(health)
            .service(topup)
            .service(pay_order)
            .service(PaymentStatusRoute::<SqliteDatabase>::new())
            .service(CheckPaymentRoute::<SqliteDatabase>::new())
            .service(WithdrawalRoute::<SqliteDatabase>::new())
            .service(ShopWithdrawalRoute::<SqliteDatabase>::new())
            .service(WithdrawalStatusRoute::<SqliteDatabase>::new())
            .service(PayoutDestinationRoute::<SqliteDatabase>::new())
            .service(GiftRoute::<SqliteDatabase>::new())
            .service(WalletRoute::<SqliteDatabase>::new())
            .service(WalletHistoryRoute::<SqliteDatabase>::new())
            .service(ShopWalletRoute::<SqliteDatabase>::new())
            .service(ShopWalletHistoryRoute::<SqliteDatabase>::new())
            .service(ReconcileRoute::<SqliteDatabase>::new())
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    info!("🚀️ Server bound to {host}:{port}");
    Ok(srv)
}
