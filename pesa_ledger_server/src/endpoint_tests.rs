//! HTTP-level tests against a real Sqlite backend. The gateway client is never touched: webhooks
//! and wallet reads drive everything through the engine directly.

use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use pesa_ledger_engine::{
    db_types::{IntentChannel, IntentStatus, NewPaymentIntent},
    events::EventProducers,
    test_utils::prepare_env::prepare_test_env,
    traits::AccountManagement,
    SettlementApi,
    SqliteDatabase,
    WalletApi,
};
use plg_common::{Secret, Tzs};

use crate::{
    config::ServerConfig,
    data_objects::{GiftRequest, WebhookAck},
    gateway_routes::GatewayWebhookRoute,
    helpers::calculate_hmac,
    middleware::HmacMiddlewareFactory,
    routes::{health, persist_intent_or_log, GiftRoute, WalletRoute},
};

const WEBHOOK_SECRET: &str = "test-webhook-secret";

async fn test_db(name: &str) -> SqliteDatabase {
    let url = format!("sqlite://../data/test_server_{name}.db");
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn test_config() -> ServerConfig {
    ServerConfig { webhook_secret: Some(Secret::new(WEBHOOK_SECRET.into())), ..Default::default() }
}

macro_rules! test_app {
    ($db:expr) => {{
        let settlement_api = SettlementApi::new($db.clone(), EventProducers::default());
        let wallet_api = WalletApi::new($db.clone());
        let config = test_config();
        let webhook_scope = web::scope("/gateway")
            .wrap(HmacMiddlewareFactory::new("X-Gateway-Signature", config.webhook_secret.clone()))
            .service(GatewayWebhookRoute::<SqliteDatabase>::new());
        let app = App::new()
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(wallet_api))
            .app_data(web::Data::new(config))
            .service(health)
            .service(GiftRoute::<SqliteDatabase>::new())
            .service(WalletRoute::<SqliteDatabase>::new())
            .service(webhook_scope);
        test::init_service(app).await
    }};
}

#[actix_web::test]
async fn health_check() {
    let db = test_db("health").await;
    let service = test_app!(db);
    let req = TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().try_into_bytes().unwrap();
    assert_eq!(body.as_ref(), "👍️\n".as_bytes());
}

#[actix_web::test]
async fn webhook_requires_a_valid_signature() {
    let db = test_db("webhook_hmac").await;
    let service = test_app!(db);
    let body = br#"{"reference": "PAY-sig", "status": "completed", "amount": 1000}"#;

    // No signature header at all
    let req = TestRequest::post().uri("/gateway/webhook").set_payload(body.as_ref()).to_request();
    let res = test::try_call_service(&service, req).await;
    assert!(res.is_err(), "Unsigned webhook should be rejected");

    // A signature under the wrong key
    let bad_sig = calculate_hmac("wrong-secret", body);
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header(("X-Gateway-Signature", bad_sig))
        .set_payload(body.as_ref())
        .to_request();
    let res = test::try_call_service(&service, req).await;
    assert!(res.is_err(), "Webhook with a bad signature should be rejected");
}

#[actix_web::test]
async fn signed_completion_webhook_settles_the_payment() {
    let db = test_db("webhook_settle").await;
    let api = SettlementApi::new(db.clone(), EventProducers::default());
    let intent = NewPaymentIntent::coin_topup(
        "PAY-wh-1".into(),
        "user-wh".into(),
        Tzs::from(10_000),
        IntentChannel::Mobile,
        "idk-wh-1".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");

    let service = test_app!(db);
    let body = br#"{"event": "payment.completed", "data": {"reference": "PAY-wh-1", "status": "completed"}}"#;
    let sig = calculate_hmac(WEBHOOK_SECRET, body);
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header(("X-Gateway-Signature", sig))
        .set_payload(body.as_ref())
        .to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&service, req).await;
    assert!(ack.received);
    assert_eq!(ack.reference, "PAY-wh-1");

    let intent = db.fetch_intent_by_reference("PAY-wh-1").await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
    let wallet = db.fetch_coin_wallet("user-wh").await.unwrap().unwrap();
    assert_eq!(wallet.balance.value(), 1_000);
}

#[actix_web::test]
async fn failed_webhook_after_settlement_claws_the_credit_back() {
    let db = test_db("failed_after_settle").await;
    let api = SettlementApi::new(db.clone(), EventProducers::default());
    let intent = NewPaymentIntent::coin_topup(
        "PAY-wh-2".into(),
        "user-fail".into(),
        Tzs::from(10_000),
        IntentChannel::Mobile,
        "idk-wh-2".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");

    let service = test_app!(db);
    let body = br#"{"event": "payment.completed", "data": {"reference": "PAY-wh-2", "status": "completed"}}"#;
    let sig = calculate_hmac(WEBHOOK_SECRET, body);
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header(("X-Gateway-Signature", sig))
        .set_payload(body.as_ref())
        .to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&service, req).await;
    assert!(ack.received);
    let wallet = db.fetch_coin_wallet("user-fail").await.unwrap().unwrap();
    assert_eq!(wallet.balance.value(), 1_000);

    // The gateway walks the confirmation back; the credited coins must come off again
    let body = br#"{"event": "payment.failed", "data": {"reference": "PAY-wh-2", "status": "failed"}}"#;
    let sig = calculate_hmac(WEBHOOK_SECRET, body);
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header(("X-Gateway-Signature", sig))
        .set_payload(body.as_ref())
        .to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&service, req).await;
    assert!(ack.received);
    let intent = db.fetch_intent_by_reference("PAY-wh-2").await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Reversed);
    let wallet = db.fetch_coin_wallet("user-fail").await.unwrap().unwrap();
    assert_eq!(wallet.balance.value(), 0);
}

#[actix_web::test]
async fn unknown_wallet_reads_as_zero_balance() {
    let db = test_db("wallet_zero").await;
    let service = test_app!(db);
    let req = TestRequest::get().uri("/wallet/nobody-yet").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&service, req).await;
    assert_eq!(body["user_id"], "nobody-yet");
    assert_eq!(body["balance"], 0);
}

#[actix_web::test]
async fn intent_creation_answers_even_when_the_local_write_fails() {
    let db = test_db("persist_failure").await;
    // Make every intent insert fail, as a wedged database would
    sqlx::query(
        "CREATE TRIGGER block_intent_inserts BEFORE INSERT ON payment_intents BEGIN SELECT RAISE(ABORT, 'no room at \
         the inn'); END;",
    )
    .execute(db.pool())
    .await
    .expect("Error installing trigger");
    let api = SettlementApi::new(db.clone(), EventProducers::default());
    let intent = NewPaymentIntent::coin_topup(
        "PAY-wedge-1".into(),
        "user-wedge".into(),
        Tzs::from(5_000),
        IntentChannel::Mobile,
        "idk-wedge-1".into(),
    );
    // The gateway side already exists, so the client still gets the reference and payment URL
    let response = persist_intent_or_log(&api, intent, Some("https://pay.example/wedge".into())).await;
    assert_eq!(response.reference, "PAY-wedge-1");
    assert_eq!(response.status, IntentStatus::Pending);
    assert!(response.created);
    assert_eq!(response.payment_url.as_deref(), Some("https://pay.example/wedge"));
    assert!(db.fetch_intent_by_reference("PAY-wedge-1").await.unwrap().is_none());
}

#[actix_web::test]
async fn self_gift_is_rejected() {
    let db = test_db("self_gift").await;
    let service = test_app!(db);
    let gift = GiftRequest {
        sender_id: "user-a".into(),
        recipient_id: "user-a".into(),
        coins: 100.into(),
        reference: None,
        memo: None,
    };
    let req = TestRequest::post().uri("/gifts").set_json(&gift).to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
