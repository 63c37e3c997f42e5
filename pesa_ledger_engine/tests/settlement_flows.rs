//! End-to-end settlement flows against a real Sqlite database.
//!
//! Run with `cargo test --features test_features`.

use chrono::Duration;
use log::*;
use pesa_ledger_engine::{
    db_types::{IntentChannel, IntentKind, IntentStatus, NewPaymentIntent, OrderStatus},
    events::{EventProducers, PaymentReversal},
    test_utils::{
        prepare_env::prepare_test_env,
        seed::{seed_order, units_sold},
    },
    AccountManagement,
    SettlementApi,
    SettlementContext,
    SettlementResult,
    SqliteDatabase,
};
use plg_common::{Coins, Tzs};

const COIN_RATE: f64 = 0.1;

async fn new_api(name: &str) -> SettlementApi<SqliteDatabase> {
    let url = format!("sqlite://../data/test_{name}.db");
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    SettlementApi::new(db, EventProducers::default())
}

#[tokio::test]
async fn topup_settles_once_and_replays_are_noops() {
    let api = new_api("topup_settlement").await;
    let intent = NewPaymentIntent::coin_topup(
        "PAY-topup-1".into(),
        "user-1".into(),
        Tzs::from(10_000),
        IntentChannel::Mobile,
        "idk-topup-1".into(),
    );
    let (stored, created) = api.insert_intent(intent.clone()).await.expect("Error storing intent");
    assert!(created);
    assert_eq!(stored.status, IntentStatus::Pending);

    // Duplicate reference returns the existing row
    let (replayed, created) = api.insert_intent(intent).await.expect("Error replaying intent");
    assert!(!created);
    assert_eq!(replayed.id, stored.id);

    let result = api.process_completed_payment("PAY-topup-1", COIN_RATE, None).await.expect("Error settling");
    let SettlementResult::Topup(settlement) = result else { panic!("Expected a top-up settlement") };
    assert!(settlement.credited);
    assert_eq!(settlement.coins, Coins::from(1_000));
    assert_eq!(settlement.balance, Coins::from(1_000));

    // A second webhook for the same reference must not credit again
    let result = api.process_completed_payment("PAY-topup-1", COIN_RATE, None).await.expect("Error on replay");
    let SettlementResult::Topup(settlement) = result else { panic!("Expected a top-up settlement") };
    assert!(!settlement.credited);
    assert_eq!(settlement.balance, Coins::from(1_000));

    let intent = api.db().fetch_intent_by_reference("PAY-topup-1").await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
}

#[tokio::test]
async fn concurrent_settlement_credits_exactly_once() {
    let api = new_api("concurrent_settlement").await;
    let intent = NewPaymentIntent::coin_topup(
        "PAY-race-1".into(),
        "user-9".into(),
        Tzs::from(25_000),
        IntentChannel::Card,
        "idk-race-1".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");

    // Webhook and reconciliation sweep racing on the same reference
    let left = api.clone();
    let right = api.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { left.process_completed_payment("PAY-race-1", COIN_RATE, None).await }),
        tokio::spawn(async move { right.process_completed_payment("PAY-race-1", COIN_RATE, None).await }),
    );
    let a = a.unwrap().expect("Left settlement failed");
    let b = b.unwrap().expect("Right settlement failed");
    let credits = [&a, &b].iter().filter(|r| r.credited()).count();
    assert_eq!(credits, 1, "exactly one of the racing calls may credit");

    let wallet = api.db().fetch_coin_wallet("user-9").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(2_500));
}

#[tokio::test]
async fn shop_order_settlement_credits_shop_and_updates_order() {
    let api = new_api("order_settlement").await;
    seed_order(api.db(), "ord-100", "shop-1", "user-2", Tzs::from(50_000), &[
        ("prod-a", 2, Tzs::from(15_000)),
        ("prod-b", 1, Tzs::from(20_000)),
    ])
    .await;
    let intent = NewPaymentIntent::shop_order(
        "PAY-order-1".into(),
        "user-2".into(),
        Tzs::from(50_000),
        IntentChannel::Mobile,
        "ord-100".into(),
        "idk-order-1".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");

    let result = api.process_completed_payment("PAY-order-1", COIN_RATE, None).await.expect("Error settling");
    let SettlementResult::Order(settlement) = result else { panic!("Expected an order settlement") };
    assert!(settlement.credited);
    assert_eq!(settlement.shop_id, "shop-1");
    assert_eq!(settlement.amount, Tzs::from(50_000));
    assert_eq!(settlement.balance, Tzs::from(50_000));
    let order = settlement.order.expect("Order should be attached");
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(units_sold(api.db(), "prod-a").await, 2);
    assert_eq!(units_sold(api.db(), "prod-b").await, 1);

    // Replay leaves the shop balance and sales counters alone
    let result = api.process_completed_payment("PAY-order-1", COIN_RATE, None).await.expect("Error on replay");
    assert!(!result.credited());
    let wallet = api.db().fetch_shop_wallet("shop-1").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Tzs::from(50_000));
    assert_eq!(units_sold(api.db(), "prod-a").await, 2);
}

#[tokio::test]
async fn settlement_without_local_intent_uses_payload_context() {
    let api = new_api("lost_intent").await;
    // No intent row exists; the webhook metadata is all we have
    let ctx = SettlementContext {
        reference: "PAY-lost-1".into(),
        user_id: "user-7".into(),
        amount: Tzs::from(5_000),
        kind: IntentKind::CoinTopup,
        order_id: None,
        shop_id: None,
    };
    let result =
        api.process_completed_payment("PAY-lost-1", COIN_RATE, Some(ctx)).await.expect("Error settling from payload");
    assert!(result.credited());
    let wallet = api.db().fetch_coin_wallet("user-7").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(500));

    // Without a fallback context an unknown reference is an error
    let err = api.process_completed_payment("PAY-unknown", COIN_RATE, None).await.unwrap_err();
    info!("Unknown reference rejected as expected: {err}");
}

#[tokio::test]
async fn topup_reversal_claws_back_credited_coins_once() {
    let api = new_api("topup_reversal").await;
    let intent = NewPaymentIntent::coin_topup(
        "PAY-rev-1".into(),
        "user-3".into(),
        Tzs::from(10_000),
        IntentChannel::Mobile,
        "idk-rev-1".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");
    api.process_completed_payment("PAY-rev-1", COIN_RATE, None).await.expect("Error settling");

    let reversal = api.process_reversal("PAY-rev-1").await.expect("Error reversing").expect("Reversal expected");
    assert!(reversal.reversed());
    let wallet = api.db().fetch_coin_wallet("user-3").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(0));
    let intent = api.db().fetch_intent_by_reference("PAY-rev-1").await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Reversed);

    // A replayed chargeback webhook must not debit a second time
    let replay = api.process_reversal("PAY-rev-1").await.expect("Error on replay").expect("Reversal expected");
    assert!(!replay.reversed());
    let wallet = api.db().fetch_coin_wallet("user-3").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(0));
}

#[tokio::test]
async fn reversal_before_settlement_is_a_noop() {
    let api = new_api("early_reversal").await;
    let intent = NewPaymentIntent::coin_topup(
        "PAY-rev-2".into(),
        "user-4".into(),
        Tzs::from(8_000),
        IntentChannel::Mobile,
        "idk-rev-2".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");

    // Nothing was ever credited, so there is nothing to claw back
    let reversal = api.process_reversal("PAY-rev-2").await.expect("Error reversing");
    assert!(reversal.is_none());
    assert!(api.db().fetch_coin_wallet("user-4").await.unwrap().is_none());
}

#[tokio::test]
async fn order_reversal_flags_the_order_and_debits_the_shop() {
    let api = new_api("order_reversal").await;
    seed_order(api.db(), "ord-200", "shop-2", "user-5", Tzs::from(30_000), &[("prod-c", 3, Tzs::from(10_000))]).await;
    let intent = NewPaymentIntent::shop_order(
        "PAY-rev-3".into(),
        "user-5".into(),
        Tzs::from(30_000),
        IntentChannel::Card,
        "ord-200".into(),
        "idk-rev-3".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");
    api.process_completed_payment("PAY-rev-3", COIN_RATE, None).await.expect("Error settling");

    let reversal = api.process_reversal("PAY-rev-3").await.expect("Error reversing").expect("Reversal expected");
    assert!(reversal.reversed());
    // The buyer must be identifiable from the reversal itself, so notifications can reach them
    let PaymentReversal::Order(details) = &reversal else { panic!("Expected an order reversal") };
    let reversed_order = details.order.as_ref().expect("Order should be attached to the reversal");
    assert_eq!(reversed_order.buyer_id, "user-5");
    let wallet = api.db().fetch_shop_wallet("shop-2").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Tzs::from(0));
    let order = api.db().fetch_order_by_order_id("ord-200").await.unwrap().unwrap();
    assert!(order.payment_issue);
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn stale_pending_and_processing_intents_expire() {
    let api = new_api("expiry_sweep").await;
    let intent = NewPaymentIntent::coin_topup(
        "PAY-stale-1".into(),
        "user-6".into(),
        Tzs::from(2_000),
        IntentChannel::Mobile,
        "idk-stale-1".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");
    let intent = NewPaymentIntent::coin_topup(
        "PAY-stale-2".into(),
        "user-6".into(),
        Tzs::from(3_000),
        IntentChannel::Mobile,
        "idk-stale-2".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");
    api.update_intent_status("PAY-stale-2", IntentStatus::Processing).await.expect("Error updating status");

    // Rows created just now are not older than an hour
    let expired = api.expire_stale_intents(Duration::hours(1)).await.expect("Error expiring");
    assert!(expired.is_empty());

    // A negative cutoff makes everything in flight stale, Processing included
    let expired = api.expire_stale_intents(Duration::seconds(-1)).await.expect("Error expiring");
    assert_eq!(expired.len(), 2);
    let mut refs = expired.iter().map(|i| i.reference.as_str()).collect::<Vec<_>>();
    refs.sort_unstable();
    assert_eq!(refs, ["PAY-stale-1", "PAY-stale-2"]);
    assert!(expired.iter().all(|i| i.status == IntentStatus::Expired));

    // Expired intents drop out of the in-flight sweep
    let in_flight = api.in_flight_intents().await.expect("Error fetching in-flight intents");
    assert!(in_flight.is_empty());

    // An expired intent can still settle if the money actually moved
    let result = api.process_completed_payment("PAY-stale-1", COIN_RATE, None).await.expect("Error settling");
    assert!(result.credited());
}

#[tokio::test]
async fn inserted_intents_are_visible_on_other_pool_connections() {
    let api = new_api("insert_visibility").await;
    // Each fetch grabs a fresh connection from the pool, so the insert's write
    // must be committed before insert_intent returns.
    for n in 0..5 {
        let reference = format!("PAY-vis-{n}");
        let intent = NewPaymentIntent::coin_topup(
            reference.clone(),
            "user-10".into(),
            Tzs::from(1_000),
            IntentChannel::Mobile,
            format!("idk-vis-{n}"),
        );
        api.insert_intent(intent).await.expect("Error storing intent");
        let stored = api.db().fetch_intent_by_reference(&reference).await.expect("Error fetching intent");
        assert!(stored.is_some(), "intent {reference} not visible immediately after insert");
    }
}

#[tokio::test]
async fn missing_credit_sweep_finds_completed_but_unsettled_intents() {
    let api = new_api("missing_credit").await;
    let intent = NewPaymentIntent::coin_topup(
        "PAY-gap-1".into(),
        "user-8".into(),
        Tzs::from(12_000),
        IntentChannel::Mobile,
        "idk-gap-1".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");
    // Status moved to Completed but the credit never landed
    api.update_intent_status("PAY-gap-1", IntentStatus::Completed).await.expect("Error updating status");

    let gaps = api.unsettled_completed_intents(Duration::hours(24)).await.expect("Error sweeping");
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].reference, "PAY-gap-1");

    // The sweep repairs the gap through the normal settlement path
    let result = api.process_completed_payment("PAY-gap-1", COIN_RATE, None).await.expect("Error settling");
    assert!(result.credited());
    let gaps = api.unsettled_completed_intents(Duration::hours(24)).await.expect("Error sweeping");
    assert!(gaps.is_empty());
}
