//! Withdrawal, payout-resolution and gift-transfer flows against a real Sqlite database.
//!
//! Run with `cargo test --features test_features`.

use pesa_ledger_engine::{
    db_types::{IntentChannel, NewPaymentIntent, WithdrawalStatus},
    events::EventProducers,
    test_utils::{
        prepare_env::prepare_test_env,
        seed::{seed_order, seed_payout_destination},
    },
    AccountManagement,
    FeeSchedule,
    LedgerError,
    SettlementApi,
    SettlementError,
    SqliteDatabase,
};
use plg_common::{Coins, Tzs};

const COIN_RATE: f64 = 0.1;

fn fees() -> FeeSchedule {
    FeeSchedule { platform_rate: 0.05, flat_fee: Tzs::from(500), minimum: Tzs::from(10_000) }
}

async fn new_api(name: &str) -> SettlementApi<SqliteDatabase> {
    let url = format!("sqlite://../data/test_{name}.db");
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    SettlementApi::new(db, EventProducers::default())
}

/// Credits `user_id` with a settled top-up of `amount`.
async fn fund_user(api: &SettlementApi<SqliteDatabase>, user_id: &str, amount: Tzs) {
    let reference = format!("PAY-fund-{user_id}");
    let intent = NewPaymentIntent::coin_topup(
        reference.clone(),
        user_id.to_string(),
        amount,
        IntentChannel::Mobile,
        format!("idk-fund-{user_id}"),
    );
    api.insert_intent(intent).await.expect("Error storing intent");
    api.process_completed_payment(&reference, COIN_RATE, None).await.expect("Error settling top-up");
}

#[tokio::test]
async fn withdrawal_debits_pessimistically_with_fees() {
    let api = new_api("withdrawal_fees").await;
    fund_user(&api, "user-1", Tzs::from(50_000)).await;
    seed_payout_destination(api.db(), "user-1", "+255712000001", "Asha M").await;

    let withdrawal = api
        .create_withdrawal("user-1", Tzs::from(30_000), COIN_RATE, &fees(), "WD-1".into(), "idk-wd-1".into())
        .await
        .expect("Error creating withdrawal");
    // 5% of 30,000 plus the 500 flat fee
    assert_eq!(withdrawal.fee_amount, Tzs::from(2_000));
    assert_eq!(withdrawal.net_amount, Tzs::from(28_000));
    assert_eq!(withdrawal.coins, Coins::from(3_000));
    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    assert_eq!(withdrawal.msisdn, "+255712000001");

    // The wallet is debited before any payout is submitted
    let wallet = api.db().fetch_coin_wallet("user-1").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(2_000));

    let pending = api.pending_payout_references().await.expect("Error listing pending payouts");
    assert_eq!(pending, vec!["WD-1".to_string()]);
}

#[tokio::test]
async fn withdrawal_guards() {
    let api = new_api("withdrawal_guards").await;
    fund_user(&api, "user-2", Tzs::from(20_000)).await;

    // Below the payout minimum
    let err = api
        .create_withdrawal("user-2", Tzs::from(5_000), COIN_RATE, &fees(), "WD-min".into(), "idk-wd-min".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::BelowMinimum(_)));
    assert!(err.is_user_error());

    // No payout destination on file
    let err = api
        .create_withdrawal("user-2", Tzs::from(15_000), COIN_RATE, &fees(), "WD-dest".into(), "idk-wd-dest".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NoPayoutDestination(_)));

    // Balance is 2,000 coins; a 50,000 TZS withdrawal needs 5,000
    seed_payout_destination(api.db(), "user-2", "+255712000002", "Neema K").await;
    let err = api
        .create_withdrawal("user-2", Tzs::from(50_000), COIN_RATE, &fees(), "WD-funds".into(), "idk-wd-funds".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::LedgerError(LedgerError::InsufficientFunds(_))));
    assert!(err.is_user_error());

    // The failed attempt must not have touched the wallet
    let wallet = api.db().fetch_coin_wallet("user-2").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(2_000));
}

#[tokio::test]
async fn failed_payout_restores_the_balance_exactly_once() {
    let api = new_api("failed_payout").await;
    fund_user(&api, "user-3", Tzs::from(50_000)).await;
    seed_payout_destination(api.db(), "user-3", "+255712000003", "Juma T").await;
    api.create_withdrawal("user-3", Tzs::from(30_000), COIN_RATE, &fees(), "WD-fail".into(), "idk-wd-fail".into())
        .await
        .expect("Error creating withdrawal");

    let resolution =
        api.process_payout_resolution("WD-fail", false).await.expect("Error resolving").expect("Resolution expected");
    assert_eq!(resolution.status, WithdrawalStatus::Failed);
    assert!(resolution.restored);
    let wallet = api.db().fetch_coin_wallet("user-3").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(5_000));

    // A replayed failure webhook finds nothing pending and restores nothing
    let replay = api.process_payout_resolution("WD-fail", false).await.expect("Error on replay");
    assert!(replay.is_none());
    let wallet = api.db().fetch_coin_wallet("user-3").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Coins::from(5_000));

    // An unknown payout reference is an error, not a silent no-op
    let err = api.process_payout_resolution("WD-nope", false).await.unwrap_err();
    assert!(matches!(err, SettlementError::LedgerError(LedgerError::WithdrawalNotFound(_))));
}

#[tokio::test]
async fn shop_withdrawal_resolves_against_the_settlement_ledger() {
    let api = new_api("shop_withdrawal").await;
    seed_order(api.db(), "ord-300", "shop-3", "user-4", Tzs::from(80_000), &[("prod-d", 1, Tzs::from(80_000))]).await;
    let intent = NewPaymentIntent::shop_order(
        "PAY-shop-wd".into(),
        "user-4".into(),
        Tzs::from(80_000),
        IntentChannel::Mobile,
        "ord-300".into(),
        "idk-shop-wd".into(),
    );
    api.insert_intent(intent).await.expect("Error storing intent");
    api.process_completed_payment("PAY-shop-wd", COIN_RATE, None).await.expect("Error settling order");
    seed_payout_destination(api.db(), "shop-3", "+255712000004", "Duka la Vitabu").await;

    let withdrawal = api
        .create_shop_withdrawal("shop-3", Tzs::from(60_000), &fees(), "WD-shop-1".into(), "idk-wd-shop-1".into())
        .await
        .expect("Error creating shop withdrawal");
    assert_eq!(withdrawal.fee_amount, Tzs::from(3_500));
    assert_eq!(withdrawal.net_amount, Tzs::from(56_500));
    let wallet = api.db().fetch_shop_wallet("shop-3").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Tzs::from(20_000));

    // A successful payout completes without touching the balance again
    let resolution = api
        .process_payout_resolution("WD-shop-1", true)
        .await
        .expect("Error resolving")
        .expect("Resolution expected");
    assert_eq!(resolution.status, WithdrawalStatus::Completed);
    assert!(!resolution.restored);
    assert_eq!(resolution.net_amount, Tzs::from(56_500));
    let wallet = api.db().fetch_shop_wallet("shop-3").await.unwrap().unwrap();
    assert_eq!(wallet.balance, Tzs::from(20_000));
    let pending = api.pending_payout_references().await.expect("Error listing pending payouts");
    assert!(pending.is_empty());
}

#[tokio::test]
async fn gift_transfer_is_atomic_and_idempotent() {
    let api = new_api("gift_transfer").await;
    fund_user(&api, "sender-1", Tzs::from(10_000)).await;

    let transfer = api
        .transfer_gift("sender-1", "recipient-1", Coins::from(200), "GIFT-1", Some("kwa zawadi".into()))
        .await
        .expect("Error transferring gift");
    assert_eq!(transfer.sender_balance, Coins::from(800));
    assert_eq!(transfer.recipient_balance, Coins::from(200));

    // Replaying the same gift reference moves nothing
    let replay = api
        .transfer_gift("sender-1", "recipient-1", Coins::from(200), "GIFT-1", None)
        .await
        .expect("Error on gift replay");
    assert_eq!(replay.sender_balance, Coins::from(800));
    assert_eq!(replay.recipient_balance, Coins::from(200));

    // An over-balance gift fails and leaves both wallets untouched
    let err = api.transfer_gift("sender-1", "recipient-1", Coins::from(5_000), "GIFT-2", None).await.unwrap_err();
    assert!(matches!(err, SettlementError::LedgerError(LedgerError::InsufficientFunds(_))));
    let sender = api.db().fetch_coin_wallet("sender-1").await.unwrap().unwrap();
    let recipient = api.db().fetch_coin_wallet("recipient-1").await.unwrap().unwrap();
    assert_eq!(sender.balance, Coins::from(800));
    assert_eq!(recipient.balance, Coins::from(200));
}
