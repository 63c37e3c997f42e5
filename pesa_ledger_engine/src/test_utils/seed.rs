//! Seeding helpers for integration tests. Orders and payout destinations are created by other
//! subsystems in production, so tests inject them directly.

use plg_common::Tzs;

use crate::{
    db_types::{Order, PayoutDestination},
    sqlite::db::{orders, withdrawals},
    SqliteDatabase,
};

pub async fn seed_order(
    db: &SqliteDatabase,
    order_id: &str,
    shop_id: &str,
    buyer_id: &str,
    total_amount: Tzs,
    items: &[(&str, i64, Tzs)],
) -> Order {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let order =
        orders::insert_order(order_id, shop_id, buyer_id, total_amount, &mut conn).await.expect("Error inserting order");
    for (product_id, quantity, unit_price) in items {
        orders::insert_order_item(order_id, product_id, *quantity, *unit_price, &mut conn)
            .await
            .expect("Error inserting order item");
    }
    order
}

pub async fn seed_payout_destination(
    db: &SqliteDatabase,
    owner_id: &str,
    msisdn: &str,
    account_name: &str,
) -> PayoutDestination {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    withdrawals::upsert_payout_destination(owner_id, msisdn, account_name, &mut conn)
        .await
        .expect("Error storing payout destination")
}

pub async fn units_sold(db: &SqliteDatabase, product_id: &str) -> i64 {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    orders::units_sold(product_id, &mut conn).await.expect("Error fetching units sold")
}
