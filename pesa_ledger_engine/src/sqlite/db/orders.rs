use plg_common::Tzs;
use sqlx::SqliteConnection;

use crate::db_types::{Order, OrderItem};

pub async fn fetch_by_order_id(order_id: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM orders WHERE order_id = ?"#).bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_items(order_id: &str, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM order_items WHERE order_id = ?"#).bind(order_id).fetch_all(conn).await
}

/// Advances a paid-for order into fulfilment. The `PendingPayment` guard makes settlement replays
/// a no-op here.
pub async fn mark_processing(order_id: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET status = 'Processing', updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'PendingPayment'
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

/// Raises the payment-issue flag and cancels the order. Called by the reversal path.
pub async fn mark_payment_issue(order_id: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET payment_issue = 1, status = 'Cancelled', updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

/// Folds the order's line items into the per-product sold counters.
pub async fn bump_units_sold(order_id: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO products (product_id, units_sold)
            SELECT product_id, SUM(quantity) FROM order_items WHERE order_id = $1 GROUP BY product_id
            ON CONFLICT (product_id) DO UPDATE SET units_sold = units_sold + excluded.units_sold;
        "#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Stores an order from the commerce module. The engine consumes orders, it does not create them
/// in production; this exists for ingestion from the commerce sync and for tests.
pub async fn insert_order(
    order_id: &str,
    shop_id: &str,
    buyer_id: &str,
    total_amount: Tzs,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO orders (order_id, shop_id, buyer_id, total_amount) VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(shop_id)
    .bind(buyer_id)
    .bind(total_amount)
    .fetch_one(conn)
    .await
}

pub async fn insert_order_item(
    order_id: &str,
    product_id: &str,
    quantity: i64,
    unit_price: Tzs,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .bind(unit_price)
    .fetch_one(conn)
    .await
}

pub async fn units_sold(product_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as(r#"SELECT units_sold FROM products WHERE product_id = ?"#).bind(product_id).fetch_optional(conn).await?;
    Ok(row.map(|(n,)| n).unwrap_or_default())
}
