use plg_common::Tzs;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ShopTransaction, ShopTxType, ShopWallet},
    traits::LedgerError,
};

/// The shop-ledger twin of [`coin_ledger::idempotent_insert`](super::coin_ledger::idempotent_insert).
/// At most one `Sale` and one `Refund` row can ever exist per reference.
pub async fn idempotent_insert(
    shop_id: &str,
    reference: Option<&str>,
    tx_type: ShopTxType,
    amount: Tzs,
    memo: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<ShopTransaction, LedgerError> {
    let tx = sqlx::query_as(
        r#"
            INSERT INTO shop_transactions (shop_id, reference, tx_type, amount, memo)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(shop_id)
    .bind(reference)
    .bind(tx_type.to_string())
    .bind(amount)
    .bind(memo)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::TransactionAlreadyExists(reference.unwrap_or_default().to_string(), tx_type.to_string())
        },
        _ => LedgerError::from(e),
    })?;
    Ok(tx)
}

pub async fn adjust_balance(shop_id: &str, delta: Tzs, conn: &mut SqliteConnection) -> Result<Tzs, LedgerError> {
    let (balance,): (Tzs,) = sqlx::query_as(
        r#"
            INSERT INTO shop_wallets (shop_id, balance, updated_at) VALUES ($1, $2, CURRENT_TIMESTAMP)
            ON CONFLICT (shop_id) DO UPDATE SET
                balance = balance + excluded.balance,
                updated_at = CURRENT_TIMESTAMP
            RETURNING balance;
        "#,
    )
    .bind(shop_id)
    .bind(delta)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

pub async fn guarded_debit(shop_id: &str, amount: Tzs, conn: &mut SqliteConnection) -> Result<Tzs, LedgerError> {
    let row: Option<(Tzs,)> = sqlx::query_as(
        r#"
            UPDATE shop_wallets SET balance = balance - $1, updated_at = CURRENT_TIMESTAMP
            WHERE shop_id = $2 AND balance >= $1
            RETURNING balance;
        "#,
    )
    .bind(amount)
    .bind(shop_id)
    .fetch_optional(conn)
    .await?;
    row.map(|(balance,)| balance)
        .ok_or_else(|| LedgerError::InsufficientFunds(format!("shop {shop_id} cannot cover {amount}")))
}

pub async fn fetch_by_reference(
    reference: &str,
    tx_type: ShopTxType,
    conn: &mut SqliteConnection,
) -> Result<Option<ShopTransaction>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM shop_transactions WHERE reference = $1 AND tx_type = $2"#)
        .bind(reference)
        .bind(tx_type.to_string())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_wallet(shop_id: &str, conn: &mut SqliteConnection) -> Result<Option<ShopWallet>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM shop_wallets WHERE shop_id = ?"#).bind(shop_id).fetch_optional(conn).await
}

pub async fn history(
    shop_id: &str,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ShopTransaction>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM shop_transactions WHERE shop_id = $1 ORDER BY id DESC LIMIT $2"#)
        .bind(shop_id)
        .bind(limit)
        .fetch_all(conn)
        .await
}
