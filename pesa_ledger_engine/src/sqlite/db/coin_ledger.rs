use plg_common::Coins;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CoinTransaction, CoinTxType, CoinWallet},
    traits::LedgerError,
};

/// Inserts an immutable coin-ledger row. A second row for the same `(reference, tx_type)` pair
/// trips the partial unique index and surfaces as [`LedgerError::TransactionAlreadyExists`],
/// which callers treat as "already handled".
pub async fn idempotent_insert(
    user_id: &str,
    reference: Option<&str>,
    tx_type: CoinTxType,
    coins: Coins,
    memo: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<CoinTransaction, LedgerError> {
    let tx = sqlx::query_as(
        r#"
            INSERT INTO coin_transactions (user_id, reference, tx_type, coins, memo)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(reference)
    .bind(tx_type.to_string())
    .bind(coins)
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

/// Applies a signed delta to the wallet balance with a single atomic upsert. Never use a
/// read-modify-write here; concurrent gifts and top-ups on the same wallet would lose updates.
pub async fn adjust_balance(user_id: &str, delta: Coins, conn: &mut SqliteConnection) -> Result<Coins, LedgerError> {
    let (balance,): (Coins,) = sqlx::query_as(
        r#"
            INSERT INTO coin_wallets (user_id, balance, updated_at) VALUES ($1, $2, CURRENT_TIMESTAMP)
            ON CONFLICT (user_id) DO UPDATE SET
                balance = balance + excluded.balance,
                updated_at = CURRENT_TIMESTAMP
            RETURNING balance;
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .fetch_one(conn)
    .await?;
    Ok(balance)
}

/// Debits the wallet only if the balance covers the amount. The guard lives in the WHERE clause,
/// so two racing debits can never take the balance negative.
pub async fn guarded_debit(user_id: &str, amount: Coins, conn: &mut SqliteConnection) -> Result<Coins, LedgerError> {
    let row: Option<(Coins,)> = sqlx::query_as(
        r#"
            UPDATE coin_wallets SET balance = balance - $1, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $2 AND balance >= $1
            RETURNING balance;
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    row.map(|(balance,)| balance)
        .ok_or_else(|| LedgerError::InsufficientFunds(format!("user {user_id} cannot cover {amount}")))
}

pub async fn fetch_by_reference(
    reference: &str,
    tx_type: CoinTxType,
    conn: &mut SqliteConnection,
) -> Result<Option<CoinTransaction>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM coin_transactions WHERE reference = $1 AND tx_type = $2"#)
        .bind(reference)
        .bind(tx_type.to_string())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_wallet(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<CoinWallet>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM coin_wallets WHERE user_id = ?"#).bind(user_id).fetch_optional(conn).await
}

pub async fn history(
    user_id: &str,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CoinTransaction>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM coin_transactions WHERE user_id = $1 ORDER BY id DESC LIMIT $2"#)
        .bind(user_id)
        .bind(limit)
        .fetch_all(conn)
        .await
}
