use sqlx::SqliteConnection;

use crate::{
    db_types::{NewShopWithdrawal, NewWithdrawal, PayoutDestination, ShopWithdrawal, Withdrawal, WithdrawalStatus},
    traits::LedgerError,
};

pub async fn insert(withdrawal: NewWithdrawal, conn: &mut SqliteConnection) -> Result<Withdrawal, LedgerError> {
    let reference = withdrawal.reference.clone();
    let row = sqlx::query_as(
        r#"
            INSERT INTO withdrawals (reference, user_id, coins, amount, fee_amount, net_amount, msisdn, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(withdrawal.reference)
    .bind(withdrawal.user_id)
    .bind(withdrawal.coins)
    .bind(withdrawal.amount)
    .bind(withdrawal.fee_amount)
    .bind(withdrawal.net_amount)
    .bind(withdrawal.msisdn)
    .bind(withdrawal.idempotency_key)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::TransactionAlreadyExists(reference, "Withdrawal".to_string())
        },
        _ => LedgerError::from(e),
    })?;
    Ok(row)
}

pub async fn insert_shop(
    withdrawal: NewShopWithdrawal,
    conn: &mut SqliteConnection,
) -> Result<ShopWithdrawal, LedgerError> {
    let reference = withdrawal.reference.clone();
    let row = sqlx::query_as(
        r#"
            INSERT INTO shop_withdrawals (reference, shop_id, amount, fee_amount, net_amount, msisdn, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(withdrawal.reference)
    .bind(withdrawal.shop_id)
    .bind(withdrawal.amount)
    .bind(withdrawal.fee_amount)
    .bind(withdrawal.net_amount)
    .bind(withdrawal.msisdn)
    .bind(withdrawal.idempotency_key)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::TransactionAlreadyExists(reference, "ShopWithdrawal".to_string())
        },
        _ => LedgerError::from(e),
    })?;
    Ok(row)
}

pub async fn fetch_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Withdrawal>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM withdrawals WHERE reference = ?"#).bind(reference).fetch_optional(conn).await
}

pub async fn fetch_shop_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ShopWithdrawal>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM shop_withdrawals WHERE reference = ?"#).bind(reference).fetch_optional(conn).await
}

/// Resolves a pending withdrawal. The `status = 'Pending'` guard makes a duplicate resolution a
/// no-op; `None` means the row was missing or already resolved.
pub async fn resolve(
    reference: &str,
    status: WithdrawalStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Withdrawal>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE withdrawals SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE reference = $2 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(status.to_string())
    .bind(reference)
    .fetch_optional(conn)
    .await
}

pub async fn resolve_shop(
    reference: &str,
    status: WithdrawalStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<ShopWithdrawal>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE shop_withdrawals SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE reference = $2 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(status.to_string())
    .bind(reference)
    .fetch_optional(conn)
    .await
}

/// Pending payout references across both tables. UNION deduplicates, so the sweep polls each
/// reference once even if a reference somehow appears in both.
pub async fn pending_references(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
            SELECT reference FROM withdrawals WHERE status = 'Pending'
            UNION
            SELECT reference FROM shop_withdrawals WHERE status = 'Pending';
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(r,)| r).collect())
}

pub async fn fetch_payout_destination(
    owner_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutDestination>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM payout_destinations WHERE owner_id = ?"#)
        .bind(owner_id)
        .fetch_optional(conn)
        .await
}

pub async fn upsert_payout_destination(
    owner_id: &str,
    msisdn: &str,
    account_name: &str,
    conn: &mut SqliteConnection,
) -> Result<PayoutDestination, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO payout_destinations (owner_id, msisdn, account_name) VALUES ($1, $2, $3)
            ON CONFLICT (owner_id) DO UPDATE SET msisdn = excluded.msisdn, account_name = excluded.account_name
            RETURNING *;
        "#,
    )
    .bind(owner_id)
    .bind(msisdn)
    .bind(account_name)
    .fetch_one(conn)
    .await
}
