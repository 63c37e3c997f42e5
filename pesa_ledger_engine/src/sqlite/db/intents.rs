use chrono::Duration;
use sqlx::SqliteConnection;

use crate::{
    db_types::{IntentStatus, NewPaymentIntent, PaymentIntent},
    traits::LedgerError,
};

pub async fn idempotent_insert(
    intent: NewPaymentIntent,
    conn: &mut SqliteConnection,
) -> Result<PaymentIntent, LedgerError> {
    let reference = intent.reference.clone();
    // fetch_all, not fetch_one: the RETURNING statement must be driven to completion so the
    // implicit transaction commits before the caller reads the row over another connection.
    let rows: Vec<PaymentIntent> = sqlx::query_as(
        r#"
            INSERT INTO payment_intents (reference, user_id, amount, currency, channel, kind, order_id, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(intent.reference)
    .bind(intent.user_id)
    .bind(intent.amount)
    .bind(intent.currency)
    .bind(intent.channel.to_string())
    .bind(intent.kind.to_string())
    .bind(intent.order_id)
    .bind(intent.idempotency_key)
    .fetch_all(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::IntentAlreadyExists(reference.clone()),
        _ => LedgerError::from(e),
    })?;
    rows.into_iter().next().ok_or(LedgerError::IntentAlreadyExists(reference))
}

pub async fn fetch_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM payment_intents WHERE reference = ?"#).bind(reference).fetch_optional(conn).await
}

pub async fn fetch_by_idempotency_key(
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM payment_intents WHERE idempotency_key = ?"#).bind(key).fetch_optional(conn).await
}

/// Advances the intent status, atomically gated on the set of statuses the lifecycle allows as a
/// source for `status`. Returns `None` when the row is missing or the transition is stale.
pub async fn update_status(
    reference: &str,
    status: IntentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, LedgerError> {
    let allowed_from: &[&str] = match status {
        IntentStatus::Pending => &[],
        IntentStatus::Processing => &["Pending"],
        IntentStatus::Completed | IntentStatus::Failed | IntentStatus::Expired => &["Pending", "Processing"],
        IntentStatus::Reversed => &["Completed"],
    };
    if allowed_from.is_empty() {
        return Ok(None);
    }
    // allowed_from is at most two entries, so an IN list is fine
    let placeholders = allowed_from.iter().enumerate().map(|(i, _)| format!("${}", i + 3)).collect::<Vec<_>>().join(", ");
    let q = format!(
        "UPDATE payment_intents SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE reference = $2 AND status IN \
         ({placeholders}) RETURNING *"
    );
    let mut query = sqlx::query_as(&q).bind(status.to_string()).bind(reference);
    for from in allowed_from {
        query = query.bind(*from);
    }
    let intent = query.fetch_optional(conn).await?;
    Ok(intent)
}

pub async fn fetch_in_status(
    status: IntentStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentIntent>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM payment_intents WHERE status = ? ORDER BY created_at ASC"#)
        .bind(status.to_string())
        .fetch_all(conn)
        .await
}

/// Expires all `Pending` and `Processing` intents older than `max_age` and returns them.
/// Age math happens in SQL so that the comparison is against SQLite's own clock.
pub async fn expire_older_than(
    max_age: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentIntent>, sqlx::Error> {
    let q = format!(
        "UPDATE payment_intents SET status = 'Expired', updated_at = CURRENT_TIMESTAMP WHERE status IN ('Pending', \
         'Processing') AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > {} RETURNING *;",
        max_age.num_seconds()
    );
    sqlx::query_as(&q).fetch_all(conn).await
}

/// `Completed` intents updated within the window that have neither a `Deposit` nor a `Sale`
/// ledger row. These slipped through the gap between gateway confirmation and local credit.
pub async fn fetch_unsettled_completed(
    window: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentIntent>, sqlx::Error> {
    let q = format!(
        r#"
            SELECT i.* FROM payment_intents i
            WHERE i.status = 'Completed'
            AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(i.updated_at)) <= {}
            AND NOT EXISTS (
                SELECT 1 FROM coin_transactions c WHERE c.reference = i.reference AND c.tx_type = 'Deposit'
            )
            AND NOT EXISTS (
                SELECT 1 FROM shop_transactions s WHERE s.reference = i.reference AND s.tx_type = 'Sale'
            )
            ORDER BY i.updated_at ASC;
        "#,
        window.num_seconds()
    );
    sqlx::query_as(&q).fetch_all(conn).await
}
