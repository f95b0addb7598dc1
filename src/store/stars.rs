//! Star Transaction Table Operations

use rusqlite::{params, OptionalExtension, Transaction};

use super::db::{map_constraint_err, StoreError, StoreResult};
use crate::types::stars::{StarTransactionRecord, StarTransactionStatus};
use crate::types::unix_now;

fn row_to_star_tx(row: &rusqlite::Row) -> rusqlite::Result<StarTransactionRecord> {
    let status: String = row.get("status")?;

    Ok(StarTransactionRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        telegram_id: row.get("telegram_id")?,
        amount: row.get::<_, i64>("amount")? as u64,
        payload: row.get("payload")?,
        status: status.parse().unwrap_or(StarTransactionStatus::Pending),
        telegram_payment_charge_id: row.get("telegram_payment_charge_id")?,
        provider_payment_charge_id: row.get("provider_payment_charge_id")?,
        created_at: row.get::<_, i64>("created_at")? as u64,
        completed_at: row
            .get::<_, Option<i64>>("completed_at")?
            .map(|v| v as u64),
    })
}

/// Record a pending purchase intent under a fresh payload
pub fn insert_pending(
    tx: &Transaction,
    user_id: i64,
    telegram_id: i64,
    amount: u64,
    payload: &str,
) -> StoreResult<StarTransactionRecord> {
    tx.execute(
        r#"
        INSERT INTO star_transactions (user_id, telegram_id, amount, payload, status, created_at)
        VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
        "#,
        params![user_id, telegram_id, amount as i64, payload, unix_now() as i64],
    )
    .map_err(|e| map_constraint_err(e, payload))?;

    let id = tx.last_insert_rowid();
    let record = tx
        .query_row(
            "SELECT * FROM star_transactions WHERE id = ?1",
            params![id],
            row_to_star_tx,
        )
        .optional()?;
    record.ok_or_else(|| StoreError::NotFound(format!("star transaction {}", id)))
}

/// Look up a purchase intent by its idempotency key, scoped to the Telegram
/// identity the invoice was issued to.
pub fn get_by_payload(
    tx: &Transaction,
    payload: &str,
    telegram_id: i64,
) -> StoreResult<Option<StarTransactionRecord>> {
    let record = tx
        .query_row(
            "SELECT * FROM star_transactions WHERE payload = ?1 AND telegram_id = ?2",
            params![payload, telegram_id],
            row_to_star_tx,
        )
        .optional()?;
    Ok(record)
}

/// Persist a terminal transition (completed/failed with charge ids)
pub fn update(tx: &Transaction, record: &StarTransactionRecord) -> StoreResult<()> {
    let rows = tx.execute(
        r#"
        UPDATE star_transactions
        SET status = ?2, telegram_payment_charge_id = ?3, provider_payment_charge_id = ?4,
            completed_at = ?5
        WHERE id = ?1
        "#,
        params![
            record.id,
            record.status.to_string(),
            record.telegram_payment_charge_id,
            record.provider_payment_charge_id,
            record.completed_at.map(|v| v as i64),
        ],
    )?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!(
            "star transaction {}",
            record.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{users, Db};

    #[test]
    fn test_insert_and_lookup() {
        let db = Db::in_memory().unwrap();

        let record = db
            .with_tx::<_, StoreError>(|tx| {
                let user = users::create(tx, Some(42), None)?;
                insert_pending(tx, user.id, 42, 100, "stars_abc")
            })
            .unwrap();

        assert_eq!(record.status, StarTransactionStatus::Pending);

        let found = db
            .with_tx::<_, StoreError>(|tx| get_by_payload(tx, "stars_abc", 42))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, record.id);

        // wrong telegram id does not match
        let missing = db
            .with_tx::<_, StoreError>(|tx| get_by_payload(tx, "stars_abc", 43))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_payload_is_unique() {
        let db = Db::in_memory().unwrap();

        let result: Result<_, StoreError> = db.with_tx(|tx| {
            let user = users::create(tx, Some(42), None)?;
            insert_pending(tx, user.id, 42, 100, "stars_abc")?;
            insert_pending(tx, user.id, 42, 200, "stars_abc")
        });
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn test_terminal_update_round_trip() {
        let db = Db::in_memory().unwrap();

        let updated = db
            .with_tx::<_, StoreError>(|tx| {
                let user = users::create(tx, Some(42), None)?;
                let mut record = insert_pending(tx, user.id, 42, 100, "stars_abc")?;
                record.mark_completed("tg1".to_string(), "pp1".to_string());
                update(tx, &record)?;
                Ok(get_by_payload(tx, "stars_abc", 42)?.unwrap())
            })
            .unwrap();

        assert_eq!(updated.status, StarTransactionStatus::Completed);
        assert_eq!(updated.telegram_payment_charge_id.as_deref(), Some("tg1"));
        assert!(updated.completed_at.is_some());
    }
}
