//! Deposit Table Operations

use rusqlite::{params, OptionalExtension, Transaction};

use super::db::{map_constraint_err, StoreError, StoreResult};
use crate::types::deposit::{DepositRecord, DepositStatus};
use crate::types::unix_now;

fn row_to_deposit(row: &rusqlite::Row) -> rusqlite::Result<DepositRecord> {
    let status: String = row.get("status")?;

    Ok(DepositRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        amount: row.get::<_, i64>("amount")? as u64,
        wallet_address: row.get("wallet_address")?,
        status: status.parse().unwrap_or(DepositStatus::Pending),
        transaction_hash: row.get("transaction_hash")?,
        confirmed_at: row
            .get::<_, Option<i64>>("confirmed_at")?
            .map(|v| v as u64),
        created_at: row.get::<_, i64>("created_at")? as u64,
    })
}

/// Insert a deposit already matched to an on-chain transaction. The UNIQUE
/// hash constraint turns a repeat claim of the same transaction into a
/// `Duplicate` error instead of a second credit.
pub fn insert_confirmed(
    tx: &Transaction,
    user_id: i64,
    amount: u64,
    wallet_address: &str,
    transaction_hash: &str,
) -> StoreResult<DepositRecord> {
    let now = unix_now();
    tx.execute(
        r#"
        INSERT INTO deposits (user_id, amount, wallet_address, status, transaction_hash,
                              confirmed_at, created_at)
        VALUES (?1, ?2, ?3, 'confirmed', ?4, ?5, ?5)
        "#,
        params![user_id, amount as i64, wallet_address, transaction_hash, now as i64],
    )
    .map_err(|e| map_constraint_err(e, transaction_hash))?;

    let id = tx.last_insert_rowid();
    let record = tx
        .query_row("SELECT * FROM deposits WHERE id = ?1", params![id], row_to_deposit)
        .optional()?;
    record.ok_or_else(|| StoreError::NotFound(format!("deposit {}", id)))
}

/// Whether an on-chain transaction has already been claimed as a deposit
pub fn hash_exists(tx: &Transaction, transaction_hash: &str) -> StoreResult<bool> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM deposits WHERE transaction_hash = ?1",
        params![transaction_hash],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// A user's deposits, newest first
pub fn list_for_user(tx: &Transaction, user_id: i64, limit: u32) -> StoreResult<Vec<DepositRecord>> {
    let mut stmt = tx.prepare(
        "SELECT * FROM deposits WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
    )?;

    let records = stmt
        .query_map(params![user_id, limit as i64], row_to_deposit)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{users, Db};

    fn setup_user(db: &Db) -> i64 {
        db.with_tx::<_, StoreError>(|tx| Ok(users::create(tx, Some(1), None)?.id))
            .unwrap()
    }

    #[test]
    fn test_insert_confirmed() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        let deposit = db
            .with_tx::<_, StoreError>(|tx| {
                insert_confirmed(tx, user_id, 2_000_000_000, "UQsender", "txhash1")
            })
            .unwrap();

        assert_eq!(deposit.status, DepositStatus::Confirmed);
        assert!(deposit.confirmed_at.is_some());
        assert_eq!(deposit.transaction_hash.as_deref(), Some("txhash1"));
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        db.with_tx::<_, StoreError>(|tx| {
            insert_confirmed(tx, user_id, 1_000_000_000, "UQsender", "txhash1")
        })
        .unwrap();

        let result: Result<_, StoreError> = db.with_tx(|tx| {
            insert_confirmed(tx, user_id, 1_000_000_000, "UQsender", "txhash1")
        });
        assert!(matches!(result, Err(StoreError::Duplicate(_))));

        let exists = db
            .with_tx::<_, StoreError>(|tx| hash_exists(tx, "txhash1"))
            .unwrap();
        assert!(exists);
    }
}
