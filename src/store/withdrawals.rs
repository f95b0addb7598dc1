//! Withdrawal Table Operations

use rusqlite::{params, OptionalExtension, Transaction};

use super::db::{StoreError, StoreResult};
use crate::types::unix_now;
use crate::types::withdrawal::{WithdrawalRecord, WithdrawalStatus};

fn row_to_withdrawal(row: &rusqlite::Row) -> rusqlite::Result<WithdrawalRecord> {
    let status: String = row.get("status")?;

    Ok(WithdrawalRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        amount: row.get::<_, i64>("amount")? as u64,
        fee: row.get::<_, i64>("fee")? as u64,
        net_amount: row.get::<_, i64>("net_amount")? as u64,
        wallet_address: row.get("wallet_address")?,
        status: status.parse().unwrap_or(WithdrawalStatus::Pending),
        auto_process: row.get("auto_process")?,
        transaction_hash: row.get("transaction_hash")?,
        error_message: row.get("error_message")?,
        admin_notes: row.get("admin_notes")?,
        reviewed_by: row.get("reviewed_by")?,
        created_at: row.get::<_, i64>("created_at")? as u64,
        completed_at: row
            .get::<_, Option<i64>>("completed_at")?
            .map(|v| v as u64),
    })
}

/// Insert a new withdrawal request
#[allow(clippy::too_many_arguments)]
pub fn insert(
    tx: &Transaction,
    user_id: i64,
    amount: u64,
    fee: u64,
    net_amount: u64,
    wallet_address: &str,
    status: WithdrawalStatus,
    auto_process: bool,
) -> StoreResult<WithdrawalRecord> {
    tx.execute(
        r#"
        INSERT INTO withdrawals (user_id, amount, fee, net_amount, wallet_address,
                                 status, auto_process, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            user_id,
            amount as i64,
            fee as i64,
            net_amount as i64,
            wallet_address,
            status.to_string(),
            auto_process,
            unix_now() as i64,
        ],
    )?;

    let id = tx.last_insert_rowid();
    get_required(tx, id)
}

/// Get a withdrawal by ID
pub fn get(tx: &Transaction, id: i64) -> StoreResult<Option<WithdrawalRecord>> {
    let record = tx
        .query_row(
            "SELECT * FROM withdrawals WHERE id = ?1",
            params![id],
            row_to_withdrawal,
        )
        .optional()?;
    Ok(record)
}

/// Get a withdrawal by ID, failing with NotFound when absent
pub fn get_required(tx: &Transaction, id: i64) -> StoreResult<WithdrawalRecord> {
    get(tx, id)?.ok_or_else(|| StoreError::NotFound(format!("withdrawal {}", id)))
}

/// Persist the full mutable state of a withdrawal
pub fn update(tx: &Transaction, record: &WithdrawalRecord) -> StoreResult<()> {
    let rows = tx.execute(
        r#"
        UPDATE withdrawals
        SET status = ?2, transaction_hash = ?3, error_message = ?4, admin_notes = ?5,
            reviewed_by = ?6, completed_at = ?7
        WHERE id = ?1
        "#,
        params![
            record.id,
            record.status.to_string(),
            record.transaction_hash,
            record.error_message,
            record.admin_notes,
            record.reviewed_by,
            record.completed_at.map(|v| v as i64),
        ],
    )?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!("withdrawal {}", record.id)));
    }
    Ok(())
}

/// Sum and count of a user's withdrawals in the trailing window, excluding
/// failed and cancelled ones (those were refunded and do not consume quota).
pub fn daily_totals(tx: &Transaction, user_id: i64, since: u64) -> StoreResult<(u64, u32)> {
    let (total, count): (i64, i64) = tx.query_row(
        r#"
        SELECT COALESCE(SUM(amount), 0), COUNT(*)
        FROM withdrawals
        WHERE user_id = ?1
          AND created_at >= ?2
          AND status NOT IN ('failed', 'cancelled')
        "#,
        params![user_id, since as i64],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok((total as u64, count as u32))
}

/// Pending withdrawals eligible for the auto-process sweep, oldest first
pub fn pending_auto_process(tx: &Transaction, limit: u32) -> StoreResult<Vec<WithdrawalRecord>> {
    let mut stmt = tx.prepare(
        r#"
        SELECT * FROM withdrawals
        WHERE status = 'pending' AND auto_process = 1
        ORDER BY created_at ASC, id ASC
        LIMIT ?1
        "#,
    )?;

    let records = stmt
        .query_map(params![limit as i64], row_to_withdrawal)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Withdrawals stuck in processing with no terminal timestamp
pub fn stuck_processing(tx: &Transaction) -> StoreResult<Vec<WithdrawalRecord>> {
    let mut stmt = tx.prepare(
        r#"
        SELECT * FROM withdrawals
        WHERE status = 'processing' AND completed_at IS NULL
        ORDER BY created_at ASC, id ASC
        "#,
    )?;

    let records = stmt
        .query_map([], row_to_withdrawal)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Admin listing with optional status/user filters, newest first
pub fn list(
    tx: &Transaction,
    status: Option<WithdrawalStatus>,
    user_id: Option<i64>,
    limit: u32,
    offset: u32,
) -> StoreResult<Vec<WithdrawalRecord>> {
    let mut sql = "SELECT * FROM withdrawals WHERE 1=1".to_string();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(s) = status {
        sql.push_str(" AND status = ?");
        params.push(Box::new(s.to_string()));
    }
    if let Some(u) = user_id {
        sql.push_str(" AND user_id = ?");
        params.push(Box::new(u));
    }

    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
    params.push(Box::new(limit as i64));
    params.push(Box::new(offset as i64));

    let mut stmt = tx.prepare(&sql)?;
    let records = stmt
        .query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            row_to_withdrawal,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Per-status count and gross-amount aggregates
pub fn status_stats(tx: &Transaction, auto_process_only: bool) -> StoreResult<Vec<(String, u64, u64)>> {
    let sql = if auto_process_only {
        "SELECT status, COUNT(*), COALESCE(SUM(amount), 0) FROM withdrawals
         WHERE auto_process = 1 GROUP BY status"
    } else {
        "SELECT status, COUNT(*), COALESCE(SUM(amount), 0) FROM withdrawals GROUP BY status"
    };

    let mut stmt = tx.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{users, Db};
    use crate::types::user::Currency;

    fn setup_user(db: &Db) -> i64 {
        db.with_tx::<_, StoreError>(|tx| {
            let user = users::create(tx, Some(1), None)?;
            users::credit(tx, user.id, Currency::Ton, 100_000_000_000)?;
            Ok(user.id)
        })
        .unwrap()
    }

    fn insert_sample(db: &Db, user_id: i64, amount: u64, status: WithdrawalStatus) -> i64 {
        db.with_tx::<_, StoreError>(|tx| {
            let w = insert(
                tx,
                user_id,
                amount,
                50_000_000,
                amount - 50_000_000,
                "UQdest",
                status,
                true,
            )?;
            Ok(w.id)
        })
        .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);
        let id = insert_sample(&db, user_id, 5_000_000_000, WithdrawalStatus::Pending);

        let record = db
            .with_tx::<_, StoreError>(|tx| get_required(tx, id))
            .unwrap();
        assert_eq!(record.amount, 5_000_000_000);
        assert_eq!(record.net_amount, 4_950_000_000);
        assert_eq!(record.status, WithdrawalStatus::Pending);
    }

    #[test]
    fn test_daily_totals_exclude_refunded() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        insert_sample(&db, user_id, 5_000_000_000, WithdrawalStatus::Pending);
        insert_sample(&db, user_id, 3_000_000_000, WithdrawalStatus::Completed);
        insert_sample(&db, user_id, 7_000_000_000, WithdrawalStatus::Failed);
        insert_sample(&db, user_id, 2_000_000_000, WithdrawalStatus::Cancelled);

        let (total, count) = db
            .with_tx::<_, StoreError>(|tx| daily_totals(tx, user_id, 0))
            .unwrap();

        assert_eq!(total, 8_000_000_000);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_pending_auto_process_ordering_and_limit() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        let first = insert_sample(&db, user_id, 1_000_000_000, WithdrawalStatus::Pending);
        let _second = insert_sample(&db, user_id, 2_000_000_000, WithdrawalStatus::Pending);
        insert_sample(&db, user_id, 3_000_000_000, WithdrawalStatus::ManualReview);

        let batch = db
            .with_tx::<_, StoreError>(|tx| pending_auto_process(tx, 1))
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, first);
    }

    #[test]
    fn test_stuck_processing() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        let id = insert_sample(&db, user_id, 5_000_000_000, WithdrawalStatus::Pending);
        db.with_tx::<_, StoreError>(|tx| {
            let mut w = get_required(tx, id)?;
            w.mark_processing();
            update(tx, &w)
        })
        .unwrap();

        let stuck = db
            .with_tx::<_, StoreError>(|tx| stuck_processing(tx))
            .unwrap();
        assert_eq!(stuck.len(), 1);

        // completing removes it from the stuck view
        db.with_tx::<_, StoreError>(|tx| {
            let mut w = get_required(tx, id)?;
            w.mark_completed("hash".to_string());
            update(tx, &w)
        })
        .unwrap();

        let stuck = db
            .with_tx::<_, StoreError>(|tx| stuck_processing(tx))
            .unwrap();
        assert!(stuck.is_empty());
    }

    #[test]
    fn test_list_filters() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        insert_sample(&db, user_id, 1_000_000_000, WithdrawalStatus::Pending);
        insert_sample(&db, user_id, 2_000_000_000, WithdrawalStatus::Completed);

        let pending = db
            .with_tx::<_, StoreError>(|tx| {
                list(tx, Some(WithdrawalStatus::Pending), None, 50, 0)
            })
            .unwrap();
        assert_eq!(pending.len(), 1);

        let all = db
            .with_tx::<_, StoreError>(|tx| list(tx, None, Some(user_id), 50, 0))
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_status_stats() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        insert_sample(&db, user_id, 1_000_000_000, WithdrawalStatus::Pending);
        insert_sample(&db, user_id, 2_000_000_000, WithdrawalStatus::Pending);

        let stats = db
            .with_tx::<_, StoreError>(|tx| status_stats(tx, true))
            .unwrap();
        let pending = stats.iter().find(|(s, _, _)| s == "pending").unwrap();
        assert_eq!(pending.1, 2);
        assert_eq!(pending.2, 3_000_000_000);
    }
}
