//! User Table Operations
//!
//! The ledger proper: current balances live here, history lives in the
//! bet/withdrawal/deposit/star-transaction tables. Every debit checks the
//! balance first inside the caller's exclusive transaction, so a debit can
//! never drive a balance negative.

use rusqlite::{params, OptionalExtension, Transaction};

use super::db::{StoreError, StoreResult};
use crate::types::user::{Balances, Currency, UserRecord};
use crate::types::unix_now;

fn balance_column(currency: Currency) -> &'static str {
    match currency {
        Currency::Stars => "stars_balance",
        Currency::Ton => "ton_balance",
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get("id")?,
        telegram_id: row.get("telegram_id")?,
        username: row.get("username")?,
        wallet_address: row.get("wallet_address")?,
        stars_balance: row.get::<_, i64>("stars_balance")? as u64,
        ton_balance: row.get::<_, i64>("ton_balance")? as u64,
        created_at: row.get::<_, i64>("created_at")? as u64,
        updated_at: row.get::<_, i64>("updated_at")? as u64,
    })
}

/// Get a user by ID
pub fn get(tx: &Transaction, user_id: i64) -> StoreResult<Option<UserRecord>> {
    let user = tx
        .query_row("SELECT * FROM users WHERE id = ?1", params![user_id], row_to_user)
        .optional()?;
    Ok(user)
}

/// Get a user by ID, failing with NotFound when absent
pub fn get_required(tx: &Transaction, user_id: i64) -> StoreResult<UserRecord> {
    get(tx, user_id)?.ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
}

/// Get a user by Telegram identity
pub fn get_by_telegram_id(tx: &Transaction, telegram_id: i64) -> StoreResult<Option<UserRecord>> {
    let user = tx
        .query_row(
            "SELECT * FROM users WHERE telegram_id = ?1",
            params![telegram_id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

/// Create a user with zero balances
pub fn create(
    tx: &Transaction,
    telegram_id: Option<i64>,
    username: Option<&str>,
) -> StoreResult<UserRecord> {
    let now = unix_now();
    tx.execute(
        r#"
        INSERT INTO users (telegram_id, username, stars_balance, ton_balance, created_at, updated_at)
        VALUES (?1, ?2, 0, 0, ?3, ?3)
        "#,
        params![telegram_id, username, now as i64],
    )
    .map_err(|e| super::db::map_constraint_err(e, "user telegram_id"))?;

    let id = tx.last_insert_rowid();
    get_required(tx, id)
}

/// Current balance pair for a user
pub fn balances(tx: &Transaction, user_id: i64) -> StoreResult<Balances> {
    Ok(get_required(tx, user_id)?.balances())
}

/// Credit an amount to one of the user's balances
pub fn credit(tx: &Transaction, user_id: i64, currency: Currency, amount: u64) -> StoreResult<()> {
    let column = balance_column(currency);
    let rows = tx.execute(
        &format!(
            "UPDATE users SET {col} = {col} + ?1, updated_at = ?2 WHERE id = ?3",
            col = column
        ),
        params![amount as i64, unix_now() as i64, user_id],
    )?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

/// Debit an amount from one of the user's balances.
///
/// The balance is read inside the caller's exclusive transaction before the
/// update, so the check and the write are atomic with respect to other
/// writers.
pub fn debit(tx: &Transaction, user_id: i64, currency: Currency, amount: u64) -> StoreResult<()> {
    let user = get_required(tx, user_id)?;

    let available = user.balance_of(currency);
    if available < amount {
        return Err(StoreError::InsufficientFunds {
            available,
            required: amount,
        });
    }

    let column = balance_column(currency);
    tx.execute(
        &format!(
            "UPDATE users SET {col} = {col} - ?1, updated_at = ?2 WHERE id = ?3",
            col = column
        ),
        params![amount as i64, unix_now() as i64, user_id],
    )?;

    Ok(())
}

/// Sum of the user's confirmed deposits, for withdrawal gating
pub fn total_confirmed_deposits(tx: &Transaction, user_id: i64) -> StoreResult<u64> {
    let total: i64 = tx.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM deposits WHERE user_id = ?1 AND status = 'confirmed'",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Db;

    #[test]
    fn test_create_and_get() {
        let db = Db::in_memory().unwrap();

        let user = db
            .with_tx::<_, StoreError>(|tx| create(tx, Some(42), Some("alice")))
            .unwrap();

        assert_eq!(user.telegram_id, Some(42));
        assert_eq!(user.stars_balance, 0);
        assert_eq!(user.ton_balance, 0);

        let found = db
            .with_tx::<_, StoreError>(|tx| get_by_telegram_id(tx, 42))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[test]
    fn test_duplicate_telegram_id() {
        let db = Db::in_memory().unwrap();

        let result: Result<_, StoreError> = db.with_tx(|tx| {
            create(tx, Some(42), None)?;
            create(tx, Some(42), None)
        });
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn test_credit_and_debit() {
        let db = Db::in_memory().unwrap();

        let balances = db
            .with_tx::<_, StoreError>(|tx| {
                let user = create(tx, Some(1), None)?;
                credit(tx, user.id, Currency::Ton, 10_000_000_000)?;
                debit(tx, user.id, Currency::Ton, 4_000_000_000)?;
                balances(tx, user.id)
            })
            .unwrap();

        assert_eq!(balances.ton_balance, 6_000_000_000);
        assert_eq!(balances.stars_balance, 0);
    }

    #[test]
    fn test_debit_insufficient() {
        let db = Db::in_memory().unwrap();

        let result: Result<(), StoreError> = db.with_tx(|tx| {
            let user = create(tx, Some(1), None)?;
            credit(tx, user.id, Currency::Stars, 5)?;
            debit(tx, user.id, Currency::Stars, 10)
        });

        assert!(matches!(
            result,
            Err(StoreError::InsufficientFunds {
                available: 5,
                required: 10
            })
        ));
    }

    #[test]
    fn test_debit_unknown_user() {
        let db = Db::in_memory().unwrap();

        let result: Result<(), StoreError> =
            db.with_tx(|tx| debit(tx, 999, Currency::Ton, 1));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
