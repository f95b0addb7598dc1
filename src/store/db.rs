//! Database Handle
//!
//! Connection pool, schema migrations, and the transactional entry point
//! used by every settlement service.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Transaction, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// SQLite-backed store with connection pooling
#[derive(Clone)]
pub struct Db {
    pool: Pool<SqliteConnectionManager>,
}

impl Db {
    /// Open (or create) the database at the given path and run migrations.
    pub fn new<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations()?;

        Ok(db)
    }

    fn conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    /// Run a closure inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The immediate behavior takes the write lock up front, so every
    /// read inside the closure sees a snapshot no concurrent writer can
    /// invalidate before commit. Commits on `Ok`, rolls back on `Err`.
    pub fn with_tx<T, E>(&self, f: impl FnOnce(&Transaction) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let result = f(&tx)?;

        tx.commit().map_err(StoreError::from)?;
        Ok(result)
    }

    /// Run a read-only closure on a pooled connection, outside any
    /// explicit transaction.
    pub fn read<T, E>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn()?;
        f(&conn)
    }

    /// Create tables and indexes
    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER UNIQUE,
                username TEXT,
                wallet_address TEXT,
                stars_balance INTEGER NOT NULL DEFAULT 0 CHECK (stars_balance >= 0),
                ton_balance INTEGER NOT NULL DEFAULT 0 CHECK (ton_balance >= 0),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS game_bets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                bet_amount INTEGER NOT NULL CHECK (bet_amount > 0),
                currency TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                rows_count INTEGER NOT NULL,
                multiplier_milli INTEGER,
                payout INTEGER NOT NULL DEFAULT 0,
                profit INTEGER NOT NULL DEFAULT 0,
                is_win INTEGER NOT NULL DEFAULT 0,
                ball_path TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_game_bets_user_id ON game_bets(user_id);
            CREATE INDEX IF NOT EXISTS idx_game_bets_pending
                ON game_bets(user_id) WHERE multiplier_milli IS NULL;

            CREATE TABLE IF NOT EXISTS withdrawals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                amount INTEGER NOT NULL CHECK (amount > 0),
                fee INTEGER NOT NULL DEFAULT 0,
                net_amount INTEGER NOT NULL,
                wallet_address TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN
                    ('pending','processing','completed','failed','cancelled','manual_review')),
                auto_process INTEGER NOT NULL DEFAULT 0,
                transaction_hash TEXT,
                error_message TEXT,
                admin_notes TEXT,
                reviewed_by INTEGER REFERENCES users(id),
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_withdrawals_user_id ON withdrawals(user_id);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawals(status);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_created_at ON withdrawals(created_at);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_auto_process ON withdrawals(auto_process);

            CREATE TABLE IF NOT EXISTS deposits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                amount INTEGER NOT NULL CHECK (amount > 0),
                wallet_address TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','confirmed')),
                transaction_hash TEXT UNIQUE,
                confirmed_at INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_deposits_user_id ON deposits(user_id);

            CREATE TABLE IF NOT EXISTS star_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                telegram_id INTEGER NOT NULL,
                amount INTEGER NOT NULL CHECK (amount > 0),
                payload TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','completed','failed')),
                telegram_payment_charge_id TEXT,
                provider_payment_charge_id TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_star_transactions_telegram_id
                ON star_transactions(telegram_id);
            "#,
        )?;

        Ok(())
    }
}

/// Map a rusqlite error to `Duplicate` when it is a unique-constraint
/// violation (extended codes 1555 and 2067), otherwise to `Database`.
pub(crate) fn map_constraint_err(e: rusqlite::Error, what: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.extended_code == 1555 || err.extended_code == 2067 {
            return StoreError::Duplicate(what.to_string());
        }
    }
    StoreError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Db::in_memory().unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn test_with_tx_rolls_back_on_error() {
        let db = Db::in_memory().unwrap();

        let result: Result<(), StoreError> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (telegram_id, stars_balance, ton_balance, created_at, updated_at)
                 VALUES (1, 0, 0, 0, 0)",
                [],
            )?;
            Err(StoreError::Database("forced".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_with_tx_commits_on_ok() {
        let db = Db::in_memory().unwrap();

        db.with_tx::<_, StoreError>(|tx| {
            tx.execute(
                "INSERT INTO users (telegram_id, stars_balance, ton_balance, created_at, updated_at)
                 VALUES (1, 0, 0, 0, 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
