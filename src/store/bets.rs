//! Bet Table Operations

use rusqlite::{params, OptionalExtension, Transaction};

use super::db::{StoreError, StoreResult};
use crate::types::bet::{BetRecord, RiskLevel};
use crate::types::unix_now;
use crate::types::user::Currency;

fn row_to_bet(row: &rusqlite::Row) -> rusqlite::Result<BetRecord> {
    let currency: String = row.get("currency")?;
    let risk_level: String = row.get("risk_level")?;
    let ball_path: String = row.get("ball_path")?;

    Ok(BetRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        bet_amount: row.get::<_, i64>("bet_amount")? as u64,
        currency: currency.parse().unwrap_or(Currency::Stars),
        risk_level: risk_level.parse().unwrap_or(RiskLevel::Low),
        rows_count: row.get::<_, i64>("rows_count")? as u8,
        multiplier_milli: row
            .get::<_, Option<i64>>("multiplier_milli")?
            .map(|m| m as u32),
        payout: row.get::<_, i64>("payout")? as u64,
        profit: row.get("profit")?,
        is_win: row.get("is_win")?,
        ball_path: serde_json::from_str(&ball_path).unwrap_or_default(),
        created_at: row.get::<_, i64>("created_at")? as u64,
        updated_at: row.get::<_, i64>("updated_at")? as u64,
    })
}

/// Insert a pending bet (multiplier NULL)
pub fn insert(
    tx: &Transaction,
    user_id: i64,
    bet_amount: u64,
    currency: Currency,
    risk_level: RiskLevel,
    rows_count: u8,
) -> StoreResult<BetRecord> {
    let now = unix_now();
    tx.execute(
        r#"
        INSERT INTO game_bets (user_id, bet_amount, currency, risk_level, rows_count,
                               multiplier_milli, payout, profit, is_win, ball_path,
                               created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, 0, 0, '[]', ?6, ?6)
        "#,
        params![
            user_id,
            bet_amount as i64,
            currency.to_string(),
            risk_level.to_string(),
            rows_count as i64,
            now as i64,
        ],
    )?;

    let id = tx.last_insert_rowid();
    get(tx, id, user_id)?.ok_or_else(|| StoreError::NotFound(format!("bet {}", id)))
}

/// Get a bet by ID, scoped to its owner
pub fn get(tx: &Transaction, bet_id: i64, user_id: i64) -> StoreResult<Option<BetRecord>> {
    let bet = tx
        .query_row(
            "SELECT * FROM game_bets WHERE id = ?1 AND user_id = ?2",
            params![bet_id, user_id],
            row_to_bet,
        )
        .optional()?;
    Ok(bet)
}

/// Persist a resolved bet's outcome fields
pub fn update_resolution(tx: &Transaction, bet: &BetRecord) -> StoreResult<()> {
    let multiplier = bet
        .multiplier_milli
        .ok_or_else(|| StoreError::Database("update_resolution on pending bet".to_string()))?;

    let ball_path = serde_json::to_string(&bet.ball_path)
        .map_err(|e| StoreError::Database(e.to_string()))?;

    let rows = tx.execute(
        r#"
        UPDATE game_bets
        SET multiplier_milli = ?1, payout = ?2, profit = ?3, is_win = ?4,
            ball_path = ?5, updated_at = ?6
        WHERE id = ?7
        "#,
        params![
            multiplier as i64,
            bet.payout as i64,
            bet.profit,
            bet.is_win,
            ball_path,
            bet.updated_at as i64,
            bet.id,
        ],
    )?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!("bet {}", bet.id)));
    }
    Ok(())
}

/// All of a user's unresolved bets, oldest first
pub fn pending_for_user(tx: &Transaction, user_id: i64) -> StoreResult<Vec<BetRecord>> {
    let mut stmt = tx.prepare(
        "SELECT * FROM game_bets WHERE user_id = ?1 AND multiplier_milli IS NULL ORDER BY id ASC",
    )?;

    let bets = stmt
        .query_map(params![user_id], row_to_bet)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bets)
}

/// A user's bet history, newest first
pub fn history_for_user(
    tx: &Transaction,
    user_id: i64,
    limit: u32,
    offset: u32,
) -> StoreResult<Vec<BetRecord>> {
    let mut stmt = tx.prepare(
        "SELECT * FROM game_bets WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
    )?;

    let bets = stmt
        .query_map(params![user_id, limit as i64, offset as i64], row_to_bet)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{users, Db};

    fn setup_user(db: &Db) -> i64 {
        db.with_tx::<_, StoreError>(|tx| {
            let user = users::create(tx, Some(1), None)?;
            users::credit(tx, user.id, Currency::Stars, 1000)?;
            Ok(user.id)
        })
        .unwrap()
    }

    #[test]
    fn test_insert_and_get_pending() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        let bet = db
            .with_tx::<_, StoreError>(|tx| {
                insert(tx, user_id, 10, Currency::Stars, RiskLevel::Medium, 8)
            })
            .unwrap();

        assert!(!bet.is_resolved());
        assert_eq!(bet.bet_amount, 10);
        assert_eq!(bet.risk_level, RiskLevel::Medium);
        assert_eq!(bet.rows_count, 8);
    }

    #[test]
    fn test_get_scopes_to_owner() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        let bet = db
            .with_tx::<_, StoreError>(|tx| {
                insert(tx, user_id, 10, Currency::Stars, RiskLevel::Low, 8)
            })
            .unwrap();

        let other: Option<BetRecord> = db
            .with_tx::<_, StoreError>(|tx| get(tx, bet.id, user_id + 1))
            .unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn test_resolution_round_trip() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        let resolved = db
            .with_tx::<_, StoreError>(|tx| {
                let mut bet = insert(tx, user_id, 10, Currency::Stars, RiskLevel::Medium, 8)?;
                bet.resolve(3000, vec![0, 1, 2, 2, 3, 3, 4, 4]);
                update_resolution(tx, &bet)?;
                Ok(get(tx, bet.id, user_id)?.unwrap())
            })
            .unwrap();

        assert_eq!(resolved.multiplier_milli, Some(3000));
        assert_eq!(resolved.payout, 30);
        assert_eq!(resolved.profit, 20);
        assert_eq!(resolved.ball_path, vec![0, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn test_pending_listing_excludes_resolved() {
        let db = Db::in_memory().unwrap();
        let user_id = setup_user(&db);

        db.with_tx::<_, StoreError>(|tx| {
            let mut first = insert(tx, user_id, 10, Currency::Stars, RiskLevel::Low, 8)?;
            insert(tx, user_id, 20, Currency::Stars, RiskLevel::Low, 12)?;
            first.resolve(1000, vec![1; 8]);
            update_resolution(tx, &first)
        })
        .unwrap();

        let pending = db
            .with_tx::<_, StoreError>(|tx| pending_for_user(tx, user_id))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].bet_amount, 20);
    }
}
