//! Bet Settlement
//!
//! Two-phase settlement: `initiate` debits the stake and writes a pending
//! bet, `resolve` sets the outcome exactly once and credits the payout.
//! `settle_pending` is the maintenance sweep that resolves everything a
//! user left hanging, in one lock acquisition.
//!
//! The stake is gone the moment a bet exists, so resolution credits the
//! full payout (stake x multiplier), not the profit.

use crate::error::{ServiceError, ServiceResult};
use crate::game;
use crate::logging::log_bet_event;
use crate::store::{bets, users, Db};
use crate::types::bet::{payout_amount, BetRecord, RiskLevel};
use crate::types::user::{Balances, Currency};

/// Client-reported outcome for a resolve call. The multiplier picks the
/// payout; the rest is a hint that gets cross-checked, never trusted.
#[derive(Debug, Clone)]
pub struct ClientOutcome {
    pub multiplier_milli: u32,
    pub payout: Option<u64>,
    pub profit: Option<i64>,
    pub ball_path: Vec<u8>,
}

/// Result of initiating a bet
#[derive(Debug, Clone)]
pub struct BetPlacement {
    pub bet: BetRecord,
    pub balance: Balances,
}

/// Result of resolving a bet
#[derive(Debug, Clone)]
pub struct BetResolution {
    pub bet: BetRecord,
    pub balance: Balances,
    /// True when the bet was already resolved and this call changed nothing
    pub idempotent: bool,
}

/// Result of the settle-pending sweep
#[derive(Debug, Clone)]
pub struct SettleSummary {
    pub settled: u32,
    /// Bets with no server-side multiplier table; they stay pending
    pub skipped: u32,
    pub balance: Balances,
}

/// Bet settlement engine
#[derive(Clone)]
pub struct BetService {
    db: Db,
}

impl BetService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Debit the stake and create a pending bet.
    pub fn initiate(
        &self,
        user_id: i64,
        bet_amount: u64,
        currency: Currency,
        risk_level: RiskLevel,
        rows_count: u8,
    ) -> ServiceResult<BetPlacement> {
        if bet_amount == 0 {
            return Err(ServiceError::validation("bet_amount must be greater than 0"));
        }
        if !game::valid_rows(rows_count) {
            return Err(ServiceError::validation(
                "rows_count must be an integer between 8 and 16",
            ));
        }

        let placement = self.db.with_tx(|tx| {
            users::debit(tx, user_id, currency, bet_amount)?;
            let bet = bets::insert(tx, user_id, bet_amount, currency, risk_level, rows_count)?;
            let balance = users::balances(tx, user_id)?;
            Ok::<_, ServiceError>(BetPlacement { bet, balance })
        })?;

        log_bet_event("bet_initiated", placement.bet.id, user_id, bet_amount, true);
        Ok(placement)
    }

    /// Resolve a pending bet and credit its payout.
    ///
    /// Idempotent: a second call for the same bet observes the already-set
    /// multiplier and returns the stored result without touching the
    /// balance, whatever multiplier it carries.
    pub fn resolve(
        &self,
        bet_id: i64,
        user_id: i64,
        outcome: ClientOutcome,
    ) -> ServiceResult<BetResolution> {
        let resolution = self.db.with_tx(|tx| {
            let mut bet = bets::get(tx, bet_id, user_id)?
                .ok_or_else(|| ServiceError::not_found(format!("bet {}", bet_id)))?;

            if bet.is_resolved() {
                let balance = users::balances(tx, user_id)?;
                return Ok::<_, ServiceError>(BetResolution {
                    bet,
                    balance,
                    idempotent: true,
                });
            }

            // When a server table exists the client multiplier must come
            // from it; unsupported row counts accept the client value as a
            // trusted result.
            if let Some(table) = game::multiplier_table(bet.risk_level, bet.rows_count) {
                if !table.contains(&outcome.multiplier_milli) {
                    return Err(ServiceError::validation(format!(
                        "multiplier {} is not valid for {} risk at {} rows",
                        outcome.multiplier_milli as f64 / 1000.0,
                        bet.risk_level,
                        bet.rows_count
                    )));
                }
            }

            cross_check_client_arithmetic(&bet, &outcome);

            bet.resolve(outcome.multiplier_milli, outcome.ball_path);
            bets::update_resolution(tx, &bet)?;
            users::credit(tx, user_id, bet.currency, bet.payout)?;

            let balance = users::balances(tx, user_id)?;
            Ok(BetResolution {
                bet,
                balance,
                idempotent: false,
            })
        })?;

        if !resolution.idempotent {
            log_bet_event(
                "bet_resolved",
                bet_id,
                user_id,
                resolution.bet.payout,
                true,
            );
        }
        Ok(resolution)
    }

    /// Resolve every pending bet a user has, simulating outcomes
    /// server-side. One net credit per currency keeps the lock short.
    /// Bets with unsupported row counts are left pending.
    pub fn settle_pending(&self, user_id: i64) -> ServiceResult<SettleSummary> {
        let summary = self.db.with_tx(|tx| {
            users::get_required(tx, user_id)?;

            let pending = bets::pending_for_user(tx, user_id)?;
            let mut stars_payout: u64 = 0;
            let mut ton_payout: u64 = 0;
            let mut settled: u32 = 0;
            let mut skipped: u32 = 0;

            for mut bet in pending {
                match game::simulate(bet.risk_level, bet.rows_count) {
                    Ok(outcome) => {
                        bet.resolve(outcome.multiplier_milli, outcome.ball_path);
                        bets::update_resolution(tx, &bet)?;
                        match bet.currency {
                            Currency::Stars => stars_payout += bet.payout,
                            Currency::Ton => ton_payout += bet.payout,
                        }
                        settled += 1;
                    }
                    Err(_) => skipped += 1,
                }
            }

            if stars_payout > 0 {
                users::credit(tx, user_id, Currency::Stars, stars_payout)?;
            }
            if ton_payout > 0 {
                users::credit(tx, user_id, Currency::Ton, ton_payout)?;
            }

            let balance = users::balances(tx, user_id)?;
            Ok::<_, ServiceError>(SettleSummary {
                settled,
                skipped,
                balance,
            })
        })?;

        if summary.settled > 0 {
            log_bet_event("bets_settled", 0, user_id, summary.settled as u64, true);
        }
        Ok(summary)
    }

    /// Fetch a single bet, scoped to its owner
    pub fn get(&self, bet_id: i64, user_id: i64) -> ServiceResult<BetRecord> {
        self.db.with_tx(|tx| {
            bets::get(tx, bet_id, user_id)?
                .ok_or_else(|| ServiceError::not_found(format!("bet {}", bet_id)))
        })
    }

    /// A user's bet history, newest first
    pub fn history(&self, user_id: i64, limit: u32, offset: u32) -> ServiceResult<Vec<BetRecord>> {
        self.db.with_tx(|tx| {
            users::get_required(tx, user_id)?;
            Ok(bets::history_for_user(tx, user_id, limit, offset)?)
        })
    }

    /// Current balances for a user
    pub fn balance(&self, user_id: i64) -> ServiceResult<Balances> {
        self.db.with_tx(|tx| Ok(users::balances(tx, user_id)?))
    }
}

/// Compare client-sent payout/profit against the server derivation within
/// the numeric tolerance of the currency's smallest unit. Mismatches are
/// logged and ignored; the server values are what gets credited.
fn cross_check_client_arithmetic(bet: &BetRecord, outcome: &ClientOutcome) {
    let expected_payout = payout_amount(bet.bet_amount, outcome.multiplier_milli);
    let tolerance: u64 = match bet.currency {
        Currency::Ton => 1_000, // 1e-6 TON
        Currency::Stars => 0,
    };

    if let Some(client_payout) = outcome.payout {
        if client_payout.abs_diff(expected_payout) > tolerance {
            tracing::warn!(
                target: "plinko::bet",
                bet_id = bet.id,
                client_payout,
                expected_payout,
                "client payout out of tolerance, using server value"
            );
        }
    }

    if let Some(client_profit) = outcome.profit {
        let expected_profit = expected_payout as i64 - bet.bet_amount as i64;
        if (client_profit - expected_profit).unsigned_abs() > tolerance {
            tracing::warn!(
                target: "plinko::bet",
                bet_id = bet.id,
                client_profit,
                expected_profit,
                "client profit out of tolerance, using server value"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    fn setup() -> (BetService, i64) {
        let db = Db::in_memory().unwrap();
        let user_id = db
            .with_tx::<_, StoreError>(|tx| {
                let user = users::create(tx, Some(1), None)?;
                users::credit(tx, user.id, Currency::Stars, 100)?;
                users::credit(tx, user.id, Currency::Ton, 10_000_000_000)?;
                Ok(user.id)
            })
            .unwrap();
        (BetService::new(db), user_id)
    }

    fn outcome(multiplier_milli: u32) -> ClientOutcome {
        ClientOutcome {
            multiplier_milli,
            payout: None,
            profit: None,
            ball_path: vec![0, 1, 1, 2, 3, 3, 4, 4],
        }
    }

    #[test]
    fn test_initiate_debits_stake() {
        let (service, user_id) = setup();

        let placement = service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Medium, 8)
            .unwrap();

        assert!(!placement.bet.is_resolved());
        assert_eq!(placement.balance.stars_balance, 90);
        assert_eq!(placement.balance.ton_balance, 10_000_000_000);
    }

    #[test]
    fn test_initiate_insufficient_balance() {
        let (service, user_id) = setup();

        let err = service
            .initiate(user_id, 200, Currency::Stars, RiskLevel::Low, 8)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientFunds {
                available: 100,
                required: 200
            }
        ));

        // nothing was mutated
        assert_eq!(service.balance(user_id).unwrap().stars_balance, 100);
    }

    #[test]
    fn test_initiate_rejects_bad_rows() {
        let (service, user_id) = setup();

        let err = service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Low, 7)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_resolve_credits_payout() {
        // stake 10 STARS, MEDIUM/8, multiplier 3 -> payout 30, profit 20
        let (service, user_id) = setup();

        let placement = service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Medium, 8)
            .unwrap();
        let resolution = service
            .resolve(placement.bet.id, user_id, outcome(3000))
            .unwrap();

        assert!(!resolution.idempotent);
        assert_eq!(resolution.bet.payout, 30);
        assert_eq!(resolution.bet.profit, 20);
        assert!(resolution.bet.is_win);
        // 100 - 10 + 30
        assert_eq!(resolution.balance.stars_balance, 120);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (service, user_id) = setup();

        let placement = service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Medium, 8)
            .unwrap();
        let first = service
            .resolve(placement.bet.id, user_id, outcome(3000))
            .unwrap();

        // second call with a different multiplier changes nothing
        let second = service
            .resolve(placement.bet.id, user_id, outcome(13_000))
            .unwrap();

        assert!(second.idempotent);
        assert_eq!(second.bet.multiplier_milli, first.bet.multiplier_milli);
        assert_eq!(second.bet.payout, first.bet.payout);
        assert_eq!(second.balance, first.balance);
    }

    #[test]
    fn test_resolve_rejects_multiplier_outside_table() {
        let (service, user_id) = setup();

        let placement = service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Medium, 8)
            .unwrap();
        let err = service
            .resolve(placement.bet.id, user_id, outcome(7777))
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        // stake stays debited, nothing credited
        assert_eq!(service.balance(user_id).unwrap().stars_balance, 90);
    }

    #[test]
    fn test_resolve_accepts_client_multiplier_for_unsupported_rows() {
        // rows 10 has no server table; the client result is trusted but the
        // arithmetic is recomputed server-side
        let (service, user_id) = setup();

        let placement = service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Medium, 10)
            .unwrap();
        let resolution = service
            .resolve(
                placement.bet.id,
                user_id,
                ClientOutcome {
                    multiplier_milli: 2500,
                    payout: Some(25),
                    profit: Some(15),
                    ball_path: vec![1; 10],
                },
            )
            .unwrap();

        assert_eq!(resolution.bet.payout, 25);
        assert_eq!(resolution.bet.profit, 15);
        assert_eq!(resolution.balance.stars_balance, 115);
    }

    #[test]
    fn test_resolve_unknown_bet() {
        let (service, user_id) = setup();
        let err = service.resolve(999, user_id, outcome(3000)).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_settle_pending_resolves_supported_and_skips_rest() {
        let (service, user_id) = setup();

        service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Low, 8)
            .unwrap();
        service
            .initiate(user_id, 20, Currency::Stars, RiskLevel::Medium, 12)
            .unwrap();
        // rows 10 cannot be simulated; stays pending
        service
            .initiate(user_id, 5, Currency::Stars, RiskLevel::Low, 10)
            .unwrap();

        let summary = service.settle_pending(user_id).unwrap();
        assert_eq!(summary.settled, 2);
        assert_eq!(summary.skipped, 1);

        // settled bets are gone from the pending set, the skipped one remains
        let second = service.settle_pending(user_id).unwrap();
        assert_eq!(second.settled, 0);
        assert_eq!(second.skipped, 1);
    }

    #[test]
    fn test_settle_pending_credits_payout_per_bet() {
        // With every LOW/8 multiplier >= 0.5x, a settled bet always credits
        // at least half its stake back.
        let (service, user_id) = setup();

        service
            .initiate(user_id, 40, Currency::Stars, RiskLevel::Low, 8)
            .unwrap();
        assert_eq!(service.balance(user_id).unwrap().stars_balance, 60);

        let summary = service.settle_pending(user_id).unwrap();
        assert_eq!(summary.settled, 1);
        assert!(summary.balance.stars_balance >= 80);
    }

    #[test]
    fn test_history() {
        let (service, user_id) = setup();

        service
            .initiate(user_id, 10, Currency::Stars, RiskLevel::Low, 8)
            .unwrap();
        service
            .initiate(user_id, 20, Currency::Ton, RiskLevel::High, 16)
            .unwrap();

        let history = service.history(user_id, 10, 0).unwrap();
        assert_eq!(history.len(), 2);
        // newest first
        assert_eq!(history[0].bet_amount, 20);
    }
}
