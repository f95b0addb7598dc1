//! Bet Endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{amount_from_display, amount_to_display, error_response, BalanceDto, SharedAppState};
use crate::bets::ClientOutcome;
use crate::error::ServiceError;
use crate::types::bet::{multiplier_to_milli, BetRecord, RiskLevel};
use crate::types::user::Currency;

/// Bet fields as the API reports them, amounts in display units
#[derive(Debug, Serialize)]
pub struct BetDto {
    pub id: i64,
    pub user_id: i64,
    pub bet_amount: f64,
    pub currency: Currency,
    pub risk_level: RiskLevel,
    pub rows_count: u8,
    pub multiplier: Option<f64>,
    pub payout: f64,
    pub profit: f64,
    pub is_win: bool,
    pub ball_path: Vec<u8>,
    pub created_at: u64,
}

impl From<&BetRecord> for BetDto {
    fn from(bet: &BetRecord) -> Self {
        Self {
            id: bet.id,
            user_id: bet.user_id,
            bet_amount: amount_to_display(bet.currency, bet.bet_amount),
            currency: bet.currency,
            risk_level: bet.risk_level,
            rows_count: bet.rows_count,
            multiplier: bet.multiplier(),
            payout: amount_to_display(bet.currency, bet.payout),
            profit: match bet.currency {
                Currency::Stars => bet.profit as f64,
                Currency::Ton => bet.profit as f64 / crate::units::NANO_PER_TON as f64,
            },
            is_win: bet.is_win,
            ball_path: bet.ball_path.clone(),
            created_at: bet.created_at,
        }
    }
}

fn default_currency() -> Currency {
    Currency::Stars
}

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub user_id: i64,
    pub bet_amount: f64,
    #[serde(default = "default_currency")]
    pub currency: Currency,
    pub risk_level: RiskLevel,
    pub rows_count: u8,
}

/// POST /api/bets/initiate
///
/// Debit the stake and open a pending bet.
pub async fn handle_initiate(
    State(state): State<SharedAppState>,
    Json(req): Json<InitiateRequest>,
) -> Response {
    let Some(stake) = amount_from_display(req.currency, req.bet_amount) else {
        return error_response(&ServiceError::validation("invalid bet_amount"));
    };

    match state
        .bets
        .initiate(req.user_id, stake, req.currency, req.risk_level, req.rows_count)
    {
        Ok(placement) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "bet": BetDto::from(&placement.bet),
                "balance": BalanceDto::from(placement.balance),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub bet_id: i64,
    pub user_id: i64,
    pub multiplier: f64,
    pub payout: Option<f64>,
    pub profit: Option<f64>,
    #[serde(default)]
    pub ball_path: Vec<u8>,
}

/// POST /api/bets/resolve
///
/// Resolve a pending bet. Replaying a resolved bet returns the stored
/// outcome unchanged.
pub async fn handle_resolve(
    State(state): State<SharedAppState>,
    Json(req): Json<ResolveRequest>,
) -> Response {
    let Some(multiplier_milli) = multiplier_to_milli(req.multiplier) else {
        return error_response(&ServiceError::validation("invalid multiplier"));
    };

    // client payout/profit hints arrive in display units; the service
    // compares them in smallest units
    let currency = match state.bets.get(req.bet_id, req.user_id) {
        Ok(bet) => bet.currency,
        Err(e) => return error_response(&e),
    };

    let outcome = ClientOutcome {
        multiplier_milli,
        payout: req.payout.and_then(|p| amount_from_display(currency, p)),
        profit: req.profit.map(|p| match currency {
            Currency::Stars => p.round() as i64,
            Currency::Ton => (p * crate::units::NANO_PER_TON as f64).round() as i64,
        }),
        ball_path: req.ball_path,
    };

    match state.bets.resolve(req.bet_id, req.user_id, outcome) {
        Ok(resolution) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "bet": BetDto::from(&resolution.bet),
                "balance": BalanceDto::from(resolution.balance),
                "idempotent": resolution.idempotent,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SettlePendingRequest {
    pub user_id: i64,
}

/// POST /api/bets/settle-pending
pub async fn handle_settle_pending(
    State(state): State<SharedAppState>,
    Json(req): Json<SettlePendingRequest>,
) -> Response {
    match state.bets.settle_pending(req.user_id) {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "settled": summary.settled,
                "skipped": summary.skipped,
                "balance": BalanceDto::from(summary.balance),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/users/:id/balance
pub async fn handle_balance(
    State(state): State<SharedAppState>,
    Path(user_id): Path<i64>,
) -> Response {
    match state.bets.balance(user_id) {
        Ok(balance) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "balance": BalanceDto::from(balance),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/users/:id/bets
pub async fn handle_history(
    State(state): State<SharedAppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.bets.history(user_id, query.limit, query.offset) {
        Ok(bets) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "bets": bets.iter().map(BetDto::from).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
