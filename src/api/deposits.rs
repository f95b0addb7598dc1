//! Deposit Endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{error_response, SharedAppState};
use crate::deposits::DepositVerification;
use crate::error::ServiceError;
use crate::units;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub user_id: i64,
    pub amount: f64,
    pub wallet_address: String,
}

/// POST /api/deposits/verify
///
/// Confirm a claimed on-chain deposit. No record is written unless a
/// matching transaction is found.
pub async fn handle_verify(
    State(state): State<SharedAppState>,
    Json(req): Json<VerifyRequest>,
) -> Response {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return error_response(&ServiceError::validation("invalid amount"));
    }

    match state
        .deposits
        .verify_deposit(
            req.user_id,
            units::ton_to_nano(req.amount),
            &req.wallet_address,
        )
        .await
    {
        Ok(DepositVerification::Confirmed { deposit, balance }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "confirmed": true,
                "deposit": {
                    "id": deposit.id,
                    "user_id": deposit.user_id,
                    "amount": units::nano_to_ton(deposit.amount),
                    "wallet_address": deposit.wallet_address,
                    "status": deposit.status.to_string(),
                    "transaction_hash": deposit.transaction_hash,
                    "confirmed_at": deposit.confirmed_at,
                },
                "balance": super::BalanceDto::from(balance),
                "message": "Deposit confirmed and balance updated.",
            })),
        )
            .into_response(),
        Ok(DepositVerification::NotConfirmed { reason }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": false,
                "confirmed": false,
                "message": reason,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/users/:id/deposits
pub async fn handle_history(
    State(state): State<SharedAppState>,
    Path(user_id): Path<i64>,
) -> Response {
    match state.deposits.history(user_id, 50) {
        Ok(deposits) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "deposits": deposits
                    .iter()
                    .map(|d| serde_json::json!({
                        "id": d.id,
                        "amount": units::nano_to_ton(d.amount),
                        "wallet_address": d.wallet_address,
                        "status": d.status.to_string(),
                        "transaction_hash": d.transaction_hash,
                        "confirmed_at": d.confirmed_at,
                    }))
                    .collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
