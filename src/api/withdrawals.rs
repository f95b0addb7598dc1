//! Withdrawal Endpoints

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{error_response, SharedAppState};
use crate::error::ServiceError;
use crate::types::withdrawal::WithdrawalRecord;
use crate::units;
use crate::withdrawals::StuckAction;

/// Withdrawal fields as the API reports them, TON amounts in decimal
#[derive(Debug, Serialize)]
pub struct WithdrawalDto {
    pub id: i64,
    pub user_id: i64,
    pub amount: f64,
    pub fee: f64,
    pub net_amount: f64,
    pub wallet_address: String,
    pub status: String,
    pub auto_process: bool,
    pub transaction_hash: Option<String>,
    pub error_message: Option<String>,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<i64>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl From<&WithdrawalRecord> for WithdrawalDto {
    fn from(w: &WithdrawalRecord) -> Self {
        Self {
            id: w.id,
            user_id: w.user_id,
            amount: units::nano_to_ton(w.amount),
            fee: units::nano_to_ton(w.fee),
            net_amount: units::nano_to_ton(w.net_amount),
            wallet_address: w.wallet_address.clone(),
            status: w.status.to_string(),
            auto_process: w.auto_process,
            transaction_hash: w.transaction_hash.clone(),
            error_message: w.error_message.clone(),
            admin_notes: w.admin_notes.clone(),
            reviewed_by: w.reviewed_by,
            created_at: w.created_at,
            completed_at: w.completed_at,
        }
    }
}

/// Admin recovery endpoints authenticate with a shared-secret header
pub(crate) fn check_admin(state: &SharedAppState, headers: &HeaderMap) -> Result<(), ServiceError> {
    let provided = headers
        .get("x-admin-password")
        .and_then(|v| v.to_str().ok());

    match (&state.admin_password, provided) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        _ => Err(ServiceError::Unauthorized),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub user_id: i64,
    pub amount: f64,
    pub wallet_address: String,
}

/// POST /api/withdrawals/create
///
/// Reserve funds and queue the request. Responds as soon as the request is
/// committed; processing runs in the background for auto-process rows.
pub async fn handle_create(
    State(state): State<SharedAppState>,
    Json(req): Json<CreateRequest>,
) -> Response {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return error_response(&ServiceError::validation("amount must be greater than 0"));
    }

    match state.withdrawals.create(
        req.user_id,
        units::ton_to_nano(req.amount),
        &req.wallet_address,
    ) {
        Ok(record) => {
            if record.auto_process
                && record.status == crate::types::withdrawal::WithdrawalStatus::Pending
            {
                state.withdrawals.clone().spawn_process(record.id);
            }

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "withdrawal": WithdrawalDto::from(&record),
                    "message": "Withdrawal request created successfully. Processing...",
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub withdrawal_id: i64,
}

/// POST /api/withdrawals/process
///
/// Drive one withdrawal through the chain transfer. Safe to call again;
/// a completed withdrawal replays its stored result.
pub async fn handle_process(
    State(state): State<SharedAppState>,
    Json(req): Json<ProcessRequest>,
) -> Response {
    match state.withdrawals.process(req.withdrawal_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "withdrawal": WithdrawalDto::from(&record),
                "message": "Withdrawal completed successfully!",
            })),
        )
            .into_response(),
        Err(ServiceError::ExternalTransfer(reason)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": false,
                "error": "Transaction failed. Funds returned to your balance.",
                "code": "TRANSFER_FAILED",
                "details": reason,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/withdrawals/auto-process
pub async fn handle_auto_process(State(state): State<SharedAppState>) -> Response {
    match state.withdrawals.auto_process_batch().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "processed_count": summary.processed_count,
                "results": summary.results,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/withdrawals/auto-process
///
/// Queue statistics for the sweep-eligible rows.
pub async fn handle_queue_stats(State(state): State<SharedAppState>) -> Response {
    match state.withdrawals.stats(true) {
        Ok(stats) => {
            let queue_stats: serde_json::Map<String, serde_json::Value> = stats
                .into_iter()
                .map(|(status, count, total)| {
                    (
                        status,
                        serde_json::json!({
                            "count": count,
                            "total_amount": units::nano_to_ton(total),
                        }),
                    )
                })
                .collect();

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "queue_stats": queue_stats,
                    "auto_process_enabled": state.withdrawals.auto_process_enabled(),
                    "auto_process_threshold":
                        units::nano_to_ton(state.withdrawals.auto_process_threshold()),
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/withdrawals/:id
pub async fn handle_status(
    State(state): State<SharedAppState>,
    Path(withdrawal_id): Path<i64>,
) -> Response {
    match state.withdrawals.get(withdrawal_id) {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "withdrawal": WithdrawalDto::from(&record),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/withdrawals/stuck
pub async fn handle_stuck_list(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = check_admin(&state, &headers) {
        return error_response(&e);
    }

    match state.withdrawals.stuck() {
        Ok(stuck) => {
            let total: u64 = stuck.iter().map(|w| w.amount).sum();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "stuck_withdrawals": stuck.iter().map(WithdrawalDto::from).collect::<Vec<_>>(),
                    "count": stuck.len(),
                    "total_amount": units::nano_to_ton(total),
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StuckRecoverRequest {
    pub action: String,
    pub withdrawal_ids: Option<Vec<i64>>,
}

/// POST /api/withdrawals/stuck
pub async fn handle_stuck_recover(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    Json(req): Json<StuckRecoverRequest>,
) -> Response {
    if let Err(e) = check_admin(&state, &headers) {
        return error_response(&e);
    }

    let action = match req.action.as_str() {
        "reset_to_pending" => StuckAction::ResetToPending,
        "cancel_and_refund" => StuckAction::CancelAndRefund,
        _ => {
            return error_response(&ServiceError::validation(
                "invalid action, use 'reset_to_pending' or 'cancel_and_refund'",
            ))
        }
    };

    match state
        .withdrawals
        .recover_stuck(action, req.withdrawal_ids.as_deref())
    {
        Ok(affected) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "action": req.action,
                "affected_count": affected.len(),
                "withdrawals": affected.iter().map(WithdrawalDto::from).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub withdrawal_id: i64,
    pub reason: Option<String>,
}

/// POST /api/withdrawals/refund
///
/// Emergency cancel-and-refund; refused once completed.
pub async fn handle_refund(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> Response {
    if let Err(e) = check_admin(&state, &headers) {
        return error_response(&e);
    }

    let reason = req.reason.as_deref().unwrap_or("cancelled by admin");
    match state.withdrawals.cancel_and_refund(req.withdrawal_id, reason) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Withdrawal cancelled and funds returned to game balance.",
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
