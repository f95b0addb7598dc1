//! Admin Withdrawal Review Endpoints

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::withdrawals::WithdrawalDto;
use super::{error_response, SharedAppState};
use crate::error::ServiceError;
use crate::types::withdrawal::WithdrawalStatus;
use crate::units;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub user_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/admin/withdrawals
///
/// Filtered listing plus per-status aggregates.
pub async fn handle_list(
    State(state): State<SharedAppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None | Some("all") => None,
        Some(s) => match s.parse::<WithdrawalStatus>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                return error_response(&ServiceError::validation(format!(
                    "unknown status filter: {}",
                    s
                )))
            }
        },
    };

    let listing = state
        .withdrawals
        .list(status, query.user_id, query.limit, query.offset)
        .and_then(|withdrawals| Ok((withdrawals, state.withdrawals.stats(false)?)));

    match listing {
        Ok((withdrawals, stats)) => {
            let stats: serde_json::Map<String, serde_json::Value> = stats
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
                    "withdrawals": withdrawals.iter().map(WithdrawalDto::from).collect::<Vec<_>>(),
                    "stats": stats,
                    "pagination": {
                        "limit": query.limit,
                        "offset": query.offset,
                        "total": withdrawals.len(),
                    },
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    pub withdrawal_id: i64,
    pub admin_id: i64,
    pub admin_notes: Option<String>,
    pub reject_reason: Option<String>,
}

/// POST /api/admin/withdrawals
///
/// Review actions: approve (back into the pending queue, processing
/// triggered for auto rows), reject (refund), add_note.
pub async fn handle_action(
    State(state): State<SharedAppState>,
    Json(req): Json<ActionRequest>,
) -> Response {
    let result = match req.action.as_str() {
        "approve" => state
            .withdrawals
            .approve(req.withdrawal_id, req.admin_id, req.admin_notes.clone())
            .map(|record| {
                if record.auto_process {
                    state.withdrawals.clone().spawn_process(record.id);
                }
                record
            }),
        "reject" => state.withdrawals.reject(
            req.withdrawal_id,
            req.admin_id,
            req.reject_reason.clone(),
        ),
        "add_note" => match req.admin_notes.as_deref() {
            Some(note) if !note.is_empty() => {
                state
                    .withdrawals
                    .add_note(req.withdrawal_id, req.admin_id, note)
            }
            _ => Err(ServiceError::validation("admin_notes is required for add_note")),
        },
        _ => Err(ServiceError::validation("invalid action")),
    };

    match result {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "withdrawal": WithdrawalDto::from(&record),
                "message": format!("Withdrawal {} successful", req.action),
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
