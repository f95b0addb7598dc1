//! Stars Payment Endpoints
//!
//! The client verify call and the Telegram webhook are two transports into
//! the same settlement transition; neither carries its own crediting logic.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{error_response, BalanceDto, SharedAppState};
use crate::error::ServiceError;
use crate::stars::SettleOutcome;

#[derive(Debug, Deserialize)]
pub struct StarsInitiateRequest {
    pub telegram_id: i64,
    pub amount: u64,
}

/// POST /api/payments/stars/initiate
pub async fn handle_stars_initiate(
    State(state): State<SharedAppState>,
    Json(req): Json<StarsInitiateRequest>,
) -> Response {
    match state.stars.initiate(req.telegram_id, req.amount).await {
        Ok(initiation) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "payload": initiation.payload,
                "invoice_url": initiation.invoice_url,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StarsVerifyRequest {
    pub telegram_id: i64,
    pub payload: String,
    pub amount: f64,
    #[serde(default)]
    pub telegram_payment_charge_id: String,
    #[serde(default)]
    pub provider_payment_charge_id: String,
}

/// POST /api/payments/stars/verify
pub async fn handle_stars_verify(
    State(state): State<SharedAppState>,
    Json(req): Json<StarsVerifyRequest>,
) -> Response {
    // Stars are integral; round off whatever the client sent
    let amount = req.amount.round();
    if !amount.is_finite() || amount <= 0.0 {
        return error_response(&ServiceError::validation("invalid amount"));
    }

    let outcome = state
        .stars
        .verify(
            req.telegram_id,
            &req.payload,
            amount as u64,
            &req.telegram_payment_charge_id,
            &req.provider_payment_charge_id,
        )
        .await;

    settlement_response(outcome)
}

fn settlement_response(outcome: Result<SettleOutcome, ServiceError>) -> Response {
    match outcome {
        Ok(SettleOutcome::Credited {
            transaction_id,
            balance,
            ..
        })
        | Ok(SettleOutcome::AlreadyCompleted {
            transaction_id,
            balance,
        }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "transaction_id": transaction_id,
                "balance": BalanceDto::from(balance),
            })),
        )
            .into_response(),
        Ok(SettleOutcome::AmountMismatch) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "payment amount does not match the recorded intent",
                "code": "AMOUNT_MISMATCH",
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// Webhook
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SuccessfulPayment {
    /// "XTR" for Stars
    pub currency: String,
    /// For Stars: number of stars
    pub total_amount: u64,
    pub invoice_payload: String,
    #[serde(default)]
    pub telegram_payment_charge_id: String,
    #[serde(default)]
    pub provider_payment_charge_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub chat: WebhookChat,
    pub successful_payment: Option<SuccessfulPayment>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookUpdate {
    pub message: Option<WebhookMessage>,
}

/// POST /api/telegram/webhook
///
/// Inbound payment callback. Authenticated by the secret-token header
/// Telegram echoes back; converges on the same settle transition as the
/// client verify call.
pub async fn handle_webhook(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    Json(update): Json<WebhookUpdate>,
) -> Response {
    let provided = headers
        .get("x-telegram-bot-api-secret-token")
        .and_then(|v| v.to_str().ok());

    let authorized = matches!(
        (&state.webhook_secret, provided),
        (Some(expected), Some(given)) if expected == given
    );
    if !authorized {
        return error_response(&ServiceError::Unauthorized);
    }

    let Some(message) = update.message else {
        return (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response();
    };
    let Some(payment) = message.successful_payment else {
        return (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response();
    };

    // only Stars payments settle here
    if payment.currency != "XTR" {
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "ignored": true })),
        )
            .into_response();
    }

    let outcome = state.stars.settle(
        message.chat.id,
        &payment.invoice_payload,
        payment.total_amount,
        &payment.telegram_payment_charge_id,
        &payment.provider_payment_charge_id,
    );

    match outcome {
        Ok(SettleOutcome::Credited { balance, .. }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "ok": true,
                "status": "credited",
                "balance": BalanceDto::from(balance),
            })),
        )
            .into_response(),
        Ok(SettleOutcome::AlreadyCompleted { .. }) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "status": "already_completed" })),
        )
            .into_response(),
        Ok(SettleOutcome::AmountMismatch) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "ok": false, "error": "amount_mismatch" })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
