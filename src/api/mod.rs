//! HTTP API
//!
//! Thin axum adapter over the settlement services. Handlers parse and
//! convert units, call one service method, and map the error taxonomy to
//! HTTP statuses; no settlement logic lives here.

mod admin;
mod bets;
mod deposits;
mod payments;
mod server;
mod withdrawals;

pub use server::{create_router, start_server, AppState, SharedAppState};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::ServiceError;
use crate::types::user::{Balances, Currency};
use crate::units;

/// Standard error body: machine-readable code plus a human message
pub(crate) fn error_response(err: &ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut body = serde_json::json!({
        "success": false,
        "error": err.to_string(),
        "code": err.error_code(),
    });

    if let ServiceError::InsufficientFunds {
        available,
        required,
    } = err
    {
        body["current_balance"] = serde_json::json!(available);
        body["required"] = serde_json::json!(required);
    }

    (status, Json(body)).into_response()
}

/// Balance pair as the API reports it: whole Stars, decimal TON
#[derive(Debug, serde::Serialize)]
pub(crate) struct BalanceDto {
    pub stars_balance: u64,
    pub ton_balance: f64,
}

impl From<Balances> for BalanceDto {
    fn from(b: Balances) -> Self {
        Self {
            stars_balance: b.stars_balance,
            ton_balance: units::nano_to_ton(b.ton_balance),
        }
    }
}

/// Convert a client-sent decimal amount into the currency's smallest unit
pub(crate) fn amount_from_display(currency: Currency, value: f64) -> Option<u64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Some(match currency {
        Currency::Stars => value.round() as u64,
        Currency::Ton => units::ton_to_nano(value),
    })
}

/// Convert a smallest-unit amount back to the display value
pub(crate) fn amount_to_display(currency: Currency, value: u64) -> f64 {
    match currency {
        Currency::Stars => value as f64,
        Currency::Ton => units::nano_to_ton(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_conversion() {
        assert_eq!(amount_from_display(Currency::Stars, 10.0), Some(10));
        assert_eq!(
            amount_from_display(Currency::Ton, 0.5),
            Some(500_000_000)
        );
        assert_eq!(amount_from_display(Currency::Ton, 0.0), None);
        assert_eq!(amount_from_display(Currency::Ton, f64::NAN), None);

        assert_eq!(amount_to_display(Currency::Ton, 4_950_000_000), 4.95);
        assert_eq!(amount_to_display(Currency::Stars, 30), 30.0);
    }

    #[test]
    fn test_error_body_carries_amounts() {
        let err = ServiceError::InsufficientFunds {
            available: 5,
            required: 10,
        };
        let resp = error_response(&err);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
