//! API Server
//!
//! Application state, router construction, and server startup.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::bets::BetService;
use crate::config::AppConfig;
use crate::deposits::DepositService;
use crate::stars::StarsService;
use crate::store::Db;
use crate::telegram::TelegramApi;
use crate::ton::TonTransfer;
use crate::withdrawals::WithdrawalService;

use super::{admin, bets, deposits, payments, withdrawals};

/// Combined application state for all API endpoints
pub struct AppState {
    pub bets: BetService,
    pub withdrawals: Arc<WithdrawalService>,
    pub deposits: DepositService,
    pub stars: Arc<StarsService>,
    /// Shared secret for admin recovery endpoints; None refuses them all
    pub admin_password: Option<String>,
    /// Expected webhook header token; None refuses the webhook
    pub webhook_secret: Option<String>,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Wire the services from their dependencies
    pub fn new(
        db: Db,
        ton: Arc<dyn TonTransfer>,
        telegram: Arc<dyn TelegramApi>,
        config: &AppConfig,
    ) -> SharedAppState {
        Arc::new(Self {
            bets: BetService::new(db.clone()),
            withdrawals: Arc::new(WithdrawalService::new(db.clone(), Arc::clone(&ton), config)),
            deposits: DepositService::new(db.clone(), ton),
            stars: Arc::new(StarsService::new(db, telegram, config.max_stars_purchase)),
            admin_password: config
                .admin_password
                .as_ref()
                .map(|s| s.expose().to_string()),
            webhook_secret: config
                .telegram_webhook_secret
                .as_ref()
                .map(|s| s.expose().to_string()),
        })
    }
}

async fn handle_health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "plinko-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub fn create_router(state: SharedAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/bets/initiate", post(bets::handle_initiate))
        .route("/api/bets/resolve", post(bets::handle_resolve))
        .route("/api/bets/settle-pending", post(bets::handle_settle_pending))
        .route("/api/users/:id/balance", get(bets::handle_balance))
        .route("/api/users/:id/bets", get(bets::handle_history))
        .route(
            "/api/withdrawals/create",
            post(withdrawals::handle_create),
        )
        .route(
            "/api/withdrawals/process",
            post(withdrawals::handle_process),
        )
        .route(
            "/api/withdrawals/auto-process",
            post(withdrawals::handle_auto_process).get(withdrawals::handle_queue_stats),
        )
        .route(
            "/api/withdrawals/stuck",
            get(withdrawals::handle_stuck_list).post(withdrawals::handle_stuck_recover),
        )
        .route(
            "/api/withdrawals/refund",
            post(withdrawals::handle_refund),
        )
        .route(
            "/api/withdrawals/:id",
            get(withdrawals::handle_status),
        )
        .route(
            "/api/admin/withdrawals",
            get(admin::handle_list).post(admin::handle_action),
        )
        .route(
            "/api/payments/stars/initiate",
            post(payments::handle_stars_initiate),
        )
        .route(
            "/api/payments/stars/verify",
            post(payments::handle_stars_verify),
        )
        .route("/api/telegram/webhook", post(payments::handle_webhook))
        .route("/api/deposits/verify", post(deposits::handle_verify))
        .route("/api/users/:id/deposits", get(deposits::handle_history))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== Plinko Settlement API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /api/bets/initiate           - Debit stake, open bet");
    println!("  POST /api/bets/resolve            - Resolve bet, credit payout");
    println!("  POST /api/bets/settle-pending     - Settle a user's pending bets");
    println!("  POST /api/withdrawals/create      - Create withdrawal request");
    println!("  POST /api/withdrawals/process     - Drive a withdrawal on-chain");
    println!("  POST /api/withdrawals/auto-process - Run one sweep batch");
    println!("  POST /api/payments/stars/initiate - Issue a Stars invoice");
    println!("  POST /api/payments/stars/verify   - Settle a Stars payment");
    println!("  POST /api/deposits/verify         - Confirm an on-chain deposit");
    println!("  GET  /api/health                  - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::policy::{FeePolicy, WithdrawalPolicy};
    use crate::telegram::MockTelegramApi;
    use crate::ton::client::MockTonTransfer;
    use crate::units::ton_to_nano;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> SharedAppState {
        let config = AppConfig {
            network: Network::Testnet,
            toncenter_endpoint: "https://testnet.toncenter.com/api/v2".to_string(),
            toncenter_api_key: None,
            tonapi_base_url: "https://tonapi.io".to_string(),
            tonapi_key: None,
            wallet_address: "UQwallet".to_string(),
            wallet_daemon_url: None,
            wallet_daemon_token: None,
            withdrawal_policy: WithdrawalPolicy {
                fee_policy: FeePolicy::Fixed {
                    fee: ton_to_nano(0.01),
                },
                min_amount: ton_to_nano(0.1),
                max_amount: ton_to_nano(100.0),
                max_daily_amount: ton_to_nano(500.0),
                max_daily_count: 10,
                auto_process_enabled: true,
                auto_process_threshold: ton_to_nano(10.0),
                manual_review_threshold: ton_to_nano(50.0),
                min_account_age_hours: 0,
                min_deposit_before_withdrawal: 0,
            },
            confirm_timeout: std::time::Duration::from_millis(50),
            confirm_poll_interval: std::time::Duration::from_millis(10),
            sweep_batch_size: 10,
            max_stars_purchase: 10_000,
            db_path: String::new(),
            api_port: 0,
            log_level: "info".to_string(),
            admin_password: None,
            telegram_bot_token: None,
            telegram_webhook_secret: None,
        };

        AppState::new(
            Db::in_memory().unwrap(),
            Arc::new(MockTonTransfer::new()),
            Arc::new(MockTelegramApi::new()),
            &config,
        )
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_user_maps_to_404() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/bets/initiate")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"user_id": 999, "bet_amount": 10.0, "currency": "STARS", "risk_level": "MEDIUM", "rows_count": 8}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_endpoints_refused_without_password() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/withdrawals/stuck")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
