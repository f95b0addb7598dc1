//! Environment-based Configuration
//!
//! All settings come from environment variables; sensitive values (wallet
//! mnemonic, bot token) are never hardcoded and never logged.
//!
//! # Environment Variables
//!
//! ## Network
//! - `PLINKO_NETWORK` - "mainnet" or "testnet" (default: "testnet")
//! - `PLINKO_TONCENTER_ENDPOINT` - TonCenter JSON-RPC endpoint
//! - `PLINKO_TONCENTER_API_KEY` - TonCenter API key (optional)
//! - `PLINKO_TONAPI_BASE_URL` - TonAPI base URL (default: https://tonapi.io)
//! - `PLINKO_TONAPI_KEY` - TonAPI bearer token (optional)
//!
//! ## Platform wallet
//! - `PLINKO_WALLET_ADDRESS` - game wallet address (receives deposits,
//!   sends withdrawals)
//! - `PLINKO_WALLET_DAEMON_URL` - local signer daemon holding the wallet
//!   key; withdrawals are refused when absent
//! - `PLINKO_WALLET_DAEMON_TOKEN` - bearer token for the signer daemon
//!   (secret)
//!
//! ## Withdrawal policy
//! - `PLINKO_FEE_POLICY` - "fixed" or "proportional" (default: "fixed")
//! - `PLINKO_FIXED_FEE_TON`, `PLINKO_PERCENTAGE_FEE`
//! - `PLINKO_MIN_WITHDRAWAL_TON`, `PLINKO_MAX_WITHDRAWAL_TON`
//! - `PLINKO_MAX_DAILY_AMOUNT_TON`, `PLINKO_MAX_DAILY_COUNT`
//! - `PLINKO_AUTO_PROCESS_ENABLED`, `PLINKO_AUTO_PROCESS_THRESHOLD_TON`,
//!   `PLINKO_MANUAL_REVIEW_THRESHOLD_TON`
//! - `PLINKO_MIN_ACCOUNT_AGE_HOURS` (0 disables the check)
//! - `PLINKO_MIN_DEPOSIT_BEFORE_WITHDRAWAL_TON` (0 disables the check)
//!
//! ## Processing
//! - `PLINKO_CONFIRM_TIMEOUT_SECS` - seqno confirmation wait (default: 60)
//! - `PLINKO_CONFIRM_POLL_INTERVAL_SECS` - poll interval (default: 4)
//! - `PLINKO_SWEEP_BATCH_SIZE` - auto-process batch bound (default: 10)
//!
//! ## Misc
//! - `PLINKO_DB_PATH` - SQLite database path (default: data/plinko.db)
//! - `PLINKO_API_PORT` - HTTP port (default: 3001)
//! - `PLINKO_LOG_LEVEL` - debug/info/warn/error (default: info)
//! - `PLINKO_ADMIN_PASSWORD` - shared secret for admin recovery endpoints
//! - `PLINKO_TELEGRAM_BOT_TOKEN` - bot token for Stars invoices (secret)
//! - `PLINKO_TELEGRAM_WEBHOOK_SECRET` - expected webhook header token

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::policy::{FeePolicy, WithdrawalPolicy};
use crate::units;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("network mismatch: expected {0}, got {1}")]
    NetworkMismatch(String, String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            _ => Err(ConfigError::InvalidValue(
                "PLINKO_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get default TonCenter JSON-RPC endpoint for this network
    pub fn default_toncenter_endpoint(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://toncenter.com/api/v2",
            Network::Testnet => "https://testnet.toncenter.com/api/v2",
        }
    }
}

/// An opaque secret loaded from the environment. Never printed.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Expose the secret value. Call sites must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Network environment
    pub network: Network,

    /// TonCenter JSON-RPC endpoint
    pub toncenter_endpoint: String,

    /// TonCenter API key
    pub toncenter_api_key: Option<Secret>,

    /// TonAPI base URL
    pub tonapi_base_url: String,

    /// TonAPI bearer token
    pub tonapi_key: Option<Secret>,

    /// Platform wallet address (canonical form is derived at startup)
    pub wallet_address: String,

    /// Local signer daemon that holds the wallet key; withdrawals are
    /// refused when absent
    pub wallet_daemon_url: Option<String>,

    /// Bearer token for the signer daemon
    pub wallet_daemon_token: Option<Secret>,

    /// Withdrawal fee/limit policy
    pub withdrawal_policy: WithdrawalPolicy,

    /// Seqno confirmation timeout
    pub confirm_timeout: Duration,

    /// Seqno poll interval
    pub confirm_poll_interval: Duration,

    /// Upper bound on withdrawals per auto-process sweep
    pub sweep_batch_size: u32,

    /// Maximum Stars purchase per invoice
    pub max_stars_purchase: u64,

    /// SQLite database path
    pub db_path: String,

    /// HTTP API port
    pub api_port: u16,

    /// Log level
    pub log_level: String,

    /// Shared secret for admin recovery endpoints
    pub admin_password: Option<Secret>,

    /// Telegram bot token for Stars invoices
    pub telegram_bot_token: Option<Secret>,

    /// Expected X-Telegram-Bot-Api-Secret-Token header value
    pub telegram_webhook_secret: Option<Secret>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("PLINKO_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .parse()?;

        let toncenter_endpoint = env::var("PLINKO_TONCENTER_ENDPOINT")
            .unwrap_or_else(|_| network.default_toncenter_endpoint().to_string());

        let tonapi_base_url = env::var("PLINKO_TONAPI_BASE_URL")
            .unwrap_or_else(|_| "https://tonapi.io".to_string());

        let wallet_address = env::var("PLINKO_WALLET_ADDRESS")
            .map_err(|_| ConfigError::MissingEnvVar("PLINKO_WALLET_ADDRESS".to_string()))?;

        let fee_policy = match env::var("PLINKO_FEE_POLICY")
            .unwrap_or_else(|_| "fixed".to_string())
            .to_lowercase()
            .as_str()
        {
            "fixed" => FeePolicy::Fixed {
                fee: ton_env("PLINKO_FIXED_FEE_TON", 0.01)?,
            },
            "proportional" => FeePolicy::ProportionalWithFloor {
                floor: ton_env("PLINKO_FIXED_FEE_TON", 0.01)?,
                rate_bp: (float_env("PLINKO_PERCENTAGE_FEE", 0.02)? * 10_000.0).round() as u32,
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "PLINKO_FEE_POLICY".to_string(),
                    format!("unknown policy: {} (use 'fixed' or 'proportional')", other),
                ))
            }
        };

        let withdrawal_policy = WithdrawalPolicy {
            fee_policy,
            min_amount: ton_env("PLINKO_MIN_WITHDRAWAL_TON", 0.1)?,
            max_amount: ton_env("PLINKO_MAX_WITHDRAWAL_TON", 100.0)?,
            max_daily_amount: ton_env("PLINKO_MAX_DAILY_AMOUNT_TON", 500.0)?,
            max_daily_count: int_env("PLINKO_MAX_DAILY_COUNT", 10)?,
            auto_process_enabled: bool_env("PLINKO_AUTO_PROCESS_ENABLED", true)?,
            auto_process_threshold: ton_env("PLINKO_AUTO_PROCESS_THRESHOLD_TON", 10.0)?,
            manual_review_threshold: ton_env("PLINKO_MANUAL_REVIEW_THRESHOLD_TON", 50.0)?,
            min_account_age_hours: int_env("PLINKO_MIN_ACCOUNT_AGE_HOURS", 24)? as u64,
            min_deposit_before_withdrawal: ton_env("PLINKO_MIN_DEPOSIT_BEFORE_WITHDRAWAL_TON", 0.05)?,
        };

        let confirm_timeout =
            Duration::from_secs(int_env("PLINKO_CONFIRM_TIMEOUT_SECS", 60)? as u64);
        let confirm_poll_interval =
            Duration::from_secs(int_env("PLINKO_CONFIRM_POLL_INTERVAL_SECS", 4)? as u64);

        Ok(Self {
            network,
            toncenter_endpoint,
            toncenter_api_key: secret_env("PLINKO_TONCENTER_API_KEY"),
            tonapi_base_url,
            tonapi_key: secret_env("PLINKO_TONAPI_KEY"),
            wallet_address,
            wallet_daemon_url: env::var("PLINKO_WALLET_DAEMON_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            wallet_daemon_token: secret_env("PLINKO_WALLET_DAEMON_TOKEN"),
            withdrawal_policy,
            confirm_timeout,
            confirm_poll_interval,
            sweep_batch_size: int_env("PLINKO_SWEEP_BATCH_SIZE", 10)?,
            max_stars_purchase: int_env("PLINKO_MAX_STARS_PURCHASE", 10_000)? as u64,
            db_path: env::var("PLINKO_DB_PATH").unwrap_or_else(|_| "data/plinko.db".to_string()),
            api_port: int_env("PLINKO_API_PORT", 3001)? as u16,
            log_level: env::var("PLINKO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            admin_password: secret_env("PLINKO_ADMIN_PASSWORD"),
            telegram_bot_token: secret_env("PLINKO_TELEGRAM_BOT_TOKEN"),
            telegram_webhook_secret: secret_env("PLINKO_TELEGRAM_WEBHOOK_SECRET"),
        })
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.network != Network::Mainnet {
            return Err(ConfigError::NetworkMismatch(
                "mainnet".to_string(),
                format!("{:?}", self.network),
            ));
        }

        if self.wallet_daemon_url.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "PLINKO_WALLET_DAEMON_URL".to_string(),
            ));
        }

        if self.telegram_webhook_secret.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "PLINKO_TELEGRAM_WEBHOOK_SECRET".to_string(),
            ));
        }

        Ok(())
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== Plinko Backend Configuration ===");
        println!("Network: {:?}", self.network);
        println!("TonCenter: {}", self.toncenter_endpoint);
        println!("TonAPI: {}", self.tonapi_base_url);
        println!("Game Wallet: {}", self.wallet_address);
        println!(
            "Wallet Signer: {}",
            if self.wallet_daemon_url.is_some() { "configured" } else { "NOT CONFIGURED (withdrawals disabled)" }
        );
        println!("Fee Policy: {}", self.withdrawal_policy.fee_policy);
        println!(
            "Withdrawal Limits: {} - {} per request, {} daily",
            units::format_nano(self.withdrawal_policy.min_amount),
            units::format_nano(self.withdrawal_policy.max_amount),
            units::format_nano(self.withdrawal_policy.max_daily_amount),
        );
        println!("Confirm Timeout: {:?}", self.confirm_timeout);
        println!("Database: {}", self.db_path);
        println!("Log Level: {}", self.log_level);
        println!("====================================");
    }
}

/// Read an optional secret env var
fn secret_env(var_name: &str) -> Option<Secret> {
    env::var(var_name).ok().filter(|v| !v.is_empty()).map(Secret::new)
}

/// Read a decimal TON env var into nanotons
fn ton_env(var_name: &str, default_ton: f64) -> Result<u64, ConfigError> {
    Ok(units::ton_to_nano(float_env(var_name, default_ton)?))
}

fn float_env(var_name: &str, default: f64) -> Result<f64, ConfigError> {
    match env::var(var_name) {
        Ok(v) => v
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var_name.to_string(), v)),
        Err(_) => Ok(default),
    }
}

fn int_env(var_name: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(var_name) {
        Ok(v) => v
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var_name.to_string(), v)),
        Err(_) => Ok(default),
    }
}

fn bool_env(var_name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var_name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(var_name.to_string(), v)),
        },
        Err(_) => Ok(default),
    }
}
