//! Structured Logging
//!
//! Production logging setup with:
//! - JSON output for log aggregation (mainnet)
//! - Pretty output for development
//! - Correlation IDs for request tracing
//! - Structured settlement events (bets, withdrawals, deposits, payments)
//!
//! # Usage
//!
//! ```rust,ignore
//! use plinko_backend::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?; // JSON mode for production
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events
    Api,
    /// Bet settlement events
    Bet,
    /// Withdrawal lifecycle events
    Withdrawal,
    /// Deposit confirmation events
    Deposit,
    /// Stars payment events
    Payment,
    /// System events (startup, shutdown)
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    /// Log level
    pub level: String,
    /// Event category
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            error: None,
        }
    }

    /// Add correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add error details
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Serialize this event to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Settlement Event Logging
// ============================================================================

/// Log a bet settlement event
pub fn log_bet_event(event_type: &str, bet_id: i64, user_id: i64, amount: u64, success: bool) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let event = LogEvent::new(level, EventCategory::Bet, event_type).with_data(serde_json::json!({
        "bet_id": bet_id,
        "user_id": user_id,
        "amount": amount,
        "success": success
    }));

    if success {
        tracing::info!(target: "plinko::bet", "{}", event.to_json());
    } else {
        tracing::warn!(target: "plinko::bet", "{}", event.to_json());
    }
}

/// Log a withdrawal lifecycle event
pub fn log_withdrawal_event(
    event_type: &str,
    withdrawal_id: i64,
    amount_nano: u64,
    wallet_address: &str,
    success: bool,
    tx_ref: Option<&str>,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Withdrawal, event_type)
        .with_correlation_id(format!("wd_{}", withdrawal_id))
        .with_data(serde_json::json!({
            "withdrawal_id": withdrawal_id,
            "amount_nano": amount_nano,
            "wallet_address": wallet_address,
            "tx_ref": tx_ref,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error(err);
    }

    if success {
        tracing::info!(target: "plinko::withdrawal", "{}", event.to_json());
    } else {
        tracing::error!(target: "plinko::withdrawal", "{}", event.to_json());
    }
}

/// Log a deposit confirmation event
pub fn log_deposit_event(event_type: &str, user_id: i64, amount_nano: u64, confirmed: bool) {
    let level = if confirmed { LogLevel::Info } else { LogLevel::Warn };
    let event =
        LogEvent::new(level, EventCategory::Deposit, event_type).with_data(serde_json::json!({
            "user_id": user_id,
            "amount_nano": amount_nano,
            "confirmed": confirmed
        }));

    if confirmed {
        tracing::info!(target: "plinko::deposit", "{}", event.to_json());
    } else {
        tracing::warn!(target: "plinko::deposit", "{}", event.to_json());
    }
}

/// Log a Stars payment event
pub fn log_payment_event(event_type: &str, payload: &str, amount: u64, success: bool) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let event = LogEvent::new(level, EventCategory::Payment, event_type)
        .with_correlation_id(payload)
        .with_data(serde_json::json!({
            "payload": payload,
            "amount": amount,
            "success": success
        }));

    if success {
        tracing::info!(target: "plinko::payment", "{}", event.to_json());
    } else {
        tracing::warn!(target: "plinko::payment", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (recommended for production)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "plinko={},tower_http={},axum={}",
            format!("{:?}", level).to_lowercase(),
            format!("{:?}", level).to_lowercase(),
            format!("{:?}", level).to_lowercase()
        ))
    });

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );

        subscriber
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from AppConfig
pub fn init_from_config(config: &crate::config::AppConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    let json_format = config.network == crate::config::Network::Mainnet;

    init_logging(level, json_format)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    format!("{:x}-{:04x}", timestamp & 0xFFFFFFFF, rand::random::<u16>())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Withdrawal, "Test event")
            .with_correlation_id("wd_123")
            .with_data(serde_json::json!({"key": "value"}));

        let json = event.to_json();
        assert!(json.contains("Test event"));
        assert!(json.contains("wd_123"));
        assert!(json.contains("withdrawal"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_id_generation() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert!(!id1.is_empty());
        assert!(!id2.is_empty());
    }
}
