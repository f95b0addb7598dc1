//! Telegram Bot API Capability
//!
//! The Stars settlement engine needs three things from Telegram: issue a
//! Stars invoice, cross-check a reported payment, and notify the user after
//! a credit. Everything else about the Bot API stays outside the core.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::AppConfig;

/// Telegram capability errors
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bot API error: {0}")]
    Api(String),

    #[error("bot token not configured")]
    NotConfigured,
}

/// The Telegram capability the settlement core depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Create a Stars (XTR) invoice link for the given payload
    async fn create_stars_invoice(
        &self,
        telegram_id: i64,
        amount: u64,
        title: &str,
        description: &str,
        payload: &str,
    ) -> Result<String, TelegramError>;

    /// Cross-check a reported payment against the bot's Stars ledger
    async fn verify_stars_payment(
        &self,
        payload: &str,
        telegram_charge_id: &str,
    ) -> Result<bool, TelegramError>;

    /// Tell the user their balance was credited. Fire-and-forget from the
    /// caller's perspective; failures must not affect settlement.
    async fn send_payment_notification(
        &self,
        telegram_id: i64,
        amount: u64,
        new_balance: u64,
    ) -> Result<(), TelegramError>;
}

// =============================================================================
// Bot API implementation
// =============================================================================

#[derive(Debug, Deserialize)]
struct BotApiEnvelope {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
}

/// reqwest-backed Bot API client
pub struct BotApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl BotApiClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: "https://api.telegram.org".to_string(),
            token,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config
                .telegram_bot_token
                .as_ref()
                .map(|s| s.expose().to_string()),
        )
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, TelegramError> {
        let token = self.token.as_ref().ok_or(TelegramError::NotConfigured)?;

        let resp = self
            .http
            .post(format!("{}/bot{}/{}", self.base_url, token, method))
            .json(&body)
            .send()
            .await?;

        let envelope: BotApiEnvelope = resp.json().await?;
        if !envelope.ok {
            return Err(TelegramError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| format!("{} failed", method)),
            ));
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl TelegramApi for BotApiClient {
    async fn create_stars_invoice(
        &self,
        _telegram_id: i64,
        amount: u64,
        title: &str,
        description: &str,
        payload: &str,
    ) -> Result<String, TelegramError> {
        let result = self
            .call(
                "createInvoiceLink",
                serde_json::json!({
                    "title": title,
                    "description": description,
                    "payload": payload,
                    "currency": "XTR",
                    "prices": [{ "label": title, "amount": amount }]
                }),
            )
            .await?;

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TelegramError::Api("createInvoiceLink returned no link".to_string()))
    }

    async fn verify_stars_payment(
        &self,
        payload: &str,
        telegram_charge_id: &str,
    ) -> Result<bool, TelegramError> {
        let result = self
            .call("getStarTransactions", serde_json::json!({ "limit": 100 }))
            .await?;

        let transactions = result
            .get("transactions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let found = transactions.iter().any(|tx| {
            tx.get("id").and_then(Value::as_str) == Some(telegram_charge_id)
                || tx
                    .get("source")
                    .and_then(|s| s.get("invoice_payload"))
                    .and_then(Value::as_str)
                    == Some(payload)
        });

        Ok(found)
    }

    async fn send_payment_notification(
        &self,
        telegram_id: i64,
        amount: u64,
        new_balance: u64,
    ) -> Result<(), TelegramError> {
        self.call(
            "sendMessage",
            serde_json::json!({
                "chat_id": telegram_id,
                "text": format!(
                    "Payment received: +{} Stars. Your balance is now {} Stars.",
                    amount, new_balance
                )
            }),
        )
        .await?;

        Ok(())
    }
}
