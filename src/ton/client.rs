//! TON Transfer Client
//!
//! HTTP client for the chain-facing capability: seqno reads and transaction
//! listings go to TonCenter/TonAPI gateways, message signing is delegated to
//! the local signer daemon that holds the wallet key. The wallet contract's
//! sequence number is the confirmation primitive: a submitted transfer is
//! confirmed once the seqno advances past the value it was submitted at.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AppConfig;

/// Transfer adapter errors
#[derive(Debug, thiserror::Error)]
pub enum TonError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway error: {0}")]
    Api(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("wallet signer not configured")]
    SignerUnavailable,

    #[error("parse error: {0}")]
    Parse(String),
}

/// An outgoing transfer observed on the platform wallet
#[derive(Debug, Clone)]
pub struct OutgoingTransfer {
    pub destination: String,
    pub amount_nano: u64,
    pub hash: String,
}

/// An incoming transfer observed on the platform wallet
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub source: String,
    pub amount_nano: u64,
    pub hash: String,
}

/// The chain capability the settlement core depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TonTransfer: Send + Sync {
    /// Current sequence number of the platform wallet
    async fn get_seqno(&self) -> Result<u32, TonError>;

    /// Sign and broadcast a transfer of `amount_nano` to `to_address`.
    /// Returns the seqno the transfer was submitted at.
    async fn submit_transfer(
        &self,
        to_address: &str,
        amount_nano: u64,
        memo: &str,
    ) -> Result<u32, TonError>;

    /// Poll until the wallet seqno advances past `submitted_seqno` or the
    /// timeout elapses. `Ok(false)` means timed out, not failed.
    async fn wait_for_confirmation(
        &self,
        submitted_seqno: u32,
        timeout: Duration,
    ) -> Result<bool, TonError>;

    /// Recent outgoing transfers, best effort. Used to recover a
    /// human-readable transaction hash after confirmation.
    async fn recent_outgoing(&self, limit: u32) -> Result<Vec<OutgoingTransfer>, TonError>;

    /// Recent incoming transfers, used by deposit verification
    async fn recent_incoming(&self, limit: u32) -> Result<Vec<IncomingTransfer>, TonError>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

#[derive(Debug, Deserialize)]
struct TonCenterEnvelope {
    ok: bool,
    result: Option<Value>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    to_address: &'a str,
    amount_nano: u64,
    seqno: u32,
    memo: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    boc: String,
}

/// Gateway-backed implementation of [`TonTransfer`]
pub struct TonapiClient {
    http: Client,
    toncenter_endpoint: String,
    toncenter_api_key: Option<String>,
    tonapi_base_url: String,
    tonapi_key: Option<String>,
    signer_url: Option<String>,
    signer_token: Option<String>,
    wallet_address: String,
    poll_interval: Duration,
}

impl TonapiClient {
    pub fn new(
        toncenter_endpoint: String,
        tonapi_base_url: String,
        wallet_address: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http: Client::new(),
            toncenter_endpoint: toncenter_endpoint.trim_end_matches('/').to_string(),
            toncenter_api_key: None,
            tonapi_base_url: tonapi_base_url.trim_end_matches('/').to_string(),
            tonapi_key: None,
            signer_url: None,
            signer_token: None,
            wallet_address,
            poll_interval,
        }
    }

    /// Build a client from the application configuration
    pub fn from_config(config: &AppConfig) -> Self {
        let mut client = Self::new(
            config.toncenter_endpoint.clone(),
            config.tonapi_base_url.clone(),
            config.wallet_address.clone(),
            config.confirm_poll_interval,
        );
        client.toncenter_api_key = config
            .toncenter_api_key
            .as_ref()
            .map(|s| s.expose().to_string());
        client.tonapi_key = config.tonapi_key.as_ref().map(|s| s.expose().to_string());
        client.signer_url = config
            .wallet_daemon_url
            .as_ref()
            .map(|u| u.trim_end_matches('/').to_string());
        client.signer_token = config
            .wallet_daemon_token
            .as_ref()
            .map(|s| s.expose().to_string());
        client
    }

    fn toncenter_get(&self, path_and_query: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(format!("{}/{}", self.toncenter_endpoint, path_and_query));
        if let Some(key) = &self.toncenter_api_key {
            req = req.header("X-API-Key", key);
        }
        req
    }

    fn tonapi_get(&self, path_and_query: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(format!("{}{}", self.tonapi_base_url, path_and_query));
        if let Some(key) = &self.tonapi_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Ask the signer daemon for a signed transfer message
    async fn sign_transfer(
        &self,
        to_address: &str,
        amount_nano: u64,
        seqno: u32,
        memo: &str,
    ) -> Result<String, TonError> {
        let signer_url = self.signer_url.as_ref().ok_or(TonError::SignerUnavailable)?;

        let mut req = self.http.post(format!("{}/v1/transfer", signer_url)).json(
            &SignRequest {
                to_address,
                amount_nano,
                seqno,
                memo,
            },
        );
        if let Some(token) = &self.signer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TonError::Signer(body));
        }

        let signed: SignResponse = resp.json().await?;
        Ok(signed.boc)
    }

    /// Broadcast a signed message, preferring TonAPI when a key is present
    async fn broadcast(&self, boc: &str) -> Result<(), TonError> {
        if self.tonapi_key.is_some() {
            let resp = self
                .http
                .post(format!("{}/v2/blockchain/message", self.tonapi_base_url))
                .bearer_auth(self.tonapi_key.as_deref().unwrap_or_default())
                .json(&serde_json::json!({ "boc": boc }))
                .send()
                .await?;

            if resp.status().is_success() {
                return Ok(());
            }
            tracing::warn!(
                target: "plinko::ton",
                "TonAPI broadcast failed with {}, falling back to TonCenter",
                resp.status()
            );
        }

        let resp = self
            .toncenter_post("sendBoc")
            .json(&serde_json::json!({ "boc": boc }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TonError::Api(format!("sendBoc failed: {}", body)));
        }
        Ok(())
    }

    fn toncenter_post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(format!("{}/{}", self.toncenter_endpoint, path));
        if let Some(key) = &self.toncenter_api_key {
            req = req.header("X-API-Key", key);
        }
        req
    }

    /// List raw transaction objects from TonAPI
    async fn tonapi_transactions(&self, limit: u32) -> Result<Vec<Value>, TonError> {
        let resp = self
            .tonapi_get(&format!(
                "/v2/blockchain/accounts/{}/transactions?limit={}",
                self.wallet_address, limit
            ))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TonError::Api(format!(
                "transaction listing failed: {}",
                resp.status()
            )));
        }

        let body: Value = resp.json().await?;
        Ok(body
            .get("transactions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// List raw transaction objects from TonCenter
    async fn toncenter_transactions(&self, limit: u32) -> Result<Vec<Value>, TonError> {
        let resp = self
            .toncenter_get(&format!(
                "getTransactions?address={}&limit={}",
                self.wallet_address, limit
            ))
            .send()
            .await?;

        let envelope: TonCenterEnvelope = resp.json().await?;
        if !envelope.ok {
            return Err(TonError::Api(
                envelope.error.unwrap_or_else(|| "getTransactions failed".to_string()),
            ));
        }

        Ok(envelope
            .result
            .as_ref()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// Gateways disagree on shapes: TonAPI addresses are objects, TonCenter
/// addresses are strings; values may be numbers or decimal strings.
fn address_field(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::to_string)
        .or_else(|| v.get("address").and_then(Value::as_str).map(str::to_string))
}

fn nano_field(v: &Value) -> Option<u64> {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn tx_hash(tx: &Value) -> Option<String> {
    tx.get("hash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            tx.get("transaction_id")
                .and_then(|id| id.get("hash"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

#[async_trait]
impl TonTransfer for TonapiClient {
    async fn get_seqno(&self) -> Result<u32, TonError> {
        let resp = self
            .toncenter_get(&format!(
                "getWalletInformation?address={}",
                self.wallet_address
            ))
            .send()
            .await?;

        let envelope: TonCenterEnvelope = resp.json().await?;
        if !envelope.ok {
            return Err(TonError::Api(
                envelope.error.unwrap_or_else(|| "getWalletInformation failed".to_string()),
            ));
        }

        envelope
            .result
            .as_ref()
            .and_then(|r| r.get("seqno"))
            .and_then(Value::as_u64)
            .map(|s| s as u32)
            .ok_or_else(|| TonError::Parse("missing seqno in wallet information".to_string()))
    }

    async fn submit_transfer(
        &self,
        to_address: &str,
        amount_nano: u64,
        memo: &str,
    ) -> Result<u32, TonError> {
        let seqno = self.get_seqno().await?;
        let boc = self.sign_transfer(to_address, amount_nano, seqno, memo).await?;
        self.broadcast(&boc).await?;
        Ok(seqno)
    }

    async fn wait_for_confirmation(
        &self,
        submitted_seqno: u32,
        timeout: Duration,
    ) -> Result<bool, TonError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut error_streak: u32 = 0;

        while tokio::time::Instant::now() < deadline {
            match self.get_seqno().await {
                Ok(current) if current > submitted_seqno => return Ok(true),
                Ok(_) => error_streak = 0,
                Err(e) => {
                    // transient read errors get bounded retries with backoff
                    error_streak += 1;
                    if error_streak >= 5 {
                        return Err(e);
                    }
                }
            }

            let backoff = self.poll_interval * (error_streak + 1).min(4);
            tokio::time::sleep(backoff).await;
        }

        Ok(false)
    }

    async fn recent_outgoing(&self, limit: u32) -> Result<Vec<OutgoingTransfer>, TonError> {
        // hash recovery is best effort and only TonAPI exposes it cheaply
        if self.tonapi_key.is_none() {
            return Ok(Vec::new());
        }

        let transactions = self.tonapi_transactions(limit).await?;
        let mut transfers = Vec::new();

        for tx in &transactions {
            let Some(hash) = tx_hash(tx) else { continue };
            let Some(out_msgs) = tx.get("out_msgs").and_then(Value::as_array) else {
                continue;
            };

            for msg in out_msgs {
                let destination = msg.get("destination").and_then(address_field);
                let amount = msg.get("value").and_then(nano_field);
                if let (Some(destination), Some(amount_nano)) = (destination, amount) {
                    transfers.push(OutgoingTransfer {
                        destination,
                        amount_nano,
                        hash: hash.clone(),
                    });
                }
            }
        }

        Ok(transfers)
    }

    async fn recent_incoming(&self, limit: u32) -> Result<Vec<IncomingTransfer>, TonError> {
        // TonAPI first, TonCenter as fallback when it yields nothing
        let mut transactions = if self.tonapi_key.is_some() {
            self.tonapi_transactions(limit).await.unwrap_or_default()
        } else {
            Vec::new()
        };

        if transactions.is_empty() {
            transactions = self.toncenter_transactions(limit).await?;
        }

        let mut transfers = Vec::new();
        for tx in &transactions {
            let Some(hash) = tx_hash(tx) else { continue };
            let Some(in_msg) = tx.get("in_msg") else { continue };

            let source = in_msg
                .get("source")
                .and_then(address_field)
                .or_else(|| in_msg.get("src").and_then(address_field));
            let amount = in_msg.get("value").and_then(nano_field);

            if let (Some(source), Some(amount_nano)) = (source, amount) {
                if source.is_empty() || amount_nano == 0 {
                    continue;
                }
                transfers.push(IncomingTransfer {
                    source,
                    amount_nano,
                    hash,
                });
            }
        }

        Ok(transfers)
    }
}
