//! Telegram Stars Transaction Types
//!
//! The payload is the idempotency key: a given payload moves from pending
//! to a terminal state exactly once, and repeated verification of a
//! completed payload is a no-op that returns the already-settled result.

use serde::{Deserialize, Serialize};

use super::unix_now;

/// Status of a Stars purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarTransactionStatus {
    /// Invoice issued, waiting for payment confirmation
    Pending,
    /// Payment verified and credited
    Completed,
    /// Payment rejected (verification failure or amount mismatch)
    Failed,
}

impl StarTransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for StarTransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StarTransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// An inbound Telegram Stars purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarTransactionRecord {
    /// Unique transaction ID
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Telegram identity the invoice was issued to
    pub telegram_id: i64,
    /// Purchase amount in whole Stars
    pub amount: u64,
    /// Unique invoice payload (idempotency key)
    pub payload: String,
    /// Current status
    pub status: StarTransactionStatus,
    /// Charge ID reported by Telegram
    pub telegram_payment_charge_id: Option<String>,
    /// Charge ID reported by the payment provider
    pub provider_payment_charge_id: Option<String>,
    /// Timestamp when the invoice was issued
    pub created_at: u64,
    /// Timestamp when a terminal state was reached
    pub completed_at: Option<u64>,
}

impl StarTransactionRecord {
    pub fn mark_completed(&mut self, telegram_charge_id: String, provider_charge_id: String) {
        self.status = StarTransactionStatus::Completed;
        self.telegram_payment_charge_id = Some(telegram_charge_id);
        self.provider_payment_charge_id = Some(provider_charge_id);
        self.completed_at = Some(unix_now());
    }

    pub fn mark_failed(&mut self, telegram_charge_id: String, provider_charge_id: String) {
        self.status = StarTransactionStatus::Failed;
        self.telegram_payment_charge_id = Some(telegram_charge_id);
        self.provider_payment_charge_id = Some(provider_charge_id);
        self.completed_at = Some(unix_now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "completed", "failed"] {
            let parsed: StarTransactionStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StarTransactionStatus::Pending.is_terminal());
        assert!(StarTransactionStatus::Completed.is_terminal());
        assert!(StarTransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_completion_records_charge_ids() {
        let mut tx = StarTransactionRecord {
            id: 1,
            user_id: 1,
            telegram_id: 42,
            amount: 100,
            payload: "stars_test".to_string(),
            status: StarTransactionStatus::Pending,
            telegram_payment_charge_id: None,
            provider_payment_charge_id: None,
            created_at: 0,
            completed_at: None,
        };

        tx.mark_completed("tg_charge".to_string(), "provider_charge".to_string());
        assert_eq!(tx.status, StarTransactionStatus::Completed);
        assert_eq!(tx.telegram_payment_charge_id.as_deref(), Some("tg_charge"));
        assert!(tx.completed_at.is_some());
    }
}
