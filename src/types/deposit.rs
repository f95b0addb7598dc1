//! Deposit Types
//!
//! A deposit row is only ever written after a matching on-chain transaction
//! has been found, and the balance credit happens in the same transaction,
//! so there is no pending-then-credit race and no speculative record.

use serde::{Deserialize, Serialize};

/// Status of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Confirmed,
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// Inbound TON funding matched to an on-chain transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Unique deposit ID
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Amount in nanotons
    pub amount: u64,
    /// Sender wallet address (canonical form)
    pub wallet_address: String,
    /// Current status
    pub status: DepositStatus,
    /// On-chain transaction hash; unique so a transaction credits once
    pub transaction_hash: Option<String>,
    /// Timestamp when the match was confirmed
    pub confirmed_at: Option<u64>,
    /// Timestamp when the record was created
    pub created_at: u64,
}
