//! Bet Types
//!
//! A bet's stake is debited when the bet is created; the row then carries a
//! NULL multiplier until the outcome resolves. Resolving sets the multiplier
//! exactly once and credits the payout, so the NULL check is the idempotency
//! guard for concurrent resolve calls.

use serde::{Deserialize, Serialize};

use super::unix_now;
use super::user::Currency;

/// Multipliers are stored in milli-units (3.0x = 3000) so payout arithmetic
/// stays integral.
pub const MULTIPLIER_SCALE: u32 = 1000;

/// Risk level of a plinko drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(format!("unknown risk level: {}", s)),
        }
    }
}

/// One play of the game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    /// Unique bet ID
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Stake in the smallest unit of `currency`
    pub bet_amount: u64,
    /// Currency the stake was taken from
    pub currency: Currency,
    /// Risk level
    pub risk_level: RiskLevel,
    /// Number of peg rows (8-16)
    pub rows_count: u8,
    /// Outcome multiplier in milli-units; None while pending
    pub multiplier_milli: Option<u32>,
    /// Amount credited back on resolution (stake x multiplier)
    pub payout: u64,
    /// payout - stake; negative on a losing drop
    pub profit: i64,
    /// Whether the multiplier exceeded 1x
    pub is_win: bool,
    /// Bin index per row of the drop
    pub ball_path: Vec<u8>,
    /// Timestamp when the stake was debited
    pub created_at: u64,
    /// Timestamp of last update
    pub updated_at: u64,
}

impl BetRecord {
    /// A bet is resolved once its multiplier is set; resolved bets are
    /// immutable.
    pub fn is_resolved(&self) -> bool {
        self.multiplier_milli.is_some()
    }

    /// Apply the outcome to this record. The caller must have verified the
    /// bet is still pending.
    pub fn resolve(&mut self, multiplier_milli: u32, ball_path: Vec<u8>) {
        let payout = payout_amount(self.bet_amount, multiplier_milli);
        self.multiplier_milli = Some(multiplier_milli);
        self.payout = payout;
        self.profit = payout as i64 - self.bet_amount as i64;
        self.is_win = multiplier_milli > MULTIPLIER_SCALE;
        self.ball_path = ball_path;
        self.updated_at = unix_now();
    }

    /// Multiplier as a decimal number, for API responses
    pub fn multiplier(&self) -> Option<f64> {
        self.multiplier_milli
            .map(|m| m as f64 / MULTIPLIER_SCALE as f64)
    }
}

/// Compute the payout for a stake at a milli-unit multiplier.
///
/// Widens to u128 so the largest configured multiplier (110x) cannot
/// overflow on large nanoton stakes.
pub fn payout_amount(stake: u64, multiplier_milli: u32) -> u64 {
    (stake as u128 * multiplier_milli as u128 / MULTIPLIER_SCALE as u128) as u64
}

/// Convert a decimal multiplier from the HTTP boundary into milli-units.
pub fn multiplier_to_milli(multiplier: f64) -> Option<u32> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return None;
    }
    let milli = (multiplier * MULTIPLIER_SCALE as f64).round();
    if milli < 1.0 || milli > u32::MAX as f64 {
        return None;
    }
    Some(milli as u32)
}
