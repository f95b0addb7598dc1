//! Domain Types
//!
//! Records and status enums for users, bets, withdrawals, deposits, and
//! Stars transactions. All monetary amounts are integers in the smallest
//! unit: nanotons for TON, whole Stars for Stars.

pub mod bet;
pub mod deposit;
pub mod stars;
pub mod user;
pub mod withdrawal;

pub use bet::{BetRecord, RiskLevel};
pub use deposit::{DepositRecord, DepositStatus};
pub use stars::{StarTransactionRecord, StarTransactionStatus};
pub use user::{Balances, Currency, UserRecord};
pub use withdrawal::{WithdrawalRecord, WithdrawalStatus};

/// Current unix time in seconds
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
