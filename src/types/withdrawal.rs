//! Withdrawal Types
//!
//! Lifecycle: pending → processing → completed | failed | cancelled, with
//! manual_review branching back to pending on admin approval. The gross
//! amount is debited at creation and returned if and only if the request
//! ends in failed or cancelled.

use serde::{Deserialize, Serialize};

use super::unix_now;

/// Status of a withdrawal request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Funds reserved, waiting for processing
    Pending,
    /// Transfer being submitted to the TON network
    Processing,
    /// Transfer confirmed on-chain
    Completed,
    /// Transfer failed; gross amount refunded
    Failed,
    /// Rejected or manually cancelled; gross amount refunded
    Cancelled,
    /// Amount above the review threshold, waiting for an admin
    ManualReview,
}

impl WithdrawalStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States from which an admin may cancel-and-refund. Completed is
    /// excluded: the TON already left the platform.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::ManualReview)
    }
}

impl Default for WithdrawalStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::ManualReview => "manual_review",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "manual_review" => Ok(Self::ManualReview),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// A request to move TON off-platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Unique withdrawal ID
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Gross amount in nanotons, reserved from the balance at creation
    pub amount: u64,
    /// Platform fee in nanotons
    pub fee: u64,
    /// amount - fee; what actually goes on-chain
    pub net_amount: u64,
    /// Destination wallet (canonical form)
    pub wallet_address: String,
    /// Current status
    pub status: WithdrawalStatus,
    /// Eligible for the automatic processing sweep
    pub auto_process: bool,
    /// On-chain transaction hash, or a synthetic reference when the hash
    /// could not be recovered
    pub transaction_hash: Option<String>,
    /// Error message if failed
    pub error_message: Option<String>,
    /// Notes left by reviewing admins
    pub admin_notes: Option<String>,
    /// Admin who approved/rejected, when reviewed
    pub reviewed_by: Option<i64>,
    /// Timestamp when the request was created
    pub created_at: u64,
    /// Timestamp when a terminal state was reached
    pub completed_at: Option<u64>,
}

impl WithdrawalRecord {
    pub fn mark_processing(&mut self) {
        self.status = WithdrawalStatus::Processing;
    }

    pub fn mark_completed(&mut self, tx_ref: String) {
        self.status = WithdrawalStatus::Completed;
        self.transaction_hash = Some(tx_ref);
        self.completed_at = Some(unix_now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = WithdrawalStatus::Failed;
        self.error_message = Some(error);
        self.completed_at = Some(unix_now());
    }

    pub fn mark_cancelled(&mut self, reason: String) {
        self.status = WithdrawalStatus::Cancelled;
        self.append_error(&reason);
        self.completed_at = Some(unix_now());
    }

    /// Approve out of manual review; the request re-enters the pending queue
    pub fn mark_approved(&mut self, admin_id: i64, notes: Option<String>) {
        self.status = WithdrawalStatus::Pending;
        self.reviewed_by = Some(admin_id);
        if let Some(n) = notes {
            self.append_note(&n);
        }
    }

    /// Append to admin_notes, newline-separated
    pub fn append_note(&mut self, note: &str) {
        match &mut self.admin_notes {
            Some(existing) if !existing.is_empty() => {
                existing.push('\n');
                existing.push_str(note);
            }
            _ => self.admin_notes = Some(note.to_string()),
        }
    }

    /// Append to error_message, newline-separated
    pub fn append_error(&mut self, msg: &str) {
        match &mut self.error_message {
            Some(existing) if !existing.is_empty() => {
                existing.push('\n');
                existing.push_str(msg);
            }
            _ => self.error_message = Some(msg.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WithdrawalRecord {
        WithdrawalRecord {
            id: 1,
            user_id: 7,
            amount: 5_000_000_000,
            fee: 50_000_000,
            net_amount: 4_950_000_000,
            wallet_address: "UQtest".to_string(),
            status: WithdrawalStatus::Pending,
            auto_process: true,
            transaction_hash: None,
            error_message: None,
            admin_notes: None,
            reviewed_by: None,
            created_at: 0,
            completed_at: None,
        }
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            "pending",
            "processing",
            "completed",
            "failed",
            "cancelled",
            "manual_review",
        ] {
            let parsed: WithdrawalStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("done".parse::<WithdrawalStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_cancellable() {
        assert!(WithdrawalStatus::Completed.is_terminal());
        assert!(WithdrawalStatus::Cancelled.is_terminal());
        assert!(!WithdrawalStatus::Processing.is_terminal());

        assert!(WithdrawalStatus::Processing.is_cancellable());
        assert!(WithdrawalStatus::ManualReview.is_cancellable());
        assert!(!WithdrawalStatus::Completed.is_cancellable());
    }

    #[test]
    fn test_completion_sets_hash_and_timestamp() {
        let mut w = sample();
        w.mark_processing();
        w.mark_completed("abc123".to_string());

        assert_eq!(w.status, WithdrawalStatus::Completed);
        assert_eq!(w.transaction_hash.as_deref(), Some("abc123"));
        assert!(w.completed_at.is_some());
    }

    #[test]
    fn test_note_appending() {
        let mut w = sample();
        w.append_note("first");
        w.append_note("second");
        assert_eq!(w.admin_notes.as_deref(), Some("first\nsecond"));
    }
}
