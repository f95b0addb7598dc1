//! Withdrawal Fee & Limit Policy
//!
//! Pure computation, no I/O. Two fee strategies exist in production
//! history: a flat fee and a proportional fee with a flat floor. Neither is
//! hardcoded; the active one is picked by configuration.

use serde::Serialize;

use crate::units;

/// Proportional fees are expressed in basis points (1 bp = 0.01%).
pub const BASIS_POINTS: u64 = 10_000;

/// Fee computation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Flat fee in nanotons, independent of amount
    Fixed { fee: u64 },
    /// Proportional fee with a flat floor: max(floor, amount * rate)
    ProportionalWithFloor { floor: u64, rate_bp: u32 },
}

impl FeePolicy {
    /// Fee in nanotons for a gross withdrawal amount
    pub fn fee_for(&self, amount: u64) -> u64 {
        match *self {
            FeePolicy::Fixed { fee } => fee,
            FeePolicy::ProportionalWithFloor { floor, rate_bp } => {
                let proportional = amount as u128 * rate_bp as u128 / BASIS_POINTS as u128;
                (proportional as u64).max(floor)
            }
        }
    }
}

impl std::fmt::Display for FeePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            FeePolicy::Fixed { fee } => write!(f, "fixed {}", units::format_nano(fee)),
            FeePolicy::ProportionalWithFloor { floor, rate_bp } => write!(
                f,
                "proportional {}bp, floor {}",
                rate_bp,
                units::format_nano(floor)
            ),
        }
    }
}

/// Fee breakdown for a withdrawal request
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeeBreakdown {
    /// Requested amount, reserved from the balance
    pub gross_amount: u64,
    /// Platform fee
    pub fee: u64,
    /// gross - fee; what goes on-chain
    pub net_amount: u64,
}

/// A limit check that failed. Per-request bounds are input-range problems;
/// daily quotas are rate problems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitViolation {
    BelowMinimum { min: u64 },
    AboveMaximum { max: u64 },
    DailyAmountExceeded { max_daily: u64, already: u64 },
    DailyCountExceeded { max_daily: u32 },
}

impl LimitViolation {
    pub fn is_daily_quota(&self) -> bool {
        matches!(
            self,
            Self::DailyAmountExceeded { .. } | Self::DailyCountExceeded { .. }
        )
    }
}

impl std::fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelowMinimum { min } => {
                write!(f, "minimum withdrawal amount is {}", units::format_nano(*min))
            }
            Self::AboveMaximum { max } => {
                write!(f, "maximum withdrawal amount is {}", units::format_nano(*max))
            }
            Self::DailyAmountExceeded { max_daily, already } => write!(
                f,
                "daily withdrawal limit of {} exceeded ({} already withdrawn)",
                units::format_nano(*max_daily),
                units::format_nano(*already)
            ),
            Self::DailyCountExceeded { max_daily } => {
                write!(f, "daily withdrawal count limit of {} reached", max_daily)
            }
        }
    }
}

/// Withdrawal policy: fee strategy, per-request bounds, daily quotas,
/// processing thresholds, and account gating.
#[derive(Debug, Clone)]
pub struct WithdrawalPolicy {
    pub fee_policy: FeePolicy,
    /// Minimum gross amount per request (nanotons)
    pub min_amount: u64,
    /// Maximum gross amount per request (nanotons)
    pub max_amount: u64,
    /// Maximum gross total per user per trailing 24h (nanotons)
    pub max_daily_amount: u64,
    /// Maximum requests per user per trailing 24h
    pub max_daily_count: u32,
    /// Master switch for the automatic processing sweep
    pub auto_process_enabled: bool,
    /// Amounts up to this are processed without an admin (nanotons)
    pub auto_process_threshold: u64,
    /// Amounts from this upward require manual review (nanotons)
    pub manual_review_threshold: u64,
    /// Minimum account age before withdrawing; 0 disables the check
    pub min_account_age_hours: u64,
    /// Minimum confirmed deposit total before withdrawing; 0 disables
    pub min_deposit_before_withdrawal: u64,
}

impl WithdrawalPolicy {
    /// Compute the fee breakdown for a gross amount
    pub fn calculate_fee(&self, gross_amount: u64) -> FeeBreakdown {
        let fee = self.fee_policy.fee_for(gross_amount).min(gross_amount);
        FeeBreakdown {
            gross_amount,
            fee,
            net_amount: gross_amount - fee,
        }
    }

    /// Check a request against per-request bounds and the user's remaining
    /// daily quota. The caller supplies the trailing-24h aggregates it read
    /// under the same lock as the balance.
    pub fn validate_limits(
        &self,
        amount: u64,
        daily_withdrawn: u64,
        daily_count: u32,
    ) -> Result<(), LimitViolation> {
        if amount < self.min_amount {
            return Err(LimitViolation::BelowMinimum {
                min: self.min_amount,
            });
        }

        if amount > self.max_amount {
            return Err(LimitViolation::AboveMaximum {
                max: self.max_amount,
            });
        }

        if daily_withdrawn.saturating_add(amount) > self.max_daily_amount {
            return Err(LimitViolation::DailyAmountExceeded {
                max_daily: self.max_daily_amount,
                already: daily_withdrawn,
            });
        }

        if daily_count >= self.max_daily_count {
            return Err(LimitViolation::DailyCountExceeded {
                max_daily: self.max_daily_count,
            });
        }

        Ok(())
    }

    pub fn should_auto_process(&self, amount: u64) -> bool {
        self.auto_process_enabled && amount <= self.auto_process_threshold
    }

    pub fn requires_manual_review(&self, amount: u64) -> bool {
        amount >= self.manual_review_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::ton_to_nano;

    fn policy() -> WithdrawalPolicy {
        WithdrawalPolicy {
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
            min_account_age_hours: 24,
            min_deposit_before_withdrawal: ton_to_nano(0.05),
        }
    }

    #[test]
    fn test_fixed_fee_breakdown() {
        // 5 TON at a fixed 0.05 fee: gross 5, fee 0.05, net 4.95
        let p = WithdrawalPolicy {
            fee_policy: FeePolicy::Fixed {
                fee: ton_to_nano(0.05),
            },
            ..policy()
        };
        let breakdown = p.calculate_fee(ton_to_nano(5.0));
        assert_eq!(breakdown.gross_amount, 5_000_000_000);
        assert_eq!(breakdown.fee, 50_000_000);
        assert_eq!(breakdown.net_amount, 4_950_000_000);
    }

    #[test]
    fn test_proportional_fee_uses_floor_for_small_amounts() {
        let p = WithdrawalPolicy {
            fee_policy: FeePolicy::ProportionalWithFloor {
                floor: ton_to_nano(0.01),
                rate_bp: 200, // 2%
            },
            ..policy()
        };

        // 0.2 TON: 2% = 0.004 < 0.01 floor
        assert_eq!(p.calculate_fee(ton_to_nano(0.2)).fee, ton_to_nano(0.01));
        // 10 TON: 2% = 0.2 > floor
        assert_eq!(p.calculate_fee(ton_to_nano(10.0)).fee, ton_to_nano(0.2));
    }

    #[test]
    fn test_fee_never_exceeds_gross() {
        let p = WithdrawalPolicy {
            fee_policy: FeePolicy::Fixed {
                fee: ton_to_nano(1.0),
            },
            ..policy()
        };
        let breakdown = p.calculate_fee(ton_to_nano(0.5));
        assert_eq!(breakdown.fee, ton_to_nano(0.5));
        assert_eq!(breakdown.net_amount, 0);
    }

    #[test]
    fn test_limit_bounds() {
        let p = policy();

        assert!(matches!(
            p.validate_limits(ton_to_nano(0.05), 0, 0),
            Err(LimitViolation::BelowMinimum { .. })
        ));
        assert!(matches!(
            p.validate_limits(ton_to_nano(101.0), 0, 0),
            Err(LimitViolation::AboveMaximum { .. })
        ));
        assert!(p.validate_limits(ton_to_nano(5.0), 0, 0).is_ok());
    }

    #[test]
    fn test_daily_quotas() {
        let p = policy();

        let amount_violation = p.validate_limits(ton_to_nano(10.0), ton_to_nano(495.0), 3);
        assert!(matches!(
            amount_violation,
            Err(LimitViolation::DailyAmountExceeded { .. })
        ));
        assert!(amount_violation.unwrap_err().is_daily_quota());

        assert!(matches!(
            p.validate_limits(ton_to_nano(1.0), 0, 10),
            Err(LimitViolation::DailyCountExceeded { .. })
        ));

        // exactly filling the quota is allowed
        assert!(p
            .validate_limits(ton_to_nano(5.0), ton_to_nano(495.0), 9)
            .is_ok());
    }

    #[test]
    fn test_processing_thresholds() {
        let p = policy();

        assert!(p.should_auto_process(ton_to_nano(5.0)));
        assert!(p.should_auto_process(ton_to_nano(10.0)));
        assert!(!p.should_auto_process(ton_to_nano(10.5)));

        assert!(!p.requires_manual_review(ton_to_nano(49.0)));
        assert!(p.requires_manual_review(ton_to_nano(50.0)));
    }

    #[test]
    fn test_auto_process_master_switch() {
        let p = WithdrawalPolicy {
            auto_process_enabled: false,
            ..policy()
        };
        assert!(!p.should_auto_process(ton_to_nano(1.0)));
    }
}
