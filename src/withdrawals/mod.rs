//! Withdrawal Lifecycle Manager

mod service;

pub use service::{StuckAction, SweepItem, SweepSummary, WithdrawalService};
