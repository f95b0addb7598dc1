//! Deposit Confirmation Engine

mod service;

pub use service::{DepositService, DepositVerification};
