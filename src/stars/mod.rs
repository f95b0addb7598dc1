//! Telegram Stars Payment Settlement

mod service;

pub use service::{SettleOutcome, StarsInitiation, StarsService};
