//! Bet Settlement Engine

mod service;

pub use service::{BetPlacement, BetResolution, BetService, ClientOutcome, SettleSummary};
