//! Persistent Storage
//!
//! SQLite-backed storage with connection pooling. All read-then-write
//! settlement paths run inside a single `BEGIN IMMEDIATE` transaction
//! obtained from [`Db::with_tx`]; the immediate write lock serializes
//! concurrent writers the way a `SELECT ... FOR UPDATE` row lock would,
//! so balance checks, daily-limit aggregates, and idempotency guards all
//! observe a consistent snapshot.

mod db;

pub mod bets;
pub mod deposits;
pub mod stars;
pub mod users;
pub mod withdrawals;

pub use db::{Db, StoreError, StoreResult};
