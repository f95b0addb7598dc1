//! Deposit Confirmation
//!
//! A deposit claim is checked against the platform wallet's actual inbound
//! transactions. Only a match creates a record and credits the balance,
//! atomically; an unverified claim leaves no trace, so balances cannot be
//! inflated by asking twice.

use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};
use crate::logging::log_deposit_event;
use crate::store::{deposits, users, Db, StoreError};
use crate::ton::{self, TonTransfer};
use crate::types::deposit::DepositRecord;
use crate::types::user::{Balances, Currency};

/// Inbound value may differ from the claim by forwarding fees; 0.01 TON
/// absorbs that.
const AMOUNT_TOLERANCE: u64 = 10_000_000;

/// How many recent wallet transactions to scan per verification
const SCAN_LIMIT: u32 = 50;

/// Outcome of a deposit verification
#[derive(Debug, Clone)]
pub enum DepositVerification {
    Confirmed {
        deposit: DepositRecord,
        balance: Balances,
    },
    NotConfirmed {
        reason: &'static str,
    },
}

/// Deposit confirmation engine
pub struct DepositService {
    db: Db,
    ton: Arc<dyn TonTransfer>,
}

impl DepositService {
    pub fn new(db: Db, ton: Arc<dyn TonTransfer>) -> Self {
        Self { db, ton }
    }

    /// Search the platform wallet's inbound transactions for one matching
    /// the claimed amount and sender; credit on match.
    pub async fn verify_deposit(
        &self,
        user_id: i64,
        amount: u64,
        wallet_address: &str,
    ) -> ServiceResult<DepositVerification> {
        if amount == 0 {
            return Err(ServiceError::validation("amount must be greater than 0"));
        }

        // the user must exist before any chain call is spent on them
        self.db
            .with_tx(|tx| users::get_required(tx, user_id).map_err(ServiceError::from))?;

        let incoming = match self.ton.recent_incoming(SCAN_LIMIT).await {
            Ok(txs) => txs,
            Err(e) => {
                tracing::warn!(target: "plinko::deposit", error = %e, "transaction listing failed");
                return Ok(DepositVerification::NotConfirmed {
                    reason: "no transactions found for game wallet",
                });
            }
        };

        if incoming.is_empty() {
            return Ok(DepositVerification::NotConfirmed {
                reason: "no transactions found for game wallet",
            });
        }

        let matched = incoming.into_iter().find(|tx| {
            tx.amount_nano.abs_diff(amount) <= AMOUNT_TOLERANCE
                && ton::same_account(&tx.source, wallet_address)
        });

        let Some(matched) = matched else {
            log_deposit_event("deposit_not_matched", user_id, amount, false);
            return Ok(DepositVerification::NotConfirmed {
                reason: "no matching TON transaction found",
            });
        };

        let canonical_sender =
            ton::normalize(wallet_address).unwrap_or_else(|_| wallet_address.to_string());

        let result = self.db.with_tx(|tx| {
            let deposit =
                deposits::insert_confirmed(tx, user_id, amount, &canonical_sender, &matched.hash)?;
            users::credit(tx, user_id, Currency::Ton, amount)?;
            let balance = users::balances(tx, user_id)?;
            Ok::<_, ServiceError>(DepositVerification::Confirmed { deposit, balance })
        });

        match result {
            Ok(verification) => {
                log_deposit_event("deposit_confirmed", user_id, amount, true);
                Ok(verification)
            }
            // the matched transaction was already claimed; no second credit
            Err(ServiceError::Store(StoreError::Duplicate(_))) => {
                log_deposit_event("deposit_already_claimed", user_id, amount, false);
                Ok(DepositVerification::NotConfirmed {
                    reason: "transaction already credited",
                })
            }
            Err(e) => Err(e),
        }
    }

    /// A user's deposit history, newest first
    pub fn history(&self, user_id: i64, limit: u32) -> ServiceResult<Vec<DepositRecord>> {
        self.db.with_tx(|tx| {
            users::get_required(tx, user_id)?;
            Ok(deposits::list_for_user(tx, user_id, limit)?)
        })
    }
}
