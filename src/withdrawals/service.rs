//! Withdrawal Lifecycle
//!
//! State machine: `pending → processing → completed | failed | cancelled`,
//! with `manual_review` in front of `pending` for amounts above the review
//! threshold. The gross amount leaves the balance when the request is
//! created and comes back exactly when the request ends in `failed` or
//! `cancelled`, never on `completed`.
//!
//! Processing holds no database transaction while the chain is polled: the
//! row is locked to flip into `processing`, released for the submit/confirm
//! wait, then re-locked to record the outcome. A confirmation timeout is a
//! definitive failure with refund; the rare transfer that landed after the
//! timeout is what the stuck-recovery surface is for.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::logging::log_withdrawal_event;
use crate::policy::WithdrawalPolicy;
use crate::store::{users, withdrawals, Db};
use crate::ton::{self, TonTransfer};
use crate::types::unix_now;
use crate::types::user::Currency;
use crate::types::withdrawal::{WithdrawalRecord, WithdrawalStatus};
use crate::units;

/// Hash recovery matches an outgoing transfer within 0.01 TON of the net
/// amount, absorbing forward fees.
const HASH_MATCH_TOLERANCE: u64 = 10_000_000;

const DAY_SECS: u64 = 24 * 3600;

/// One result of the auto-process sweep
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepItem {
    pub id: i64,
    pub success: bool,
    pub message: String,
}

/// Summary of one auto-process sweep
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepSummary {
    pub processed_count: usize,
    pub results: Vec<SweepItem>,
}

/// Recovery action for withdrawals stuck in processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckAction {
    /// Re-queue for another attempt; refused for rows that already carry a
    /// transaction hash (a second submit could pay twice)
    ResetToPending,
    /// Give up and refund
    CancelAndRefund,
}

/// Withdrawal lifecycle manager
pub struct WithdrawalService {
    db: Db,
    ton: Arc<dyn TonTransfer>,
    policy: WithdrawalPolicy,
    confirm_timeout: Duration,
    sweep_batch_size: u32,
    wallet_configured: bool,
}

impl WithdrawalService {
    pub fn new(db: Db, ton: Arc<dyn TonTransfer>, config: &AppConfig) -> Self {
        Self {
            db,
            ton,
            policy: config.withdrawal_policy.clone(),
            confirm_timeout: config.confirm_timeout,
            sweep_batch_size: config.sweep_batch_size,
            wallet_configured: config.wallet_daemon_url.is_some(),
        }
    }

    /// Create a withdrawal request: validate, check gating and daily
    /// quotas, compute the fee, and reserve the gross amount, all under
    /// one lock. Returns immediately; processing is triggered separately.
    pub fn create(
        &self,
        user_id: i64,
        amount: u64,
        wallet_address: &str,
    ) -> ServiceResult<WithdrawalRecord> {
        if amount == 0 {
            return Err(ServiceError::validation("amount must be greater than 0"));
        }

        let destination = ton::normalize(wallet_address)
            .map_err(|e| ServiceError::validation(format!("invalid TON address: {}", e)))?;

        let now = unix_now();
        let policy = &self.policy;

        let record = self.db.with_tx(|tx| {
            let user = users::get_required(tx, user_id)?;

            if policy.min_account_age_hours > 0 && user.age_hours(now) < policy.min_account_age_hours
            {
                return Err(ServiceError::validation(format!(
                    "account must be at least {} hours old before withdrawing",
                    policy.min_account_age_hours
                )));
            }

            if policy.min_deposit_before_withdrawal > 0 {
                let deposited = users::total_confirmed_deposits(tx, user_id)?;
                if deposited < policy.min_deposit_before_withdrawal {
                    return Err(ServiceError::validation(format!(
                        "a deposit of at least {} is required before withdrawing",
                        units::format_nano(policy.min_deposit_before_withdrawal)
                    )));
                }
            }

            let (daily_withdrawn, daily_count) =
                withdrawals::daily_totals(tx, user_id, now.saturating_sub(DAY_SECS))?;

            policy
                .validate_limits(amount, daily_withdrawn, daily_count)
                .map_err(|violation| {
                    if violation.is_daily_quota() {
                        ServiceError::LimitExceeded(violation.to_string())
                    } else {
                        ServiceError::Validation(violation.to_string())
                    }
                })?;

            let breakdown = policy.calculate_fee(amount);

            // Reserve the gross amount; fails the whole transaction when
            // the balance is short.
            users::debit(tx, user_id, Currency::Ton, amount)?;

            let status = if policy.requires_manual_review(amount) {
                WithdrawalStatus::ManualReview
            } else {
                WithdrawalStatus::Pending
            };

            let record = withdrawals::insert(
                tx,
                user_id,
                breakdown.gross_amount,
                breakdown.fee,
                breakdown.net_amount,
                &destination,
                status,
                policy.should_auto_process(amount),
            )?;

            Ok::<_, ServiceError>(record)
        })?;

        log_withdrawal_event(
            "withdrawal_created",
            record.id,
            record.amount,
            &record.wallet_address,
            true,
            None,
            None,
        );
        Ok(record)
    }

    /// Fire-and-forget processing trigger. The spawned task owns its own
    /// error handling; the caller's request is already committed and done.
    pub fn spawn_process(self: Arc<Self>, withdrawal_id: i64) {
        tokio::spawn(async move {
            if let Err(e) = self.process(withdrawal_id).await {
                tracing::warn!(
                    target: "plinko::withdrawal",
                    withdrawal_id,
                    error = %e,
                    "background processing failed"
                );
            }
        });
    }

    /// Drive a withdrawal through the chain transfer. Idempotent: calling
    /// it again for a completed withdrawal returns the stored result, and
    /// only `pending`/`processing` rows are accepted for another attempt.
    pub async fn process(&self, withdrawal_id: i64) -> ServiceResult<WithdrawalRecord> {
        // Phase 1: flip to processing under the lock, then let it go.
        let record = self.db.with_tx(|tx| {
            let mut record = withdrawals::get_required(tx, withdrawal_id)?;

            if record.status == WithdrawalStatus::Completed {
                return Ok::<_, ServiceError>(record);
            }
            if !matches!(
                record.status,
                WithdrawalStatus::Pending | WithdrawalStatus::Processing
            ) {
                return Err(ServiceError::Conflict(format!(
                    "withdrawal {} is {} and cannot be processed",
                    withdrawal_id, record.status
                )));
            }

            record.mark_processing();
            withdrawals::update(tx, &record)?;
            Ok(record)
        })?;

        if record.status == WithdrawalStatus::Completed {
            return Ok(record);
        }

        if !self.wallet_configured {
            self.fail_and_refund(withdrawal_id, "wallet not configured for withdrawals")?;
            return Err(ServiceError::WalletNotConfigured);
        }

        // Phase 2: the long-latency chain interaction, outside any lock.
        let memo = format!("Withdrawal {}", record.id);
        let outcome = self.transfer_and_confirm(&record, &memo).await;

        // Phase 3: re-lock and record what happened.
        match outcome {
            Ok(tx_ref) => {
                let completed = self.db.with_tx(|tx| {
                    let mut current = withdrawals::get_required(tx, withdrawal_id)?;
                    if current.status != WithdrawalStatus::Processing {
                        // an admin intervened while we were polling; the
                        // transfer result goes to the log, not the ledger
                        return Err(ServiceError::Conflict(format!(
                            "withdrawal {} changed to {} during processing",
                            withdrawal_id, current.status
                        )));
                    }
                    current.mark_completed(tx_ref.clone());
                    withdrawals::update(tx, &current)?;
                    Ok::<_, ServiceError>(current)
                })?;

                log_withdrawal_event(
                    "withdrawal_completed",
                    completed.id,
                    completed.amount,
                    &completed.wallet_address,
                    true,
                    completed.transaction_hash.as_deref(),
                    None,
                );
                Ok(completed)
            }
            Err(reason) => {
                self.fail_and_refund(withdrawal_id, &reason)?;
                Err(ServiceError::ExternalTransfer(reason))
            }
        }
    }

    /// Submit the net amount and wait for the seqno to advance. Returns the
    /// transaction reference on success, a failure reason otherwise.
    async fn transfer_and_confirm(
        &self,
        record: &WithdrawalRecord,
        memo: &str,
    ) -> Result<String, String> {
        let submitted_seqno = self
            .ton
            .submit_transfer(&record.wallet_address, record.net_amount, memo)
            .await
            .map_err(|e| format!("transfer submission failed: {}", e))?;

        let confirmed = self
            .ton
            .wait_for_confirmation(submitted_seqno, self.confirm_timeout)
            .await
            .map_err(|e| format!("confirmation polling failed: {}", e))?;

        if !confirmed {
            return Err("seqno confirmation timeout".to_string());
        }

        // Best-effort hash recovery; a synthetic reference is fine.
        let tx_ref = match self.ton.recent_outgoing(10).await {
            Ok(outgoing) => outgoing
                .into_iter()
                .find(|t| {
                    ton::same_account(&t.destination, &record.wallet_address)
                        && t.amount_nano.abs_diff(record.net_amount) <= HASH_MATCH_TOLERANCE
                })
                .map(|t| t.hash),
            Err(e) => {
                tracing::warn!(
                    target: "plinko::withdrawal",
                    withdrawal_id = record.id,
                    error = %e,
                    "could not look up outgoing transaction hash"
                );
                None
            }
        };

        Ok(tx_ref.unwrap_or_else(|| format!("seqno_{}_w{}", submitted_seqno, record.id)))
    }

    /// Mark failed and return the gross amount, in one transaction. The
    /// refund is skipped when the row left `processing` while the chain
    /// call was in flight; whoever moved it already settled the funds.
    fn fail_and_refund(&self, withdrawal_id: i64, reason: &str) -> ServiceResult<WithdrawalRecord> {
        let record = self.db.with_tx(|tx| {
            let mut record = withdrawals::get_required(tx, withdrawal_id)?;

            if record.status != WithdrawalStatus::Processing {
                return Err(ServiceError::Conflict(format!(
                    "withdrawal {} is {} and cannot be failed",
                    withdrawal_id, record.status
                )));
            }

            users::credit(tx, record.user_id, Currency::Ton, record.amount)?;
            record.mark_failed(reason.to_string());
            withdrawals::update(tx, &record)?;
            Ok::<_, ServiceError>(record)
        })?;

        log_withdrawal_event(
            "withdrawal_failed",
            record.id,
            record.amount,
            &record.wallet_address,
            false,
            None,
            Some(reason),
        );
        Ok(record)
    }

    /// Process up to one batch of pending auto-process withdrawals,
    /// sequentially. A failing item never aborts the sweep.
    pub async fn auto_process_batch(&self) -> ServiceResult<SweepSummary> {
        let batch = self
            .db
            .with_tx(|tx| Ok::<_, ServiceError>(withdrawals::pending_auto_process(tx, self.sweep_batch_size)?))?;

        let mut results = Vec::with_capacity(batch.len());
        for record in &batch {
            match self.process(record.id).await {
                Ok(processed) => results.push(SweepItem {
                    id: record.id,
                    success: true,
                    message: format!("status {}", processed.status),
                }),
                Err(e) => results.push(SweepItem {
                    id: record.id,
                    success: false,
                    message: e.to_string(),
                }),
            }
        }

        Ok(SweepSummary {
            processed_count: batch.len(),
            results,
        })
    }

    /// Admin approval out of manual review. The request re-enters the
    /// pending queue; the caller triggers processing for auto rows.
    pub fn approve(
        &self,
        withdrawal_id: i64,
        admin_id: i64,
        notes: Option<String>,
    ) -> ServiceResult<WithdrawalRecord> {
        self.db.with_tx(|tx| {
            let mut record = withdrawals::get_required(tx, withdrawal_id)?;

            if record.status != WithdrawalStatus::ManualReview {
                return Err(ServiceError::Conflict(
                    "only manual_review withdrawals can be approved".to_string(),
                ));
            }

            record.mark_approved(admin_id, notes);
            withdrawals::update(tx, &record)?;
            Ok(record)
        })
    }

    /// Admin rejection with refund, from pending or manual review
    pub fn reject(
        &self,
        withdrawal_id: i64,
        admin_id: i64,
        reason: Option<String>,
    ) -> ServiceResult<WithdrawalRecord> {
        let record = self.db.with_tx(|tx| {
            let mut record = withdrawals::get_required(tx, withdrawal_id)?;

            if !matches!(
                record.status,
                WithdrawalStatus::Pending | WithdrawalStatus::ManualReview
            ) {
                return Err(ServiceError::Conflict(
                    "cannot reject a processed withdrawal".to_string(),
                ));
            }

            users::credit(tx, record.user_id, Currency::Ton, record.amount)?;
            record.reviewed_by = Some(admin_id);
            record.mark_cancelled(
                reason.unwrap_or_else(|| "rejected by administrator".to_string()),
            );
            withdrawals::update(tx, &record)?;
            Ok::<_, ServiceError>(record)
        })?;

        log_withdrawal_event(
            "withdrawal_rejected",
            record.id,
            record.amount,
            &record.wallet_address,
            true,
            None,
            record.error_message.as_deref(),
        );
        Ok(record)
    }

    /// Emergency cancel-and-refund. Allowed from pending, processing, and
    /// manual_review; never from completed, the TON already left.
    pub fn cancel_and_refund(
        &self,
        withdrawal_id: i64,
        reason: &str,
    ) -> ServiceResult<WithdrawalRecord> {
        let record = self.db.with_tx(|tx| {
            let mut record = withdrawals::get_required(tx, withdrawal_id)?;

            if !record.status.is_cancellable() {
                return Err(ServiceError::Conflict(format!(
                    "withdrawal status '{}' is not cancellable",
                    record.status
                )));
            }

            users::credit(tx, record.user_id, Currency::Ton, record.amount)?;
            record.mark_cancelled(format!("[refund] cancelled by admin: {}", reason));
            record.append_note(&format!("[refund] reason: {}", reason));
            withdrawals::update(tx, &record)?;
            Ok::<_, ServiceError>(record)
        })?;

        log_withdrawal_event(
            "withdrawal_cancelled",
            record.id,
            record.amount,
            &record.wallet_address,
            true,
            None,
            record.error_message.as_deref(),
        );
        Ok(record)
    }

    /// Attach a note without changing state
    pub fn add_note(
        &self,
        withdrawal_id: i64,
        admin_id: i64,
        note: &str,
    ) -> ServiceResult<WithdrawalRecord> {
        self.db.with_tx(|tx| {
            let mut record = withdrawals::get_required(tx, withdrawal_id)?;
            record.reviewed_by = Some(admin_id);
            record.append_note(note);
            withdrawals::update(tx, &record)?;
            Ok(record)
        })
    }

    /// Withdrawals sitting in `processing` with no terminal timestamp
    pub fn stuck(&self) -> ServiceResult<Vec<WithdrawalRecord>> {
        self.db
            .with_tx(|tx| Ok(withdrawals::stuck_processing(tx)?))
    }

    /// Recover stuck withdrawals. `ids` limits the action to specific
    /// rows; `None` sweeps all of them.
    pub fn recover_stuck(
        &self,
        action: StuckAction,
        ids: Option<&[i64]>,
    ) -> ServiceResult<Vec<WithdrawalRecord>> {
        self.db.with_tx(|tx| {
            let stuck = withdrawals::stuck_processing(tx)?;
            let mut affected = Vec::new();

            for mut record in stuck {
                if let Some(ids) = ids {
                    if !ids.contains(&record.id) {
                        continue;
                    }
                }

                match action {
                    StuckAction::ResetToPending => {
                        // a recorded hash means the transfer may have gone
                        // through; re-queueing it could pay twice
                        if record.transaction_hash.is_some() {
                            continue;
                        }
                        record.status = WithdrawalStatus::Pending;
                        record.append_error("reset from stuck processing state");
                        withdrawals::update(tx, &record)?;
                    }
                    StuckAction::CancelAndRefund => {
                        users::credit(tx, record.user_id, Currency::Ton, record.amount)?;
                        record.mark_cancelled(
                            "cancelled from stuck processing state, funds refunded".to_string(),
                        );
                        withdrawals::update(tx, &record)?;
                    }
                }
                affected.push(record);
            }

            Ok::<_, ServiceError>(affected)
        })
    }

    /// Fetch a single withdrawal
    pub fn get(&self, withdrawal_id: i64) -> ServiceResult<WithdrawalRecord> {
        self.db
            .with_tx(|tx| Ok(withdrawals::get_required(tx, withdrawal_id)?))
    }

    /// Admin listing with optional filters
    pub fn list(
        &self,
        status: Option<WithdrawalStatus>,
        user_id: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> ServiceResult<Vec<WithdrawalRecord>> {
        self.db
            .with_tx(|tx| Ok(withdrawals::list(tx, status, user_id, limit, offset)?))
    }

    /// Per-status aggregates; `auto_process_only` narrows to sweep-eligible
    /// rows for the queue view.
    pub fn stats(&self, auto_process_only: bool) -> ServiceResult<Vec<(String, u64, u64)>> {
        self.db
            .with_tx(|tx| Ok(withdrawals::status_stats(tx, auto_process_only)?))
    }

    pub fn auto_process_enabled(&self) -> bool {
        self.policy.auto_process_enabled
    }

    pub fn auto_process_threshold(&self) -> u64 {
        self.policy.auto_process_threshold
    }
}
