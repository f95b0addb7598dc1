//! Stars Payment Settlement
//!
//! `initiate` records a pending purchase under a fresh payload and asks
//! Telegram for an invoice. Settlement is one idempotent transition keyed
//! by that payload: the client-driven verify call and the bot webhook both
//! land in [`StarsService::settle`], so a payment credits exactly once no
//! matter how many delivery paths race.

use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};
use crate::logging::log_payment_event;
use crate::store::{stars, users, Db};
use crate::telegram::TelegramApi;
use crate::types::stars::StarTransactionStatus;
use crate::types::user::{Balances, Currency};

/// Result of initiating a purchase
#[derive(Debug, Clone)]
pub struct StarsInitiation {
    pub payload: String,
    pub invoice_url: String,
}

/// Result of a settlement attempt
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// Stars were credited by this call
    Credited {
        transaction_id: i64,
        telegram_id: i64,
        amount: u64,
        balance: Balances,
    },
    /// The payload had already been settled; stored result returned as-is
    AlreadyCompleted {
        transaction_id: i64,
        balance: Balances,
    },
    /// Reported amount does not match the recorded intent; the
    /// transaction is now terminally failed
    AmountMismatch,
}

/// Stars settlement engine
pub struct StarsService {
    db: Db,
    telegram: Arc<dyn TelegramApi>,
    max_purchase: u64,
}

impl StarsService {
    pub fn new(db: Db, telegram: Arc<dyn TelegramApi>, max_purchase: u64) -> Self {
        Self {
            db,
            telegram,
            max_purchase,
        }
    }

    /// Record a pending purchase and request an invoice link. The user row
    /// is created on first contact.
    pub async fn initiate(
        &self,
        telegram_id: i64,
        amount: u64,
    ) -> ServiceResult<StarsInitiation> {
        if amount == 0 || amount > self.max_purchase {
            return Err(ServiceError::validation(format!(
                "amount must be between 1 and {} Stars",
                self.max_purchase
            )));
        }

        let payload = format!(
            "stars_{}_{}_{}",
            crate::types::unix_now(),
            telegram_id,
            uuid::Uuid::new_v4().simple()
        );

        let record = self.db.with_tx(|tx| {
            let user = match users::get_by_telegram_id(tx, telegram_id)? {
                Some(user) => user,
                None => users::create(
                    tx,
                    Some(telegram_id),
                    Some(&format!("user_{}", telegram_id)),
                )?,
            };

            Ok::<_, ServiceError>(stars::insert_pending(
                tx,
                user.id,
                telegram_id,
                amount,
                &payload,
            )?)
        })?;

        let invoice_url = match self
            .telegram
            .create_stars_invoice(
                telegram_id,
                amount,
                &format!("Top up {} Stars", amount),
                "Stars top-up for the Plinko game balance",
                &payload,
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                // the intent is dead without an invoice; close it out
                self.db.with_tx(|tx| {
                    let mut record = record.clone();
                    record.mark_failed(String::new(), String::new());
                    stars::update(tx, &record)?;
                    Ok::<_, ServiceError>(())
                })?;
                return Err(ServiceError::internal(format!(
                    "invoice creation failed: {}",
                    e
                )));
            }
        };

        log_payment_event("stars_initiated", &payload, amount, true);
        Ok(StarsInitiation {
            payload,
            invoice_url,
        })
    }

    /// The idempotent settlement transition. Both the verify endpoint and
    /// the payment webhook call this and nothing else mutates a
    /// star transaction.
    pub fn settle(
        &self,
        telegram_id: i64,
        payload: &str,
        amount: u64,
        telegram_charge_id: &str,
        provider_charge_id: &str,
    ) -> ServiceResult<SettleOutcome> {
        let outcome = self.db.with_tx(|tx| {
            let mut record = stars::get_by_payload(tx, payload, telegram_id)?
                .ok_or_else(|| ServiceError::not_found("star transaction"))?;

            match record.status {
                StarTransactionStatus::Completed => {
                    let balance = users::balances(tx, record.user_id)?;
                    return Ok::<_, ServiceError>(SettleOutcome::AlreadyCompleted {
                        transaction_id: record.id,
                        balance,
                    });
                }
                StarTransactionStatus::Failed => {
                    return Err(ServiceError::Conflict(
                        "transaction was cancelled or failed".to_string(),
                    ));
                }
                StarTransactionStatus::Pending => {}
            }

            if record.amount != amount {
                record.mark_failed(
                    telegram_charge_id.to_string(),
                    provider_charge_id.to_string(),
                );
                stars::update(tx, &record)?;
                return Ok(SettleOutcome::AmountMismatch);
            }

            users::credit(tx, record.user_id, Currency::Stars, amount)?;
            record.mark_completed(
                telegram_charge_id.to_string(),
                provider_charge_id.to_string(),
            );
            stars::update(tx, &record)?;

            let balance = users::balances(tx, record.user_id)?;
            Ok(SettleOutcome::Credited {
                transaction_id: record.id,
                telegram_id,
                amount,
                balance,
            })
        })?;

        match &outcome {
            SettleOutcome::Credited { amount, .. } => {
                log_payment_event("stars_credited", payload, *amount, true)
            }
            SettleOutcome::AmountMismatch => {
                log_payment_event("stars_amount_mismatch", payload, amount, false)
            }
            SettleOutcome::AlreadyCompleted { .. } => {}
        }

        Ok(outcome)
    }

    /// Client-driven verification path. Cross-checks the payment with the
    /// Bot API when a charge id is supplied, settles, and fires the
    /// success notification without blocking on it.
    pub async fn verify(
        &self,
        telegram_id: i64,
        payload: &str,
        amount: u64,
        telegram_charge_id: &str,
        provider_charge_id: &str,
    ) -> ServiceResult<SettleOutcome> {
        if !telegram_charge_id.is_empty() {
            let valid = self
                .telegram
                .verify_stars_payment(payload, telegram_charge_id)
                .await
                .map_err(|e| ServiceError::internal(format!("payment verification: {}", e)))?;

            if !valid {
                self.db.with_tx(|tx| {
                    if let Some(mut record) = stars::get_by_payload(tx, payload, telegram_id)? {
                        if record.status == StarTransactionStatus::Pending {
                            record.mark_failed(
                                telegram_charge_id.to_string(),
                                provider_charge_id.to_string(),
                            );
                            stars::update(tx, &record)?;
                        }
                    }
                    Ok::<_, ServiceError>(())
                })?;
                return Err(ServiceError::validation(
                    "payment did not pass Telegram verification",
                ));
            }
        }

        let outcome = self.settle(
            telegram_id,
            payload,
            amount,
            telegram_charge_id,
            provider_charge_id,
        )?;

        if let SettleOutcome::Credited {
            telegram_id,
            amount,
            balance,
            ..
        } = &outcome
        {
            let telegram = Arc::clone(&self.telegram);
            let (telegram_id, amount, stars_balance) =
                (*telegram_id, *amount, balance.stars_balance);
            tokio::spawn(async move {
                if let Err(e) = telegram
                    .send_payment_notification(telegram_id, amount, stars_balance)
                    .await
                {
                    tracing::warn!(
                        target: "plinko::payment",
                        telegram_id,
                        error = %e,
                        "payment notification failed"
                    );
                }
            });
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use crate::telegram::{MockTelegramApi, TelegramError};

    fn invoice_mock() -> MockTelegramApi {
        let mut telegram = MockTelegramApi::new();
        telegram
            .expect_create_stars_invoice()
            .returning(|_, _, _, _, _| Ok("https://t.me/invoice/abc".to_string()));
        telegram
            .expect_send_payment_notification()
            .returning(|_, _, _| Ok(()));
        telegram
    }

    fn service(telegram: MockTelegramApi) -> (Arc<StarsService>, Db) {
        let db = Db::in_memory().unwrap();
        (
            Arc::new(StarsService::new(db.clone(), Arc::new(telegram), 10_000)),
            db,
        )
    }

    fn stars_balance(db: &Db, telegram_id: i64) -> u64 {
        db.with_tx::<_, StoreError>(|tx| {
            let user = users::get_by_telegram_id(tx, telegram_id)?.unwrap();
            Ok(user.stars_balance)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_creates_user_and_pending_intent() {
        let (service, db) = service(invoice_mock());

        let initiation = service.initiate(42, 100).await.unwrap();
        assert!(initiation.payload.starts_with("stars_"));
        assert_eq!(initiation.invoice_url, "https://t.me/invoice/abc");

        let record = db
            .with_tx::<_, StoreError>(|tx| {
                Ok(stars::get_by_payload(tx, &initiation.payload, 42)?.unwrap())
            })
            .unwrap();
        assert_eq!(record.status, StarTransactionStatus::Pending);
        assert_eq!(record.amount, 100);
        assert_eq!(stars_balance(&db, 42), 0);
    }

    #[tokio::test]
    async fn test_initiate_rejects_out_of_range_amounts() {
        let (service, _db) = service(MockTelegramApi::new());

        assert!(matches!(
            service.initiate(42, 0).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.initiate(42, 10_001).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invoice_failure_fails_the_intent() {
        let mut telegram = MockTelegramApi::new();
        telegram
            .expect_create_stars_invoice()
            .returning(|_, _, _, _, _| Err(TelegramError::Api("flood wait".to_string())));
        let (service, db) = service(telegram);

        let err = service.initiate(42, 100).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));

        // the orphaned intent is terminally failed, not dangling
        let count: i64 = db
            .read(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM star_transactions WHERE status = 'failed'",
                    [],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_settle_credits_exactly_once() {
        let (service, db) = service(invoice_mock());
        let initiation = service.initiate(42, 100).await.unwrap();

        let first = service
            .settle(42, &initiation.payload, 100, "tg1", "pp1")
            .unwrap();
        let SettleOutcome::Credited { balance, .. } = first else {
            panic!("expected credit");
        };
        assert_eq!(balance.stars_balance, 100);

        // the second delivery of the same payment is a no-op
        let second = service
            .settle(42, &initiation.payload, 100, "tg1", "pp1")
            .unwrap();
        assert!(matches!(second, SettleOutcome::AlreadyCompleted { .. }));
        assert_eq!(stars_balance(&db, 42), 100);
    }

    #[tokio::test]
    async fn test_settle_unknown_payload_is_not_found() {
        let (service, db) = service(MockTelegramApi::new());

        let err = service.settle(42, "stars_nope", 100, "", "").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // no row appeared
        let count: i64 = db
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM star_transactions", [], |row| {
                    row.get(0)
                })
                .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_settle_amount_mismatch_fails_terminally() {
        let (service, db) = service(invoice_mock());
        let initiation = service.initiate(42, 100).await.unwrap();

        let outcome = service
            .settle(42, &initiation.payload, 250, "tg1", "pp1")
            .unwrap();
        assert!(matches!(outcome, SettleOutcome::AmountMismatch));
        assert_eq!(stars_balance(&db, 42), 0);

        // the intent is burned; even the right amount cannot settle now
        let err = service
            .settle(42, &initiation.payload, 100, "tg1", "pp1")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_verify_and_webhook_converge() {
        let mut telegram = invoice_mock();
        telegram
            .expect_verify_stars_payment()
            .returning(|_, _| Ok(true));
        let (service, db) = service(telegram);

        let initiation = service.initiate(42, 100).await.unwrap();

        // webhook settles first
        let webhook = service
            .settle(42, &initiation.payload, 100, "tg1", "pp1")
            .unwrap();
        assert!(matches!(webhook, SettleOutcome::Credited { .. }));

        // client verify arrives later and sees the stored result
        let verify = service
            .verify(42, &initiation.payload, 100, "tg1", "pp1")
            .await
            .unwrap();
        assert!(matches!(verify, SettleOutcome::AlreadyCompleted { .. }));
        assert_eq!(stars_balance(&db, 42), 100);
    }

    #[tokio::test]
    async fn test_verify_rejects_invalid_payment() {
        let mut telegram = invoice_mock();
        telegram
            .expect_verify_stars_payment()
            .returning(|_, _| Ok(false));
        let (service, db) = service(telegram);

        let initiation = service.initiate(42, 100).await.unwrap();
        let err = service
            .verify(42, &initiation.payload, 100, "tg_bad", "pp_bad")
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(stars_balance(&db, 42), 0);

        let record = db
            .with_tx::<_, StoreError>(|tx| {
                Ok(stars::get_by_payload(tx, &initiation.payload, 42)?.unwrap())
            })
            .unwrap();
        assert_eq!(record.status, StarTransactionStatus::Failed);
    }
}
