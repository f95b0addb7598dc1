//! Service Error Taxonomy
//!
//! Unified error type for the settlement services. Every variant maps to a
//! machine-readable code and an HTTP status; validation-class errors never
//! mutate state, external-transfer failures always trigger a compensating
//! refund before they surface here.

use thiserror::Error;

use crate::store::StoreError;

/// Root error type for settlement operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad input shape or range. Never mutates state.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown user/bet/withdrawal/transaction
    #[error("{0} not found")]
    NotFound(String),

    /// Balance too low for the requested debit. Never mutates state.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    /// Daily cap or per-request limit exceeded. Never mutates state.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// A terminal-state record was asked to transition again
    #[error("conflict: {0}")]
    Conflict(String),

    /// Admin credentials missing or wrong
    #[error("unauthorized")]
    Unauthorized,

    /// Platform wallet is not configured for real transfers
    #[error("wallet not configured for withdrawals")]
    WalletNotConfigured,

    /// Blockchain submission or confirmation failed; funds were refunded
    #[error("external transfer failed: {0}")]
    ExternalTransfer(String),

    /// Storage failure
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Unexpected failure; the surrounding transaction was rolled back
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::InsufficientFunds { .. } => "INSUFFICIENT_BALANCE",
            ServiceError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::Unauthorized => "UNAUTHORIZED",
            ServiceError::WalletNotConfigured => "WALLET_NOT_CONFIGURED",
            ServiceError::ExternalTransfer(_) => "TRANSFER_FAILED",
            ServiceError::Store(_) => "STORAGE_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Validation(_)
            | ServiceError::InsufficientFunds { .. }
            | ServiceError::LimitExceeded(_) => 400,
            ServiceError::Unauthorized => 401,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::WalletNotConfigured => 503,
            ServiceError::ExternalTransfer(_) => 502,
            ServiceError::Store(_) | ServiceError::Internal(_) => 500,
        }
    }

    /// Check if this error class is safe to retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ExternalTransfer(_) | ServiceError::Store(_)
        )
    }
}

/// Storage errors keep their taxonomy class when they cross the service
/// boundary: a missing row is `NotFound`, a failed balance check is
/// `InsufficientFunds`, everything else is a storage failure.
impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::InsufficientFunds {
                available,
                required,
            } => ServiceError::InsufficientFunds {
                available,
                required,
            },
            other => ServiceError::Store(other),
        }
    }
}

/// Result type alias using ServiceError
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_status() {
        let err = ServiceError::InsufficientFunds {
            available: 5,
            required: 10,
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("available 5"));
    }

    #[test]
    fn test_retryable_classes() {
        assert!(ServiceError::ExternalTransfer("timeout".into()).is_retryable());
        assert!(!ServiceError::Validation("bad amount".into()).is_retryable());
        assert!(!ServiceError::Unauthorized.is_retryable());
    }
}
