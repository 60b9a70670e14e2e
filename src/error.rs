use crate::domain::{Money, WalletId};
use crate::gateway::GatewayError;
use thiserror::Error;

/// Error taxonomy for settlement operations.
///
/// `TransientStore` is the only retryable class; the unit-of-work wrapper
/// retries it internally before surfacing it. Everything else aborts its
/// transaction and is reported to the caller as-is.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Bad input, rejected before any transaction opens.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller does not own the wallet, category, or ad being mutated.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// A debit would drive the balance negative. Hard abort, never clamped.
    #[error("insufficient balance: wallet {wallet} holds {balance}, debit of {required} refused")]
    InsufficientBalance {
        wallet: WalletId,
        balance: Money,
        required: Money,
    },

    /// Attempted transition from an invalid state (double rejection,
    /// verifying a failed payment into success, expired window).
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Retryable conflict/timeout from the store. Surfaced only after the
    /// retry budget is spent.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// Gateway unreachable or returned an error; no local state was mutated.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Non-transient store or invariant failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    /// True if the whole unit of work may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, SettlementError::TransientStore(_))
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_sqlx(&err) {
            SettlementError::TransientStore(err.to_string())
        } else {
            SettlementError::Internal(err.to_string())
        }
    }
}

/// Classify store errors into the retryable class.
///
/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) are lock conflicts that clear on
/// their own; pool acquire timeouts behave the same way under load.
fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5") | Some("6") | Some("517"))
                || db.message().contains("database is locked")
                || db.message().contains("database table is locked")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: SettlementError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let err: SettlementError = sqlx::Error::RowNotFound.into();
        assert!(!err.is_transient());
        assert!(matches!(err, SettlementError::Internal(_)));
    }

    #[test]
    fn test_terminal_classes_not_transient() {
        assert!(!SettlementError::Validation("x".into()).is_transient());
        assert!(!SettlementError::StateConflict("x".into()).is_transient());
        assert!(!SettlementError::Authorization("x".into()).is_transient());
    }
}
