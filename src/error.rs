//! Error taxonomy for the reconciliation engine.
//!
//! Every public operation returns [`Result`]. Only [`LedgerError::Storage`]
//! failures are worth a transparent retry by the caller; everything else is a
//! rejected request with no partial write behind it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed or out-of-range operator input.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Referenced record does not exist or is not in the expected state.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Paying a shop whose balance is zero or negative.
    #[error("Nothing to pay: {0}")]
    NothingToPay(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether the caller may retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
