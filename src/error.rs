use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed per-statement error, as delivered by the execution bridge.
///
/// Bridges report failures as a numeric code plus a message; code `0` means
/// the bridge could not classify the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("code {code}: {message}")]
pub struct StatementError {
    pub code: u32,
    pub message: String,
}

impl StatementError {
    pub const UNKNOWN_ERR: u32 = 0;
    pub const DATABASE_ERR: u32 = 1;
    pub const SYNTAX_ERR: u32 = 5;
    pub const CONSTRAINT_ERR: u32 = 6;

    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// An error with no useful classification from the bridge.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Self::UNKNOWN_ERR, message)
    }
}

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("invalid call: {0}")]
    CallerUsage(String),

    #[error("database not open: {0}")]
    ConnectionNotOpen(String),

    #[error("connection failure: {0}")]
    ConnectionFailed(String),

    #[error("invalid sql for a read-only transaction: {0}")]
    ReadOnlyViolation(String),

    #[error("a statement with no error handler failed: {0}")]
    UnhandledStatement(StatementError),

    #[error("a statement error handler did not suppress the error: {0}")]
    UnsuppressedStatement(StatementError),

    #[error("transaction is already finalized")]
    TransactionFinalized,

    #[error("unable to begin transaction: {0}")]
    BeginFailed(StatementError),

    #[error("error while trying to commit: {0}")]
    CommitFailed(StatementError),

    #[error("error while trying to roll back: {0}")]
    RollbackFailed(StatementError),

    #[error("database cannot be closed while a transaction is in progress: {0}")]
    CloseWhileBusy(String),

    #[error("execution bridge error: {0}")]
    Bridge(String),
}
