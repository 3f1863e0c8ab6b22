use lazy_static::lazy_static;
use regex::Regex;

use crate::bridge::BatchStatement;
use crate::error::{ConductorError, StatementError};
use crate::results::StatementResult;
use crate::transaction::Transaction;
use crate::value::SqlValue;

lazy_static! {
    // Leading-keyword test for statements that mutate the database; leading
    // whitespace and semicolons are skipped before the keyword.
    static ref MUTATING_SQL: Regex = Regex::new(
        r"(?i)^(\s|;)*(alter|create|delete|drop|insert|reindex|replace|update)"
    )
    .unwrap();
}

/// Whether a read-only transaction must reject this statement text.
pub(crate) fn is_mutating_sql(sql: &str) -> bool {
    MUTATING_SQL.is_match(sql)
}

/// What a statement error handler decided about the failure it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// The handler dealt with the failure; the transaction proceeds.
    Handled,
    /// Escalate the failure to a transaction-level error.
    Escalate,
}

/// Per-statement success handler. Runs with the transaction borrowed so it
/// can append follow-up statements; returning an error escalates to a
/// transaction-level failure.
pub type StatementSuccessHandler =
    Box<dyn FnOnce(&mut Transaction, StatementResult) -> Result<(), ConductorError> + Send>;

/// Per-statement error handler. Must return [`ErrorDisposition::Handled`] to
/// suppress escalation.
pub type StatementErrorHandler =
    Box<dyn FnOnce(&mut Transaction, &StatementError) -> ErrorDisposition + Send>;

/// Who appended a statement; the driver maps failures of implicit statements
/// to their dedicated error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementRole {
    Begin,
    Placeholder,
    User,
    Commit,
    Rollback,
}

/// An immutable description of one statement awaiting dispatch: sql text,
/// coerced parameters, and the optional handlers its resolution will invoke.
pub(crate) struct StatementRequest {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlValue>,
    pub(crate) on_success: Option<StatementSuccessHandler>,
    pub(crate) on_error: Option<StatementErrorHandler>,
    pub(crate) role: StatementRole,
}

impl StatementRequest {
    pub(crate) fn user(
        sql: String,
        params: Vec<SqlValue>,
        on_success: Option<StatementSuccessHandler>,
        on_error: Option<StatementErrorHandler>,
    ) -> Self {
        Self {
            sql,
            params,
            on_success,
            on_error,
            role: StatementRole::User,
        }
    }

    /// A statement the transaction machinery issues on its own behalf
    /// (BEGIN, COMMIT, ROLLBACK, or the empty-transaction placeholder).
    pub(crate) fn internal(sql: &str, role: StatementRole) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
            on_success: None,
            on_error: None,
            role,
        }
    }

    /// The wire form of this statement.
    pub(crate) fn envelope(&self) -> BatchStatement {
        BatchStatement {
            sql: self.sql.clone(),
            params: self.params.clone(),
        }
    }
}

impl std::fmt::Debug for StatementRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementRequest")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .field("role", &self.role)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
