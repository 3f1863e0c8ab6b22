use std::path::PathBuf;

use crate::conductor::SqlConductor;
use crate::error::{ConductorError, StatementError};
use crate::results::StatementResult;
use crate::statement::{ErrorDisposition, StatementErrorHandler, StatementSuccessHandler};
use crate::transaction::{
    Transaction, TransactionBody, TransactionCompleteHandler, TransactionErrorHandler,
    TransactionPlan,
};
use crate::value::SqlValue;

/// Success callback for a fire-and-forget single statement.
pub type SingleStatementSuccessHandler = Box<dyn FnOnce(StatementResult) + Send>;

/// Error callback for a fire-and-forget single statement.
pub type SingleStatementErrorHandler = Box<dyn FnOnce(StatementError) + Send>;

/// One step of a batch submitted through [`DatabaseHandle::sql_batch`].
#[derive(Debug, Clone)]
pub struct BatchStep {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl From<&str> for BatchStep {
    fn from(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

impl From<String> for BatchStep {
    fn from(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }
}

impl<S: Into<String>> From<(S, Vec<SqlValue>)> for BatchStep {
    fn from((sql, params): (S, Vec<SqlValue>)) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Caller-facing handle to one named database.
///
/// Handles are cheap to clone; there can be several handles to the same
/// open database, all feeding the same admission queue.
#[derive(Clone)]
pub struct DatabaseHandle {
    name: String,
    conductor: SqlConductor,
}

impl DatabaseHandle {
    pub(crate) fn new(name: String, conductor: SqlConductor) -> Self {
        Self { name, conductor }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved storage path, once the open has been acknowledged.
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.conductor.storage_path(&self.name)
    }

    /// Queue an exclusive transaction: its statements run wrapped in
    /// BEGIN/COMMIT (or ROLLBACK on failure), and nothing else runs against
    /// this database while it is in flight.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotOpen` when the database is neither open nor
    /// opening.
    pub fn exclusive_transaction<B>(
        &self,
        body: B,
        on_error: Option<TransactionErrorHandler>,
        on_complete: Option<TransactionCompleteHandler>,
    ) -> Result<(), ConductorError>
    where
        B: FnOnce(&mut Transaction) -> Result<(), ConductorError> + Send + 'static,
    {
        self.submit_plan(Box::new(body), on_error, on_complete, true, false)
    }

    /// Queue a read-only transaction: statements matching the mutating
    /// keyword pattern are rejected, and no BEGIN/COMMIT ceremony is issued.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotOpen` when the database is neither open nor
    /// opening.
    pub fn read_transaction<B>(
        &self,
        body: B,
        on_error: Option<TransactionErrorHandler>,
        on_complete: Option<TransactionCompleteHandler>,
    ) -> Result<(), ConductorError>
    where
        B: FnOnce(&mut Transaction) -> Result<(), ConductorError> + Send + 'static,
    {
        self.submit_plan(Box::new(body), on_error, on_complete, false, true)
    }

    /// Queue a single fire-and-forget statement with no explicit transaction
    /// ceremony. The statement still takes its turn in the admission queue.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotOpen` when the database is neither open nor
    /// opening.
    pub fn execute_sql(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
        on_success: Option<SingleStatementSuccessHandler>,
        on_error: Option<SingleStatementErrorHandler>,
    ) -> Result<(), ConductorError> {
        let success_relay: Option<StatementSuccessHandler> = on_success.map(|cb| {
            Box::new(move |_tx: &mut Transaction, result: StatementResult| {
                cb(result);
                Ok(())
            }) as StatementSuccessHandler
        });
        let error_relay: Option<StatementErrorHandler> = on_error.map(|cb| {
            Box::new(move |_tx: &mut Transaction, err: &StatementError| {
                cb(err.clone());
                ErrorDisposition::Handled
            }) as StatementErrorHandler
        });
        let sql = sql.into();
        let body =
            move |tx: &mut Transaction| tx.execute_sql_with(sql, params, success_relay, error_relay);
        self.submit_plan(Box::new(body), None, None, false, false)
    }

    /// Queue a list of statements as one exclusive transaction: all of them
    /// commit together or none do.
    ///
    /// # Errors
    ///
    /// Returns `CallerUsage` when a step has empty statement text, and
    /// `ConnectionNotOpen` when the database is neither open nor opening.
    pub fn sql_batch(
        &self,
        steps: Vec<BatchStep>,
        on_error: Option<TransactionErrorHandler>,
        on_complete: Option<TransactionCompleteHandler>,
    ) -> Result<(), ConductorError> {
        if steps.iter().any(|step| step.sql.is_empty()) {
            return Err(ConductorError::CallerUsage(
                "sql batch step must not be empty".to_string(),
            ));
        }
        let body = move |tx: &mut Transaction| {
            for step in steps {
                tx.execute_sql(step.sql, step.params)?;
            }
            Ok(())
        };
        self.submit_plan(Box::new(body), on_error, on_complete, true, false)
    }

    /// Close this database. Fails with `CloseWhileBusy` while a transaction
    /// is in flight; queued transactions are retained or aborted according
    /// to the conductor's queue policy.
    pub async fn close(&self) -> Result<(), ConductorError> {
        self.conductor.close_database(&self.name).await
    }

    fn submit_plan(
        &self,
        body: TransactionBody,
        on_error: Option<TransactionErrorHandler>,
        on_complete: Option<TransactionCompleteHandler>,
        exclusive: bool,
        read_only: bool,
    ) -> Result<(), ConductorError> {
        self.conductor.submit(
            &self.name,
            TransactionPlan {
                body,
                on_error,
                on_complete,
                exclusive,
                read_only,
            },
        )
    }
}
