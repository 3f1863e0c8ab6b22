use std::mem;

use tracing::debug;

use crate::conductor::SqlConductor;
use crate::error::{ConductorError, StatementError};
use crate::statement::{
    ErrorDisposition, StatementErrorHandler, StatementRequest, StatementRole,
    StatementSuccessHandler, is_mutating_sql,
};
use crate::value::SqlValue;

/// The body of a transaction: runs once, synchronously, and appends the
/// statements the transaction should execute. Returning an error aborts the
/// whole transaction before anything is dispatched.
pub type TransactionBody =
    Box<dyn FnOnce(&mut Transaction) -> Result<(), ConductorError> + Send>;

/// Terminal error callback for a transaction. Invoked at most once.
pub type TransactionErrorHandler = Box<dyn FnOnce(ConductorError) + Send>;

/// Terminal success callback for a transaction. Invoked at most once.
pub type TransactionCompleteHandler = Box<dyn FnOnce() + Send>;

/// One logical unit of work against a single database.
///
/// A transaction accumulates statements; it never executes them itself. The
/// driver dispatches accumulated statements in batches and feeds results back
/// through the per-statement handlers, which may append follow-up statements
/// to the same transaction.
pub struct Transaction {
    exclusive: bool,
    read_only: bool,
    finalized: bool,
    pending: Vec<StatementRequest>,
}

impl Transaction {
    /// Exclusive transactions open with an implicit BEGIN; everything else is
    /// seeded with a harmless placeholder so that a body which appends no
    /// statements still produces exactly one round trip.
    pub(crate) fn new(exclusive: bool, read_only: bool) -> Self {
        let seed = if exclusive {
            StatementRequest::internal("BEGIN", StatementRole::Begin)
        } else {
            StatementRequest::internal("SELECT 1", StatementRole::Placeholder)
        };
        Self {
            exclusive,
            read_only,
            finalized: false,
            pending: vec![seed],
        }
    }

    /// Whether this transaction wraps its work in BEGIN/COMMIT/ROLLBACK.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether mutating statements are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Append a statement with no per-statement handlers.
    pub fn execute_sql(
        &mut self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<(), ConductorError> {
        self.execute_sql_with(sql, params, None, None)
    }

    /// Append a statement with optional success and error handlers.
    ///
    /// # Errors
    ///
    /// Returns `TransactionFinalized` once the transaction has reached a
    /// terminal state. For a read-only transaction, a statement matching the
    /// mutating-keyword pattern is handed to its error handler instead of
    /// being appended; the call returns `ReadOnlyViolation` (no handler) or
    /// `UnsuppressedStatement` (handler escalated) unless the handler
    /// suppresses the failure.
    pub fn execute_sql_with(
        &mut self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
        on_success: Option<StatementSuccessHandler>,
        on_error: Option<StatementErrorHandler>,
    ) -> Result<(), ConductorError> {
        if self.finalized {
            return Err(ConductorError::TransactionFinalized);
        }
        let sql = sql.into();
        if self.read_only && is_mutating_sql(&sql) {
            let err = StatementError::new(
                StatementError::SYNTAX_ERR,
                "invalid sql for a read-only transaction",
            );
            if let Some(handler) = on_error {
                return match handler(self, &err) {
                    ErrorDisposition::Handled => Ok(()),
                    ErrorDisposition::Escalate => {
                        Err(ConductorError::UnsuppressedStatement(err))
                    }
                };
            }
            return Err(ConductorError::ReadOnlyViolation(sql));
        }
        self.pending
            .push(StatementRequest::user(sql, params, on_success, on_error));
        Ok(())
    }

    fn take_pending(&mut self) -> Vec<StatementRequest> {
        mem::take(&mut self.pending)
    }
}

/// Everything needed to run one transaction once it is dequeued.
pub(crate) struct TransactionPlan {
    pub(crate) body: TransactionBody,
    pub(crate) on_error: Option<TransactionErrorHandler>,
    pub(crate) on_complete: Option<TransactionCompleteHandler>,
    pub(crate) exclusive: bool,
    pub(crate) read_only: bool,
}

impl TransactionPlan {
    /// Terminal path for a transaction that never left the queue: its body
    /// has not run and no statement was ever dispatched, so the only effect
    /// is the error callback. The running flag is not touched because it was
    /// never set for this transaction.
    pub(crate) fn abort_from_queue(self, err: ConductorError) {
        if let Some(on_error) = self.on_error {
            on_error(err);
        }
    }
}

/// Run one dequeued transaction to its terminal state. The running flag for
/// `name` is held for the whole call and released on every exit path.
pub(crate) async fn drive(conductor: SqlConductor, name: String, plan: TransactionPlan) {
    let mut tx = Transaction::new(plan.exclusive, plan.read_only);

    // STARTED: the body only collects statements; a body error aborts the
    // transaction before anything reaches the bridge.
    if let Err(err) = (plan.body)(&mut tx) {
        debug!(db = %name, error = %err, "transaction body failed");
        conductor.release(&name);
        if let Some(on_error) = plan.on_error {
            on_error(err);
        }
        return;
    }

    // RUNNING / AWAITING_BRIDGE: dispatch everything accumulated since the
    // last batch, wait for the whole batch to resolve, repeat while handlers
    // keep appending statements.
    let mut failure: Option<ConductorError> = None;
    while failure.is_none() {
        let batch = tx.take_pending();
        failure = run_batch(&conductor, &name, &mut tx, batch).await;
        if tx.pending.is_empty() {
            break;
        }
    }
    if failure.is_some() {
        // Statements appended by handlers after the failure was recorded are
        // void; nothing of them was ever sent to the bridge.
        tx.pending.clear();
    }

    finalize(&conductor, &name, &mut tx, plan.on_error, plan.on_complete, failure).await;
}

/// Dispatch one batch and block on the barrier: every statement must resolve
/// before the transaction moves on. Returns the first escalated failure, if
/// any; once a failure is recorded the remaining resolutions of the batch
/// bypass their handlers.
async fn run_batch(
    conductor: &SqlConductor,
    name: &str,
    tx: &mut Transaction,
    mut batch: Vec<StatementRequest>,
) -> Option<ConductorError> {
    let envelopes = batch.iter().map(StatementRequest::envelope).collect();
    let mut rx = conductor.bridge().dispatch_batch(name, envelopes);

    let mut waiting = batch.len();
    let mut failure: Option<ConductorError> = None;
    while waiting > 0 {
        let Some(resolution) = rx.recv().await else {
            if failure.is_none() {
                failure = Some(ConductorError::Bridge(format!(
                    "bridge dropped {waiting} unresolved statement(s) for {name}"
                )));
            }
            break;
        };
        waiting -= 1;
        let Some(request) = batch.get_mut(resolution.index) else {
            debug!(db = %name, index = resolution.index, "resolution for unknown batch index");
            continue;
        };
        if failure.is_some() {
            continue;
        }
        failure = resolve_statement(tx, request, resolution.outcome);
    }
    failure
}

/// Feed one resolution to its statement's handlers, returning the failure to
/// record if the statement escalates.
fn resolve_statement(
    tx: &mut Transaction,
    request: &mut StatementRequest,
    outcome: crate::bridge::StatementOutcome,
) -> Option<ConductorError> {
    use crate::bridge::StatementOutcome;

    match outcome {
        StatementOutcome::Success(payload) => match request.on_success.take() {
            Some(handler) => handler(tx, payload.into()).err(),
            None => None,
        },
        StatementOutcome::Failure(err) => match request.role {
            StatementRole::Begin => Some(ConductorError::BeginFailed(err)),
            StatementRole::Commit => Some(ConductorError::CommitFailed(err)),
            StatementRole::Rollback => Some(ConductorError::RollbackFailed(err)),
            StatementRole::Placeholder | StatementRole::User => {
                match request.on_error.take() {
                    Some(handler) => match handler(tx, &err) {
                        ErrorDisposition::Handled => None,
                        ErrorDisposition::Escalate => {
                            Some(ConductorError::UnsuppressedStatement(err))
                        }
                    },
                    None => Some(ConductorError::UnhandledStatement(err)),
                }
            }
        },
    }
}

/// FINALIZING / FINALIZED: dispatch the closing COMMIT or ROLLBACK for
/// exclusive transactions, release the running flag, and fire exactly one of
/// the terminal callbacks.
async fn finalize(
    conductor: &SqlConductor,
    name: &str,
    tx: &mut Transaction,
    on_error: Option<TransactionErrorHandler>,
    on_complete: Option<TransactionCompleteHandler>,
    failure: Option<ConductorError>,
) {
    if tx.finalized {
        return;
    }
    tx.finalized = true;

    let closing_failure = if tx.exclusive {
        let (sql, role) = if failure.is_some() {
            ("ROLLBACK", StatementRole::Rollback)
        } else {
            ("COMMIT", StatementRole::Commit)
        };
        let closing = StatementRequest::internal(sql, role);
        run_batch(conductor, name, tx, vec![closing]).await
    } else {
        None
    };

    conductor.release(name);

    match (failure, closing_failure) {
        (None, None) => {
            if let Some(on_complete) = on_complete {
                on_complete();
            }
        }
        // A failed COMMIT is always reported; a failed ROLLBACK replaces the
        // failure that triggered it.
        (None, Some(err)) | (Some(_), Some(err)) => {
            deliver_error(name, on_error, err);
        }
        (Some(err), None) => {
            deliver_error(name, on_error, err);
        }
    }
}

fn deliver_error(name: &str, on_error: Option<TransactionErrorHandler>, err: ConductorError) {
    match on_error {
        Some(on_error) => on_error(err),
        None => debug!(db = %name, error = %err, "transaction failed with no error callback"),
    }
}
