//! Transaction queueing, batching, and completion for single-writer SQL
//! databases accessed through an asynchronous execution bridge.
//!
//! The conductor sits in front of an engine that permits only one in-flight
//! transaction per database: callers queue transactions against a named
//! database, the conductor serializes them strictly in submission order,
//! dispatches their statements to the bridge in batches, fans results back
//! to per-statement handlers, and finishes each transaction with COMMIT or
//! ROLLBACK before advancing the queue.

pub mod bridge;
pub mod conductor;
pub mod config;
pub mod database;
pub mod error;
pub mod prelude;
mod queue;
pub mod results;
pub mod statement;
pub mod transaction;
pub mod value;

pub use bridge::{
    BatchItemResolution, BatchStatement, ExecutionBridge, OpenedDatabase, StatementOutcome,
};
pub use conductor::{OpenCompleteHandler, OpenErrorHandler, SqlConductor};
pub use config::{ConductorConfig, DatabaseConfig, QueuePolicy, StorageLocation};
pub use database::{
    BatchStep, DatabaseHandle, SingleStatementErrorHandler, SingleStatementSuccessHandler,
};
pub use error::{ConductorError, StatementError};
pub use results::{RowList, SqlRow, StatementPayload, StatementResult};
pub use statement::{ErrorDisposition, StatementErrorHandler, StatementSuccessHandler};
pub use transaction::{
    Transaction, TransactionBody, TransactionCompleteHandler, TransactionErrorHandler,
};
pub use value::SqlValue;
