//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::bridge::{
    BatchItemResolution, BatchStatement, ExecutionBridge, OpenedDatabase, StatementOutcome,
};
pub use crate::conductor::SqlConductor;
pub use crate::config::{ConductorConfig, DatabaseConfig, QueuePolicy, StorageLocation};
pub use crate::database::{BatchStep, DatabaseHandle};
pub use crate::error::{ConductorError, StatementError};
pub use crate::results::{RowList, SqlRow, StatementPayload, StatementResult};
pub use crate::statement::ErrorDisposition;
pub use crate::transaction::Transaction;
pub use crate::value::SqlValue;
