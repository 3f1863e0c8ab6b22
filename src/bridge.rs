use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::DatabaseConfig;
use crate::error::StatementError;
use crate::results::StatementPayload;
use crate::value::SqlValue;

/// One statement of a dispatched batch, as sent across the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Terminal outcome of one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementOutcome {
    Success(StatementPayload),
    #[serde(rename = "error")]
    Failure(StatementError),
}

/// A resolved statement of an in-flight batch.
///
/// `index` correlates the outcome to the input position of the statement in
/// the dispatched batch; resolutions may be delivered in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemResolution {
    pub index: usize,
    pub outcome: StatementOutcome,
}

/// Successful open acknowledgement from the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedDatabase {
    /// Resolved on-disk location of the database.
    pub path: PathBuf,
}

/// The asynchronous executor that actually runs SQL against the engine.
///
/// The conductor never touches the engine directly; it hands batches of
/// statements to a bridge implementation and consumes positionally-correlated
/// resolutions as they arrive. Implementations must resolve every statement
/// of a dispatched batch exactly once, in whatever order suits them; dropping
/// the sender with statements outstanding is treated as a bridge failure for
/// the whole batch.
#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    /// Open (creating if necessary) the named database.
    async fn open(&self, config: &DatabaseConfig) -> Result<OpenedDatabase, StatementError>;

    /// Close the named database. Closing a database that is not open is not
    /// an error for the bridge; the conductor performs its own gating.
    async fn close(&self, name: &str) -> Result<(), StatementError>;

    /// Delete the named database.
    async fn delete(&self, name: &str) -> Result<(), StatementError>;

    /// Execute a batch of statements against the named database.
    ///
    /// Returns the receiving half of a channel over which the bridge delivers
    /// one [`BatchItemResolution`] per input statement.
    fn dispatch_batch(
        &self,
        name: &str,
        batch: Vec<BatchStatement>,
    ) -> mpsc::UnboundedReceiver<BatchItemResolution>;
}
