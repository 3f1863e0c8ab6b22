use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::bridge::ExecutionBridge;
use crate::config::{ConductorConfig, DatabaseConfig, QueuePolicy};
use crate::database::DatabaseHandle;
use crate::error::ConductorError;
use crate::queue::{ConnectionEntry, ConnectionState, Registry};
use crate::transaction::{self, TransactionPlan};

/// Callback fired once the bridge acknowledges an open.
pub type OpenCompleteHandler = Box<dyn FnOnce(DatabaseHandle) + Send>;

/// Callback fired when an open fails at the bridge.
pub type OpenErrorHandler = Box<dyn FnOnce(ConductorError) + Send>;

struct ConductorInner {
    bridge: Arc<dyn ExecutionBridge>,
    config: ConductorConfig,
    registry: Mutex<Registry>,
}

/// The coordinating service: owns the per-database connection registry and
/// transaction queues, and drives admission, serialization, and queue
/// advancement in front of one [`ExecutionBridge`].
///
/// Cloning is cheap and every clone coordinates the same state. All
/// submission surfaces must be called from within a Tokio runtime; queue
/// advancement is performed on freshly spawned tasks so that one
/// transaction's finalization fully unwinds before the next one starts.
#[derive(Clone)]
pub struct SqlConductor {
    inner: Arc<ConductorInner>,
}

impl SqlConductor {
    pub fn new(bridge: impl ExecutionBridge + 'static) -> Self {
        Self::with_config(bridge, ConductorConfig::default())
    }

    pub fn with_config(bridge: impl ExecutionBridge + 'static, config: ConductorConfig) -> Self {
        Self {
            inner: Arc::new(ConductorInner {
                bridge: Arc::new(bridge),
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Open (creating if necessary) the named database and return a handle
    /// for submitting work against it.
    ///
    /// The handle is usable immediately: transactions submitted while the
    /// bridge open call is still in flight queue up and start draining once
    /// the open succeeds. If the open fails, every queued transaction is
    /// aborted with a connection failure. Opening a name that is already
    /// open succeeds without touching the bridge.
    ///
    /// # Errors
    ///
    /// Returns `CallerUsage` when the database name is empty.
    pub fn open_database(
        &self,
        config: DatabaseConfig,
        on_open: Option<OpenCompleteHandler>,
        on_error: Option<OpenErrorHandler>,
    ) -> Result<DatabaseHandle, ConductorError> {
        if config.name.is_empty() {
            return Err(ConductorError::CallerUsage(
                "database name must not be empty".to_string(),
            ));
        }
        let name = config.name.clone();
        let handle = DatabaseHandle::new(name.clone(), self.clone());

        let already_tracked = {
            let mut reg = self.lock_registry();
            if reg.connections.contains_key(&name) {
                true
            } else {
                reg.connections.insert(
                    name.clone(),
                    ConnectionEntry {
                        state: ConnectionState::Opening,
                        path: None,
                    },
                );
                false
            }
        };

        if already_tracked {
            debug!(db = %name, "database already open");
            if let Some(on_open) = on_open {
                let reopened = handle.clone();
                tokio::spawn(async move { on_open(reopened) });
            }
            return Ok(handle);
        }

        info!(db = %name, location = config.location.subdirectory(), "opening database");
        let conductor = self.clone();
        let opened_handle = handle.clone();
        tokio::spawn(async move {
            // Ask the bridge to drop any stale native handle first so a
            // reopen starts from a known state; a close failure here is
            // expected when the database was never open.
            let _ = conductor.inner.bridge.close(&config.name).await;

            match conductor.inner.bridge.open(&config).await {
                Ok(opened) => {
                    let still_tracked = {
                        let mut reg = conductor.lock_registry();
                        match reg.connections.get_mut(&config.name) {
                            Some(entry) => {
                                entry.state = ConnectionState::Open;
                                entry.path = Some(opened.path);
                                true
                            }
                            None => false,
                        }
                    };
                    if !still_tracked {
                        warn!(db = %config.name, "database was closed during open operation");
                    }
                    if let Some(on_open) = on_open {
                        on_open(opened_handle);
                    }
                    conductor.schedule_advance(&config.name);
                }
                Err(err) => {
                    warn!(db = %config.name, error = %err, "open failed, aborting queued transactions");
                    conductor.lock_registry().connections.remove(&config.name);
                    if let Some(on_error) = on_error {
                        on_error(ConductorError::ConnectionFailed(format!(
                            "could not open database {}: {err}",
                            config.name
                        )));
                    }
                    conductor.abort_all(&config.name, "invalid database handle");
                }
            }
        });

        Ok(handle)
    }

    /// Delete the named database.
    ///
    /// # Errors
    ///
    /// Returns `CloseWhileBusy` while a transaction is in flight on the
    /// name; deleting a database that is not open is not an error.
    pub async fn delete_database(&self, name: &str) -> Result<(), ConductorError> {
        {
            let mut reg = self.lock_registry();
            if reg.is_busy(name) {
                return Err(ConductorError::CloseWhileBusy(name.to_string()));
            }
            reg.connections.remove(name);
        }
        info!(db = %name, "deleting database");
        self.apply_queue_policy(name, "database was deleted");
        self.inner.bridge.delete(name).await.map_err(|err| {
            ConductorError::ConnectionFailed(format!("delete failed for {name}: {err}"))
        })
    }

    /// Close the named database. Fails closed: a name with a transaction in
    /// flight cannot be closed, and the in-flight transaction is left
    /// undisturbed.
    pub(crate) async fn close_database(&self, name: &str) -> Result<(), ConductorError> {
        {
            let mut reg = self.lock_registry();
            if reg.connection_state(name).is_none() {
                return Err(ConductorError::ConnectionNotOpen(name.to_string()));
            }
            if reg.is_busy(name) {
                return Err(ConductorError::CloseWhileBusy(name.to_string()));
            }
            reg.connections.remove(name);
            let queued = reg.queues.get(name).map_or(0, |q| q.pending.len());
            info!(db = %name, queued, "closing database");
        }
        self.apply_queue_policy(name, "database handle was closed");
        self.inner.bridge.close(name).await.map_err(|err| {
            ConductorError::ConnectionFailed(format!("close failed for {name}: {err}"))
        })
    }

    /// Append a transaction to the per-database FIFO. When the connection is
    /// open and idle the queue advances on a fresh task; while it is still
    /// opening the transaction waits for the open to finish.
    pub(crate) fn submit(&self, name: &str, plan: TransactionPlan) -> Result<(), ConductorError> {
        let state = {
            let mut reg = self.lock_registry();
            let Some(state) = reg.connection_state(name) else {
                return Err(ConductorError::ConnectionNotOpen(name.to_string()));
            };
            reg.queue_mut(name).pending.push_back(plan);
            state
        };
        match state {
            ConnectionState::Open => self.schedule_advance(name),
            ConnectionState::Opening => {
                debug!(db = %name, "transaction queued, waiting for open operation to finish");
            }
        }
        Ok(())
    }

    /// Clear the running flag for `name` and schedule the next start. Queue
    /// draining is a chain of spawned tasks, never one stack frame.
    pub(crate) fn release(&self, name: &str) {
        {
            let mut reg = self.lock_registry();
            if let Some(entry) = reg.queues.get_mut(name) {
                entry.in_progress = false;
            }
        }
        self.schedule_advance(name);
    }

    /// Drain the FIFO without running any queued body, delivering `reason`
    /// to each transaction's error callback. Side-effect-free on the
    /// database: a queued-but-not-started transaction has never executed
    /// user SQL.
    pub(crate) fn abort_all(&self, name: &str, reason: &str) {
        let drained = {
            let mut reg = self.lock_registry();
            match reg.queues.get_mut(name) {
                Some(entry) if !entry.pending.is_empty() => {
                    entry.in_progress = false;
                    mem::take(&mut entry.pending)
                }
                _ => return,
            }
        };
        warn!(db = %name, count = drained.len(), "aborting queued transactions");
        for plan in drained {
            plan.abort_from_queue(ConductorError::ConnectionFailed(reason.to_string()));
        }
    }

    pub(crate) fn schedule_advance(&self, name: &str) {
        let conductor = self.clone();
        let name = name.to_string();
        tokio::spawn(async move { conductor.advance(&name) });
    }

    /// Dequeue and start the next transaction, if the database is open, the
    /// queue is non-empty, and nothing is currently running. Idempotent.
    fn advance(&self, name: &str) {
        let plan = {
            let mut reg = self.lock_registry();
            if reg.connection_state(name) != Some(ConnectionState::Open) {
                debug!(db = %name, "cannot start next transaction: database not open");
                return;
            }
            let Some(entry) = reg.queues.get_mut(name) else {
                debug!(db = %name, "cannot start next transaction: queue state is gone");
                return;
            };
            if entry.in_progress || entry.pending.is_empty() {
                return;
            }
            entry.in_progress = true;
            entry.pending.pop_front()
        };
        if let Some(plan) = plan {
            let conductor = self.clone();
            let name = name.to_string();
            tokio::spawn(transaction::drive(conductor, name, plan));
        }
    }

    fn apply_queue_policy(&self, name: &str, reason: &str) {
        if self.inner.config.queue_policy == QueuePolicy::PurgeOnClose {
            self.abort_all(name, reason);
            self.lock_registry().queues.remove(name);
        }
    }

    pub(crate) fn bridge(&self) -> &Arc<dyn ExecutionBridge> {
        &self.inner.bridge
    }

    pub(crate) fn storage_path(&self, name: &str) -> Option<PathBuf> {
        self.lock_registry()
            .connections
            .get(name)
            .and_then(|entry| entry.path.clone())
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
