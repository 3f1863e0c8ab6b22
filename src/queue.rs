use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::transaction::TransactionPlan;

/// Lifecycle of one named database, as the conductor sees it. A name with no
/// registry entry is not open (never opened, closed, or deleted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    /// The bridge open call is in flight; submitted transactions queue up.
    Opening,
    /// Open for work; the queue may advance.
    Open,
}

#[derive(Debug)]
pub(crate) struct ConnectionEntry {
    pub(crate) state: ConnectionState,
    /// Resolved storage path, known once the bridge acknowledges the open.
    pub(crate) path: Option<PathBuf>,
}

/// Per-database admission record: the FIFO of transactions waiting to run
/// plus the running flag. The flag is true for the entire span between a
/// transaction being dequeued and it reaching a terminal state.
#[derive(Default)]
pub(crate) struct QueueEntry {
    pub(crate) pending: VecDeque<TransactionPlan>,
    pub(crate) in_progress: bool,
}

/// All per-name state, owned by the conductor and guarded by one mutex.
///
/// Queue entries and connection entries have independent lifecycles: a queue
/// entry is not destroyed when its connection closes, so queued work can
/// survive a close/reopen cycle (see `QueuePolicy`).
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) connections: HashMap<String, ConnectionEntry>,
    pub(crate) queues: HashMap<String, QueueEntry>,
}

impl Registry {
    pub(crate) fn queue_mut(&mut self, name: &str) -> &mut QueueEntry {
        self.queues.entry(name.to_string()).or_default()
    }

    pub(crate) fn connection_state(&self, name: &str) -> Option<ConnectionState> {
        self.connections.get(name).map(|entry| entry.state)
    }

    pub(crate) fn is_busy(&self, name: &str) -> bool {
        self.queues.get(name).is_some_and(|entry| entry.in_progress)
    }
}
