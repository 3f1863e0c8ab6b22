#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sql_conductor::prelude::*;

/// Receive from a test channel, failing the test after a grace period
/// instead of hanging it.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, what: &str) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("channel closed waiting for {what}"))
}

/// Open a database and wait for the bridge to acknowledge it.
pub async fn open_and_wait(conductor: &SqlConductor, name: &str) -> DatabaseHandle {
    let (opened_tx, mut opened_rx) = mpsc::unbounded_channel();
    conductor
        .open_database(
            DatabaseConfig::new(name),
            Some(Box::new(move |handle| {
                let _ = opened_tx.send(handle);
            })),
            None,
        )
        .expect("open_database");
    recv_within(&mut opened_rx, "database open").await
}

fn ok_resolution(index: usize, payload: StatementPayload) -> BatchItemResolution {
    BatchItemResolution {
        index,
        outcome: StatementOutcome::Success(payload),
    }
}

fn err_resolution(index: usize, err: StatementError) -> BatchItemResolution {
    BatchItemResolution {
        index,
        outcome: StatementOutcome::Failure(err),
    }
}

#[derive(Default)]
struct RecordingState {
    opens: Vec<String>,
    batches: Vec<(String, Vec<BatchStatement>)>,
    failures: Vec<(String, StatementError)>,
    responses: Vec<(String, StatementPayload)>,
    failing_opens: HashSet<String>,
    closed: Vec<String>,
    deleted: Vec<String>,
    delay: Option<Duration>,
    open_delay: Option<Duration>,
    reverse_delivery: bool,
    active_batches: usize,
    max_active_batches: usize,
}

/// Bridge double that records every call and resolves statements from a
/// script: statements whose text contains a registered substring fail (or
/// answer with a canned payload); everything else succeeds with an empty
/// payload. Optional per-batch delay and reversed delivery order make
/// serialization and out-of-order tolerance observable.
#[derive(Clone, Default)]
pub struct RecordingBridge {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_matching(&self, needle: &str, err: StatementError) -> &Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((needle.to_string(), err));
        self
    }

    pub fn respond_matching(&self, needle: &str, payload: StatementPayload) -> &Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((needle.to_string(), payload));
        self
    }

    pub fn fail_open(&self, name: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .failing_opens
            .insert(name.to_string());
        self
    }

    pub fn set_delay(&self, delay: Duration) -> &Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    pub fn set_open_delay(&self, delay: Duration) -> &Self {
        self.state.lock().unwrap().open_delay = Some(delay);
        self
    }

    pub fn set_reverse_delivery(&self, reverse: bool) -> &Self {
        self.state.lock().unwrap().reverse_delivery = reverse;
        self
    }

    /// Names handed to the bridge's open call, in call order.
    pub fn opens(&self) -> Vec<String> {
        self.state.lock().unwrap().opens.clone()
    }

    /// Every dispatched batch, in dispatch order.
    pub fn batches(&self) -> Vec<(String, Vec<BatchStatement>)> {
        self.state.lock().unwrap().batches.clone()
    }

    /// Statement texts of every dispatched batch, in dispatch order.
    pub fn batch_sql(&self) -> Vec<Vec<String>> {
        self.batches()
            .into_iter()
            .map(|(_, batch)| batch.into_iter().map(|stmt| stmt.sql).collect())
            .collect()
    }

    /// Highest number of batches that were ever awaiting resolution at once.
    pub fn max_active_batches(&self) -> usize {
        self.state.lock().unwrap().max_active_batches
    }

    pub fn closed(&self) -> Vec<String> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn resolve(&self, index: usize, stmt: &BatchStatement) -> BatchItemResolution {
        let state = self.state.lock().unwrap();
        if let Some((_, err)) = state
            .failures
            .iter()
            .find(|(needle, _)| stmt.sql.contains(needle))
        {
            return err_resolution(index, err.clone());
        }
        if let Some((_, payload)) = state
            .responses
            .iter()
            .find(|(needle, _)| stmt.sql.contains(needle))
        {
            return ok_resolution(index, payload.clone());
        }
        ok_resolution(index, StatementPayload::default())
    }
}

#[async_trait]
impl ExecutionBridge for RecordingBridge {
    async fn open(&self, config: &DatabaseConfig) -> Result<OpenedDatabase, StatementError> {
        let (failing, open_delay) = {
            let mut state = self.state.lock().unwrap();
            state.opens.push(config.name.clone());
            (
                state.failing_opens.contains(&config.name),
                state.open_delay,
            )
        };
        if let Some(delay) = open_delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(StatementError::unknown("native open failed"));
        }
        Ok(OpenedDatabase {
            path: PathBuf::from(format!(
                "/data/{}/{}",
                config.location.subdirectory(),
                config.name
            )),
        })
    }

    async fn close(&self, name: &str) -> Result<(), StatementError> {
        self.state.lock().unwrap().closed.push(name.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StatementError> {
        self.state.lock().unwrap().deleted.push(name.to_string());
        Ok(())
    }

    fn dispatch_batch(
        &self,
        name: &str,
        batch: Vec<BatchStatement>,
    ) -> mpsc::UnboundedReceiver<BatchItemResolution> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut resolutions: Vec<BatchItemResolution> = batch
            .iter()
            .enumerate()
            .map(|(index, stmt)| self.resolve(index, stmt))
            .collect();
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.batches.push((name.to_string(), batch));
            if state.reverse_delivery {
                resolutions.reverse();
            }
            state.active_batches += 1;
            state.max_active_batches = state.max_active_batches.max(state.active_batches);
            state.delay
        };
        match delay {
            Some(delay) => {
                let state = Arc::clone(&self.state);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // The batch stops being "in flight" at delivery; count it
                    // down before the receiver can dispatch a follow-up.
                    state.lock().unwrap().active_batches -= 1;
                    for resolution in resolutions {
                        let _ = tx.send(resolution);
                    }
                });
            }
            None => {
                self.state.lock().unwrap().active_batches -= 1;
                for resolution in resolutions {
                    let _ = tx.send(resolution);
                }
            }
        }
        rx
    }
}

#[derive(Clone, Default)]
struct Table {
    next_id: i64,
    rows: Vec<(i64, SqlValue)>,
}

#[derive(Default)]
struct MiniDb {
    tables: HashMap<String, Table>,
    snapshot: Option<HashMap<String, Table>>,
}

/// Bridge double backed by a miniature in-memory table store. It understands
/// just enough statement shapes for behavioral round trips: CREATE TABLE,
/// single-column INSERT/UPDATE/DELETE, `SELECT id, data FROM t` with an
/// optional `WHERE data = ?`, and the transaction ceremony (BEGIN snapshots,
/// ROLLBACK restores, COMMIT discards the snapshot).
#[derive(Clone, Default)]
pub struct MiniDbBridge {
    databases: Arc<Mutex<HashMap<String, MiniDb>>>,
}

impl MiniDbBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn execute(
        db: &mut MiniDb,
        stmt: &BatchStatement,
    ) -> Result<StatementPayload, StatementError> {
        let sql = stmt.sql.trim().trim_start_matches(';').trim();
        let upper = sql.to_uppercase();

        if upper == "BEGIN" {
            db.snapshot = Some(db.tables.clone());
            return Ok(StatementPayload::default());
        }
        if upper == "COMMIT" {
            db.snapshot = None;
            return Ok(StatementPayload::default());
        }
        if upper == "ROLLBACK" {
            if let Some(snapshot) = db.snapshot.take() {
                db.tables = snapshot;
            }
            return Ok(StatementPayload::default());
        }
        if upper == "SELECT 1" {
            return Ok(StatementPayload {
                rows: vec![SqlRow::new(
                    vec!["1".to_string()],
                    vec![SqlValue::Int(1)],
                )],
                ..StatementPayload::default()
            });
        }
        if let Some(rest) = upper.strip_prefix("CREATE TABLE ") {
            let table = word(rest);
            db.tables.insert(table, Table::default());
            return Ok(StatementPayload::default());
        }
        if let Some(rest) = upper.strip_prefix("INSERT INTO ") {
            let table_name = word(rest);
            let table = db.tables.get_mut(&table_name).ok_or_else(|| {
                StatementError::new(
                    StatementError::DATABASE_ERR,
                    format!("no such table: {table_name}"),
                )
            })?;
            let value = stmt.params.first().cloned().unwrap_or(SqlValue::Null);
            table.next_id += 1;
            let id = table.next_id;
            table.rows.push((id, value));
            return Ok(StatementPayload {
                rows: Vec::new(),
                rows_affected: 1,
                insert_id: Some(id),
            });
        }
        if let Some(rest) = upper.strip_prefix("UPDATE ") {
            let table_name = word(rest);
            let table = db.tables.get_mut(&table_name).ok_or_else(|| {
                StatementError::new(
                    StatementError::DATABASE_ERR,
                    format!("no such table: {table_name}"),
                )
            })?;
            let value = stmt.params.first().cloned().unwrap_or(SqlValue::Null);
            let mut affected = 0;
            for (_, data) in &mut table.rows {
                *data = value.clone();
                affected += 1;
            }
            return Ok(StatementPayload {
                rows: Vec::new(),
                rows_affected: affected,
                insert_id: None,
            });
        }
        if let Some(rest) = upper.strip_prefix("DELETE FROM ") {
            let table_name = word(rest);
            let table = db.tables.get_mut(&table_name).ok_or_else(|| {
                StatementError::new(
                    StatementError::DATABASE_ERR,
                    format!("no such table: {table_name}"),
                )
            })?;
            let affected = table.rows.len() as u64;
            table.rows.clear();
            return Ok(StatementPayload {
                rows: Vec::new(),
                rows_affected: affected,
                insert_id: None,
            });
        }
        if upper.starts_with("SELECT ID, DATA FROM ") {
            let rest = &upper["SELECT ID, DATA FROM ".len()..];
            let table_name = word(rest);
            let table = db.tables.get(&table_name).ok_or_else(|| {
                StatementError::new(
                    StatementError::DATABASE_ERR,
                    format!("no such table: {table_name}"),
                )
            })?;
            let filter = upper
                .contains("WHERE DATA = ?")
                .then(|| stmt.params.first().cloned().unwrap_or(SqlValue::Null));
            let rows = table
                .rows
                .iter()
                .filter(|(_, data)| filter.as_ref().is_none_or(|wanted| data == wanted))
                .map(|(id, data)| {
                    SqlRow::new(
                        vec!["id".to_string(), "data".to_string()],
                        vec![SqlValue::Int(*id), data.clone()],
                    )
                })
                .collect();
            return Ok(StatementPayload {
                rows,
                rows_affected: 0,
                insert_id: None,
            });
        }
        Err(StatementError::new(
            StatementError::SYNTAX_ERR,
            format!("cannot prepare statement: {sql}"),
        ))
    }
}

fn word(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_string()
}

#[async_trait]
impl ExecutionBridge for MiniDbBridge {
    async fn open(&self, config: &DatabaseConfig) -> Result<OpenedDatabase, StatementError> {
        self.databases
            .lock()
            .unwrap()
            .entry(config.name.clone())
            .or_default();
        Ok(OpenedDatabase {
            path: PathBuf::from(format!(
                "/data/{}/{}",
                config.location.subdirectory(),
                config.name
            )),
        })
    }

    async fn close(&self, _name: &str) -> Result<(), StatementError> {
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StatementError> {
        self.databases.lock().unwrap().remove(name);
        Ok(())
    }

    fn dispatch_batch(
        &self,
        name: &str,
        batch: Vec<BatchStatement>,
    ) -> mpsc::UnboundedReceiver<BatchItemResolution> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut databases = self.databases.lock().unwrap();
        let db = databases.entry(name.to_string()).or_default();
        for (index, stmt) in batch.iter().enumerate() {
            let resolution = match Self::execute(db, stmt) {
                Ok(payload) => ok_resolution(index, payload),
                Err(err) => err_resolution(index, err),
            };
            let _ = tx.send(resolution);
        }
        rx
    }
}
