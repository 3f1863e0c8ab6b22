use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::value::SqlValue;

/// A single row of a statement result.
///
/// Rows are an ordered pairing of column names and values; no fixed schema is
/// assumed, and different rows of one result may carry different columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlRow {
    /// The column names for this row
    pub column_names: Vec<String>,
    /// The values, positionally matching `column_names`
    pub values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(column_names: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self {
            column_names,
            values,
        }
    }

    /// Get a value from the row by column name
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.column_names
            .iter()
            .position(|col| col == column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}

/// Positionally indexable, length-bearing view over the rows a statement
/// returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowList {
    rows: Vec<SqlRow>,
}

impl RowList {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&SqlRow> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SqlRow> {
        self.rows.iter()
    }
}

impl From<Vec<SqlRow>> for RowList {
    fn from(rows: Vec<SqlRow>) -> Self {
        Self { rows }
    }
}

impl Index<usize> for RowList {
    type Output = SqlRow;

    fn index(&self, index: usize) -> &Self::Output {
        &self.rows[index]
    }
}

impl<'a> IntoIterator for &'a RowList {
    type Item = &'a SqlRow;
    type IntoIter = std::slice::Iter<'a, SqlRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Raw success payload for one statement, as produced by the bridge.
///
/// Every field is optional on the wire; absent fields take their defaults
/// when the payload is shaped into a [`StatementResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementPayload {
    #[serde(default)]
    pub rows: Vec<SqlRow>,
    #[serde(default)]
    pub rows_affected: u64,
    #[serde(default)]
    pub insert_id: Option<i64>,
}

/// Shaped result handed to a statement's success handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    /// The rows returned by the statement
    pub rows: RowList,
    /// The number of rows affected (for DML statements)
    pub rows_affected: u64,
    /// Identifier of the last inserted row, when the bridge reports one
    pub insert_id: Option<i64>,
}

impl From<StatementPayload> for StatementResult {
    fn from(payload: StatementPayload) -> Self {
        Self {
            rows: RowList::from(payload.rows),
            rows_affected: payload.rows_affected,
            insert_id: payload.insert_id,
        }
    }
}
