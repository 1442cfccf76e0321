use std::sync::Arc;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::value::Value;

/// A row from a row-returning statement.
///
/// Column names are shared across all rows of one result to avoid cloning the
/// header per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// The column names, in result order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The values, in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get a value by column name, or `None` if the column is absent.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|name| name == column)?;
        self.values.get(idx)
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Outcome of one statement within a batch.
///
/// Exactly one outcome is produced per input statement, in input order. A
/// [`StatementOutcome::Failure`] stays in its own slot; it never aborts the
/// rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// Rows returned by a raw/row-returning query.
    Rows(Vec<Row>),
    /// Affected-row count from a mutating statement.
    Affected { rows_affected: usize },
    /// Rowid and affected count from an insert.
    Inserted { insert_id: i64, rows_affected: usize },
    /// Acknowledgment of a transaction-control statement.
    Ack,
    /// The engine rejected this one statement.
    Failure { message: String },
}

impl Serialize for StatementOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            StatementOutcome::Rows(rows) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("rows", rows)?;
                map.end()
            }
            StatementOutcome::Affected { rows_affected } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("rowsAffected", rows_affected)?;
                map.end()
            }
            StatementOutcome::Inserted {
                insert_id,
                rows_affected,
            } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("insertId", insert_id)?;
                map.serialize_entry("rowsAffected", rows_affected)?;
                map.end()
            }
            StatementOutcome::Ack => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("rowsAffected", &0usize)?;
                map.end()
            }
            StatementOutcome::Failure { message } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("message", message)?;
                map.end()
            }
        }
    }
}

/// One statement's result, keyed by the statement's id.
///
/// Serializes to the boundary envelope
/// `{"id": …, "type": "success"|"error", "result": …}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementResult {
    pub id: String,
    pub outcome: StatementOutcome,
}

impl StatementResult {
    pub(crate) fn new(id: impl Into<String>, outcome: StatementOutcome) -> Self {
        Self {
            id: id.into(),
            outcome,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, StatementOutcome::Failure { .. })
    }
}

impl Serialize for StatementResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", if self.is_failure() { "error" } else { "success" })?;
        map.serialize_entry("result", &self.outcome)?;
        map.end()
    }
}
