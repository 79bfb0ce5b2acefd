//! Core Database Backend Traits
//!
//! The driver seam between the connection layer and a concrete database.
//! Drivers only see positional `?` SQL and already-flattened [`Value`]s;
//! named-parameter rewriting, logging and caching live in the connection.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::ModelResult;
use crate::value::Value;

/// Abstract database driver
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Execute a query and return every result row
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>>;

    /// Execute a statement and report affected rows plus the generated key
    async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<ExecOutcome>;

    /// Close the underlying pool
    async fn close(&self) -> ModelResult<()>;

    /// Short backend name used in log fields
    fn backend_name(&self) -> &'static str;
}

/// Result of a data-modifying statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Driver's last insert id; `None` when the statement generated none
    pub last_insert_id: Option<u64>,
    /// The statement failed and the error policy swallowed the error
    pub failed: bool,
}

impl ExecOutcome {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            last_insert_id: None,
            failed: false,
        }
    }

    pub fn inserted(rows_affected: u64, id: u64) -> Self {
        Self {
            rows_affected,
            last_insert_id: Some(id),
            failed: false,
        }
    }

    /// Outcome standing in for a swallowed failure
    pub fn swallowed() -> Self {
        Self {
            failed: true,
            ..Self::default()
        }
    }
}

/// One result row with its columns in driver order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs, keeping their order
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = Row::new();
        for (column, value) in pairs {
            row.push(column, value);
        }
        row
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    /// Get a column value by name (first match)
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|index| &self.values[index])
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate `(column, value)` pairs in driver order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Convert row to a JSON object
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .iter()
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::iter::Zip<std::vec::IntoIter<String>, std::vec::IntoIter<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter().zip(self.values)
    }
}
