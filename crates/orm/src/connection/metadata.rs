//! Table metadata and the external schema cache

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::backends::Row;
use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// Index role reported by `SHOW COLUMNS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeyRole {
    #[default]
    None,
    Primary,
    Unique,
    Multiple,
}

impl KeyRole {
    fn from_mysql(key: &str) -> Self {
        match key {
            "PRI" => KeyRole::Primary,
            "UNI" => KeyRole::Unique,
            "MUL" => KeyRole::Multiple,
            _ => KeyRole::None,
        }
    }
}

/// One column of a table as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub key: KeyRole,
    pub auto_increment: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
            key: KeyRole::None,
            auto_increment: false,
        }
    }

    /// Builder shortcut for an auto-increment primary key column
    pub fn primary(mut self) -> Self {
        self.key = KeyRole::Primary;
        self.nullable = false;
        self.auto_increment = true;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.key == KeyRole::Primary
    }

    /// Parse one `SHOW COLUMNS FROM` row
    pub fn from_show_columns(row: &Row) -> ModelResult<Self> {
        let field = text(row, "Field")
            .ok_or_else(|| ModelError::Schema("SHOW COLUMNS row without a Field".to_string()))?;
        Ok(Self {
            name: field,
            sql_type: text(row, "Type").unwrap_or_default(),
            nullable: text(row, "Null").map(|n| n.eq_ignore_ascii_case("YES")).unwrap_or(true),
            default: text(row, "Default"),
            key: KeyRole::from_mysql(&text(row, "Key").unwrap_or_default()),
            auto_increment: text(row, "Extra")
                .map(|extra| extra.to_ascii_lowercase().contains("auto_increment"))
                .unwrap_or(false),
        })
    }
}

// SHOW statements may report text columns as binary
fn text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        other => Some(other.to_string()),
    }
}

/// The single primary-key column, `None` when the table has none
pub fn primary_key_of(table: &str, columns: &[ColumnMeta]) -> ModelResult<Option<String>> {
    let mut primary = columns.iter().filter(|c| c.is_primary());
    let first = primary.next();
    if primary.next().is_some() {
        return Err(ModelError::Schema(format!(
            "Table '{}' has a composite primary key, which is not supported",
            table
        )));
    }
    Ok(first.map(|c| c.name.clone()))
}

/// Process-wide key/value cache sitting behind the connection's in-memory map
#[async_trait]
pub trait SchemaCache: Send + Sync {
    async fn get(&self, key: &str) -> ModelResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> ModelResult<()>;
    async fn exists(&self, key: &str) -> ModelResult<bool>;
}

/// In-process [`SchemaCache`]
#[derive(Debug, Default)]
pub struct MemorySchemaCache {
    entries: DashMap<String, Vec<u8>>,
}

impl MemorySchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SchemaCache for MemorySchemaCache {
    async fn get(&self, key: &str) -> ModelResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> ModelResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &str) -> ModelResult<bool> {
        Ok(self.entries.contains_key(key))
    }
}
