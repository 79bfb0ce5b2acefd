//! MySQL Backend Implementation
//!
//! MySQL implementation of [`DatabaseDriver`] on top of the sqlx pool.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySql, Row as SqlxRow, TypeInfo, ValueRef};

use super::core::{DatabaseDriver, ExecOutcome, Row};
use crate::error::{ModelError, ModelResult};
use crate::value::Value;
use tessera_core::DatabaseConfig;

/// MySQL driver over a sqlx connection pool
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    pool: MySqlPool,
}

impl MySqlDriver {
    /// Create the pool described by `config`
    pub async fn connect(config: &DatabaseConfig) -> ModelResult<Self> {
        let url = config.connect_url()?;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&url)
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to create MySQL pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param)?;
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ModelError::statement(sql, &params, e.to_string()))?;

        rows.iter().map(convert_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<ExecOutcome> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param)?;
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| ModelError::statement(sql, &params, e.to_string()))?;

        let id = result.last_insert_id();
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: (id != 0).then_some(id),
            failed: false,
        })
    }

    async fn close(&self) -> ModelResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }
}

/// Bind a Value to a sqlx query
fn bind_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> ModelResult<sqlx::query::Query<'q, MySql, MySqlArguments>> {
    match value {
        Value::Null => Ok(query.bind(Option::<String>::None)),
        Value::Bool(b) => Ok(query.bind(*b)),
        Value::Int(i) => Ok(query.bind(*i)),
        Value::UInt(u) => Ok(query.bind(*u)),
        Value::Float(f) => Ok(query.bind(*f)),
        Value::String(s) => Ok(query.bind(s.clone())),
        Value::Bytes(b) => Ok(query.bind(b.clone())),
        Value::DateTime(dt) => Ok(query.bind(*dt)),
        Value::Date(d) => Ok(query.bind(*d)),
        Value::Time(t) => Ok(query.bind(*t)),
        Value::Json(j) => Ok(query.bind(sqlx::types::Json(j.clone()))),
        Value::List(_) => Err(ModelError::Query(
            "List values cannot be bound as a single parameter".to_string(),
        )),
    }
}

fn convert_row(row: &MySqlRow) -> ModelResult<Row> {
    let mut converted = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        converted.push(column.name(), column_value(row, index)?);
    }
    Ok(converted)
}

/// Convert a MySQL column value to Value
fn column_value(row: &MySqlRow, index: usize) -> ModelResult<Value> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| ModelError::Query(format!("Failed to read column {}: {}", index, e)))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_ascii_uppercase();
    let fail = |kind: &str, e: sqlx::Error| {
        ModelError::Query(format!("Failed to get {} value from column {}: {}", kind, index, e))
    };

    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(index).map_err(|e| fail("bool", e))?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::Int(row.try_get::<i64, _>(index).map_err(|e| fail("integer", e))?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "BIGINT UNSIGNED" => {
            Value::UInt(row.try_get::<u64, _>(index).map_err(|e| fail("unsigned integer", e))?)
        }
        "FLOAT" => Value::Float(f64::from(row.try_get::<f32, _>(index).map_err(|e| fail("float", e))?)),
        "DOUBLE" => Value::Float(row.try_get::<f64, _>(index).map_err(|e| fail("double", e))?),
        "DATETIME" | "TIMESTAMP" => Value::DateTime(
            row.try_get::<chrono::NaiveDateTime, _>(index)
                .map_err(|e| fail("datetime", e))?,
        ),
        "DATE" => Value::Date(row.try_get::<chrono::NaiveDate, _>(index).map_err(|e| fail("date", e))?),
        "TIME" => Value::Time(row.try_get::<chrono::NaiveTime, _>(index).map_err(|e| fail("time", e))?),
        "JSON" => Value::Json(
            row.try_get::<sqlx::types::Json<JsonValue>, _>(index)
                .map_err(|e| fail("JSON", e))?
                .0,
        ),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            Value::Bytes(row.try_get::<Vec<u8>, _>(index).map_err(|e| fail("bytes", e))?)
        }
        // DECIMAL, VARCHAR, TEXT, ENUM, SET and anything unknown come back as text
        _ => Value::String(
            row.try_get_unchecked::<String, _>(index)
                .map_err(|e| fail(&format!("string ({})", type_name), e))?,
        ),
    };

    Ok(value)
}
