//! Query Builder execution

use super::builder::QueryBuilder;
use crate::backends::Row;
use crate::connection::{Connection, Hydrate};
use crate::error::{ModelError, ModelResult};
use crate::value::Value;

impl QueryBuilder {
    /// Execute the SELECT and return every row
    pub async fn get(&self, conn: &Connection) -> ModelResult<Vec<Row>> {
        self.check()?;
        conn.query_rows(&self.to_select_sql(), &self.params).await
    }

    /// Execute the SELECT and hydrate one `T` per row
    pub async fn get_typed<T: Hydrate>(&self, conn: &Connection, seed: &T::Seed) -> ModelResult<Vec<T>> {
        self.check()?;
        conn.query_typed(&self.to_select_sql(), &self.params, seed).await
    }

    /// Execute with LIMIT 1 and return the first row
    pub async fn first(&self, conn: &Connection) -> ModelResult<Option<Row>> {
        self.check()?;
        let sql = self.select_sql_window(Some(1), self.offset_value);
        Ok(conn.query_rows(&sql, &self.params).await?.into_iter().next())
    }

    /// Count rows matching the filter
    pub async fn count(&self, conn: &Connection) -> ModelResult<u64> {
        self.check()?;
        let value = conn.query_scalar(&self.to_count_sql(), &self.params).await?;
        count_value(value)
    }
}

/// Interpret the single value of a COUNT query
pub(crate) fn count_value(value: Option<Value>) -> ModelResult<u64> {
    match value {
        None => Ok(0),
        Some(Value::UInt(n)) => Ok(n),
        Some(other) => other
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| ModelError::Query(format!("COUNT returned a non-numeric value: {}", other))),
    }
}
