//! Query Builder DML operations (INSERT, UPDATE, DELETE)

use super::builder::QueryBuilder;
use super::types::OnDuplicate;
use crate::connection::Connection;
use crate::error::ModelResult;
use crate::sql::{limit_clause, param_safe, quote_identifier, quote_table, Params};
use crate::value::Value;

impl QueryBuilder {
    /// Render the INSERT for `columns`; WHERE, joins and ordering are ignored
    pub fn to_insert_sql<K, V, I>(&self, columns: I, on_duplicate: &OnDuplicate) -> ModelResult<(String, Params)>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut params = Params::new();
        let mut names = Vec::new();
        let mut placeholders = Vec::new();
        for (column, value) in columns {
            let column = column.as_ref();
            let name = params.bind_unique(&format!("_insert_{}", param_safe(column)), value)?;
            names.push(quote_identifier(column));
            placeholders.push(format!(":{}", name));
        }

        let verb = match on_duplicate {
            OnDuplicate::Ignore => "INSERT IGNORE INTO",
            _ => "INSERT INTO",
        };
        let mut sql = format!(
            "{} {} ({}) VALUES ({})",
            verb,
            quote_table(&self.table),
            names.join(", "),
            placeholders.join(", ")
        );

        if let OnDuplicate::Update(assignments) = on_duplicate {
            if !assignments.is_empty() {
                let mut sets = Vec::with_capacity(assignments.len());
                for (column, value) in assignments {
                    let name = params.bind_unique(&format!("_upsert_{}", param_safe(column)), value.clone())?;
                    sets.push(format!("{} = :{}", quote_identifier(column), name));
                }
                sql.push_str(" ON DUPLICATE KEY UPDATE ");
                sql.push_str(&sets.join(", "));
            }
        }

        Ok((sql, params))
    }

    /// Insert one row and return the generated id.
    ///
    /// `None` when nothing was inserted (ignored duplicate) or the table
    /// generated no key.
    pub async fn insert<K, V, I>(&self, conn: &Connection, columns: I, on_duplicate: OnDuplicate) -> ModelResult<Option<u64>>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.check()?;
        let (sql, params) = self.to_insert_sql(columns, &on_duplicate)?;
        let outcome = conn.execute_write(&sql, &params).await?;
        Ok(outcome.last_insert_id.filter(|_| outcome.rows_affected > 0))
    }

    /// Render the UPDATE for `columns` under the current filter
    pub fn to_update_sql<K, V, I>(&self, columns: I) -> ModelResult<(String, Params)>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut params = self.params.clone();
        let mut sets = Vec::new();
        for (column, value) in columns {
            let column = column.as_ref();
            let name = params.bind_unique(&format!("_update_{}", param_safe(column)), value)?;
            sets.push(format!("{} = :{}", quote_table(column), name));
        }

        let mut sql = format!(
            "UPDATE {} SET {}{}",
            self.from_clause(),
            sets.join(", "),
            self.where_clause()
        );
        if self.supports_single_table_tail() {
            sql.push_str(&self.order_clause());
            sql.push_str(&limit_clause(self.limit_count, None));
        }
        Ok((sql, params))
    }

    /// Update matching rows and return the affected count
    pub async fn update<K, V, I>(&self, conn: &Connection, columns: I) -> ModelResult<u64>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.check()?;
        let columns: Vec<(K, V)> = columns.into_iter().collect();
        if columns.is_empty() {
            return Ok(0);
        }
        let (sql, params) = self.to_update_sql(columns)?;
        conn.execute(&sql, &params).await
    }

    /// Render the DELETE under the current filter
    ///
    /// LIMIT and ORDER BY are only emitted for the single-table form, the
    /// only one MySQL accepts them in.
    pub fn to_delete_sql(&self) -> String {
        if self.supports_single_table_tail() {
            format!(
                "DELETE FROM {}{}{}{}",
                quote_table(&self.table),
                self.where_clause(),
                self.order_clause(),
                limit_clause(self.limit_count, None)
            )
        } else {
            let target = self.alias.as_deref().unwrap_or(&self.table);
            format!(
                "DELETE {} FROM {}{}",
                quote_identifier(target),
                self.from_clause(),
                self.where_clause()
            )
        }
    }

    /// Delete matching rows and return the affected count
    pub async fn delete(&self, conn: &Connection) -> ModelResult<u64> {
        self.check()?;
        conn.execute(&self.to_delete_sql(), &self.params).await
    }

    fn supports_single_table_tail(&self) -> bool {
        self.alias.is_none() && self.joins.is_empty()
    }
}
