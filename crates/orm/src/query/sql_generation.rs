//! Query Builder SQL generation

use super::builder::QueryBuilder;
use crate::sql::{limit_clause, quote_identifier, quote_table};

impl QueryBuilder {
    /// The SELECT statement with the configured limit and offset
    pub fn to_select_sql(&self) -> String {
        self.select_sql_window(self.limit_count, self.offset_value)
    }

    /// `SELECT COUNT(*)` over the same filter
    ///
    /// Grouped or DISTINCT selects are wrapped in a derived table so the
    /// count is of result rows rather than of source rows.
    pub fn to_count_sql(&self) -> String {
        if self.group_by.is_empty() && !self.distinct {
            return format!("SELECT COUNT(*) FROM {}{}", self.from_clause(), self.where_clause());
        }

        let mut inner = self.clone();
        inner.order_by.clear();
        format!(
            "SELECT COUNT(*) FROM ({}) AS {}",
            inner.select_sql_window(None, None),
            quote_identifier("counted")
        )
    }

    pub(crate) fn select_sql_window(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.select_fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select_fields.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.from_clause());
        sql.push_str(&self.where_clause());

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if let Some(having) = &self.having_sql {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }
        sql.push_str(&self.order_clause());
        sql.push_str(&limit_clause(limit, offset));
        sql
    }

    /// Quoted table, optional alias and every join
    pub(crate) fn from_clause(&self) -> String {
        let mut from = quote_table(&self.table);
        if let Some(alias) = &self.alias {
            from.push_str(" AS ");
            from.push_str(&quote_identifier(alias));
        }
        for join in &self.joins {
            from.push(' ');
            from.push_str(join);
        }
        from
    }

    pub(crate) fn where_clause(&self) -> String {
        match &self.where_sql {
            Some(condition) => format!(" WHERE {}", condition),
            None => String::new(),
        }
    }

    pub(crate) fn order_clause(&self) -> String {
        if self.order_by.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", self.order_by.join(", "))
        }
    }
}
