//! Query Builder JOIN operations

use super::builder::QueryBuilder;
use super::types::JoinType;
use crate::sql::{quote_identifier, quote_table};

impl QueryBuilder {
    /// Append a raw JOIN fragment, e.g. `LEFT JOIN x ON ...`
    pub fn join(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        if !fragment.trim().is_empty() {
            self.joins.push(fragment);
        }
        self
    }

    /// Join `table AS alias ON on`; `on` is used verbatim
    pub fn join_table(self, join_type: JoinType, table: &str, alias: &str, on: &str) -> Self {
        let fragment = format!(
            "{} {} AS {} ON ({})",
            join_type,
            quote_table(table),
            quote_identifier(alias),
            on
        );
        self.join(fragment)
    }
}
