//! Query Builder ORDER BY, GROUP BY, HAVING operations

use super::builder::QueryBuilder;
use super::types::OrderDirection;
use crate::sql::{quote_table, Params};

impl QueryBuilder {
    /// Add ORDER BY on a (possibly dotted) column
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push(format!("{} {}", quote_table(column), direction));
        self
    }

    /// Add a raw ORDER BY expression
    pub fn order_raw(mut self, expression: impl Into<String>) -> Self {
        self.order_by.push(expression.into());
        self
    }

    /// Add GROUP BY on a (possibly dotted) column
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(quote_table(column));
        self
    }

    /// AND a raw HAVING condition
    pub fn having(mut self, condition: &str, params: Params) -> Self {
        let condition = match self.params.merge_into_sql(condition, params) {
            Ok(condition) => condition,
            Err(err) => {
                self.record_error(err);
                return self;
            }
        };
        self.having_sql = Some(match self.having_sql.take() {
            Some(existing) => format!("({}) AND ({})", existing, condition),
            None => condition,
        });
        self
    }
}
