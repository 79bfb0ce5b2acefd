//! Query Builder WHERE clause operations

use super::builder::QueryBuilder;
use crate::sql::{param_safe, quote_table, Params};
use crate::value::Value;

impl QueryBuilder {
    /// Add a raw condition; same as [`and_where`](Self::and_where)
    pub fn where_raw(self, condition: &str, params: Params) -> Self {
        self.and_where(condition, params)
    }

    /// `(existing) AND (condition)`
    pub fn and_where(self, condition: &str, params: Params) -> Self {
        self.combine("AND", condition, params)
    }

    /// `(existing) OR (condition)`
    pub fn or_where(self, condition: &str, params: Params) -> Self {
        self.combine("OR", condition, params)
    }

    /// AND one comparison per column: lists become IN, `Null` becomes IS NULL
    pub fn compare<K, V, I>(mut self, pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut parts = Vec::new();
        for (column, value) in pairs {
            let index = self.compare_index;
            self.compare_index += 1;
            let column = column.as_ref();
            let base = format!("_compare_{}_{}", index, param_safe(column));
            let quoted = quote_table(column);
            let value: Value = value.into();

            let part = match value {
                Value::Null => Ok(format!("{} IS NULL", quoted)),
                Value::List(items) if items.is_empty() => Ok("0 = 1".to_string()),
                Value::List(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.params.bind_unique(&format!("{}_{}", base, i), item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(|names| {
                        let placeholders: Vec<_> = names.iter().map(|n| format!(":{}", n)).collect();
                        format!("{} IN ({})", quoted, placeholders.join(", "))
                    }),
                scalar => self
                    .params
                    .bind_unique(&base, scalar)
                    .map(|name| format!("{} = :{}", quoted, name)),
            };

            match part {
                Ok(part) => parts.push(part),
                Err(err) => self.record_error(err),
            }
        }

        if parts.is_empty() {
            return self;
        }
        self.combine("AND", &parts.join(" AND "), Params::new())
    }

    fn combine(mut self, operator: &str, condition: &str, params: Params) -> Self {
        if condition.trim().is_empty() {
            return self;
        }
        let condition = match self.params.merge_into_sql(condition, params) {
            Ok(condition) => condition,
            Err(err) => {
                self.record_error(err);
                return self;
            }
        };
        self.where_sql = Some(match self.where_sql.take() {
            Some(existing) => format!("({}) {} ({})", existing, operator, condition),
            None => condition,
        });
        self
    }
}
