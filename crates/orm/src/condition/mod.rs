//! Model-aware query conditions
//!
//! A [`Condition`] targets one model of a [`Schema`]. Column references may
//! be dotted relation paths (`author.team.name`); every path used in a
//! filter is joined into the query. Relations requested with
//! [`Condition::with`] are joined or loaded separately as the relation
//! planner decides.
//!
//! Builder methods consume and return `self`. Like the query builder, a
//! mistake while chaining (an unknown relation, say) is recorded and
//! returned when the condition is turned into SQL or executed.

mod execution;
mod sql;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::model::{ModelDefinition, Schema};
use crate::query::OrderDirection;
use crate::relations::{PlannerState, RelationPlanner};
use crate::sql::{escape_like, param_safe, quote_column, quote_identifier, Params, PRIMARY_ALIAS};
use crate::value::Value;

pub use execution::ModelFuture;
pub use sql::BuiltQuery;

/// Comparison operators recognised at the start of a string value, longest first
const OPERATORS: [&str; 7] = [">=", "<=", "<>", "!=", ">", "<", "="];

/// Query descriptor bound to a model
#[derive(Debug, Clone)]
pub struct Condition {
    pub(crate) schema: Arc<Schema>,
    pub(crate) definition: Arc<ModelDefinition>,
    pub(crate) where_sql: Option<String>,
    pub(crate) params: Params,
    pub(crate) order: Vec<String>,
    pub(crate) group: Vec<String>,
    pub(crate) having: Option<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) with: Vec<String>,
    pub(crate) fields: Vec<String>,
    pub(crate) joins: Vec<String>,
    pub(crate) extra_select: Vec<String>,
    pub(crate) filter_paths: BTreeSet<String>,
    pub(crate) distinct: bool,
    pub(crate) planner: RelationPlanner,
    pub(crate) error: Option<ModelError>,
}

impl Condition {
    /// Condition on the model registered as `model`
    pub fn new(schema: Arc<Schema>, model: &str) -> ModelResult<Self> {
        let definition = schema.model(model)?;
        Ok(Self::for_definition(schema, definition))
    }

    pub fn for_definition(schema: Arc<Schema>, definition: Arc<ModelDefinition>) -> Self {
        Self {
            schema,
            definition,
            where_sql: None,
            params: Params::new(),
            order: Vec::new(),
            group: Vec::new(),
            having: None,
            limit: None,
            offset: None,
            with: Vec::new(),
            fields: Vec::new(),
            joins: Vec::new(),
            extra_select: Vec::new(),
            filter_paths: BTreeSet::new(),
            distinct: false,
            planner: RelationPlanner::new(),
            error: None,
        }
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The WHERE expression without the keyword
    pub fn where_sql(&self) -> Option<&str> {
        self.where_sql.as_deref()
    }

    /// Requested relation paths in request order
    pub fn requested(&self) -> &[String] {
        &self.with
    }

    /// Relation paths the filter depends on
    pub fn filter_paths(&self) -> &BTreeSet<String> {
        &self.filter_paths
    }

    pub fn planner_state(&self) -> PlannerState {
        self.planner.state()
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Resolve `column` to a quoted SQL identifier
    ///
    /// `name` is a column of the primary table (alias `t`); `rel.sub.name`
    /// walks the relation graph and resolves to `` `rel_sub`.`name` ``. The
    /// walked path is recorded as filter-referenced.
    pub fn column_ref(&mut self, column: &str) -> ModelResult<String> {
        let Some((path, name)) = column.rsplit_once('.') else {
            return Ok(quote_column(PRIMARY_ALIAS, column));
        };
        if path == PRIMARY_ALIAS {
            return Ok(quote_column(PRIMARY_ALIAS, name));
        }

        self.resolve_path(path)?;
        if self.filter_paths.insert(path.to_string()) {
            self.planner.reset();
        }
        Ok(quote_column(&path.replace('.', "_"), name))
    }

    /// Walk `path` segment by segment from the primary model
    fn resolve_path(&self, path: &str) -> ModelResult<Arc<ModelDefinition>> {
        let mut current = Arc::clone(&self.definition);
        for segment in path.split('.') {
            let relation = current.require_relation(segment)?;
            current = self.schema.model(relation.target())?;
        }
        Ok(current)
    }

    /// Add a raw condition; same as [`and_where`](Self::and_where)
    pub fn where_raw(self, condition: &str, params: Params) -> Self {
        self.and_where(condition, params)
    }

    /// `(existing) AND (condition)`; colliding parameter names are renamed
    pub fn and_where(self, condition: &str, params: Params) -> Self {
        self.combine("AND", condition, params)
    }

    /// `(existing) OR (condition)`
    pub fn or_where(self, condition: &str, params: Params) -> Self {
        self.combine("OR", condition, params)
    }

    /// Compare a column with a value
    ///
    /// Lists become IN, `Null` becomes IS NULL and a string starting with a
    /// comparison operator (`">=18"`) has the operator pulled out into the
    /// SQL. The value is bound as `:ag_{column}`, suffixed when taken.
    pub fn compare_column(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let result = self.render_comparison(column, value, true);
        self.apply(result)
    }

    /// Like [`compare_column`](Self::compare_column) but strings are always
    /// compared for equality, operator prefix or not
    pub fn equals(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let result = self.render_comparison(column, value, false);
        self.apply(result)
    }

    /// [`compare_column`](Self::compare_column) for each pair
    pub fn compare_columns<K, V, I>(mut self, pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (column, value) in pairs {
            self = self.compare_column(column.as_ref(), value);
        }
        self
    }

    /// `column LIKE '%value%'`, with LIKE metacharacters in `value` escaped
    pub fn compare_column_like(mut self, column: &str, value: &str) -> Self {
        let result = self.column_ref(column).and_then(|quoted| {
            let name = self
                .params
                .bind_unique(&format!("ag_{}", param_safe(column)), format!("%{}%", escape_like(value)))?;
            Ok(format!("{} LIKE :{}", quoted, name))
        });
        self.apply(result)
    }

    fn render_comparison(&mut self, column: &str, value: Value, parse_operator: bool) -> ModelResult<String> {
        let quoted = self.column_ref(column)?;
        let base = format!("ag_{}", param_safe(column));
        match value {
            Value::Null => Ok(format!("{} IS NULL", quoted)),
            Value::List(items) if items.is_empty() => Ok("0 = 1".to_string()),
            Value::List(items) => {
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    names.push(format!(":{}", self.params.bind_unique(&base, item)?));
                }
                Ok(format!("{} IN ({})", quoted, names.join(", ")))
            }
            Value::String(text) if parse_operator => {
                let (operator, operand) = split_operator(&text);
                let name = self.params.bind_unique(&base, operand)?;
                Ok(format!("{} {} :{}", quoted, operator, name))
            }
            scalar => {
                let name = self.params.bind_unique(&base, scalar)?;
                Ok(format!("{} = :{}", quoted, name))
            }
        }
    }

    /// Mark a relation path as needed by the filter so it is joined
    ///
    /// For raw conditions that mention a relation alias directly.
    pub fn references(mut self, path: &str) -> Self {
        match self.resolve_path(path) {
            Ok(_) => {
                if self.filter_paths.insert(path.to_string()) {
                    self.planner.reset();
                }
            }
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Request relation paths to be loaded with the records
    pub fn with<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            let path = path.into();
            if !path.is_empty() && !self.with.contains(&path) {
                self.with.push(path);
            }
        }
        self.planner.reset();
        self
    }

    /// Select only these columns of the primary model
    ///
    /// A `relation.column` path comes back aliased as `relation.column`, the
    /// same way selected joins are, so it never shadows a primary attribute.
    pub fn fields<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            let column = column.as_ref();
            match self.column_ref(column) {
                Ok(quoted) => match column.rsplit_once('.') {
                    Some((path, _)) if path != PRIMARY_ALIAS => {
                        self.fields.push(format!("{} AS {}", quoted, quote_identifier(column)))
                    }
                    _ => self.fields.push(quoted),
                },
                Err(err) => self.record_error(err),
            }
        }
        self
    }

    /// Append a raw SELECT expression; its alias becomes an ad-hoc attribute
    pub fn select_raw(mut self, expression: impl Into<String>) -> Self {
        self.extra_select.push(expression.into());
        self
    }

    /// Append a raw JOIN fragment after the relation joins
    pub fn join_raw(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        if !fragment.trim().is_empty() {
            self.joins.push(fragment);
        }
        self
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        let result = self
            .column_ref(column)
            .map(|quoted| format!("{} {}", quoted, direction));
        match result {
            Ok(order) => self.order.push(order),
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn order_raw(mut self, expression: impl Into<String>) -> Self {
        self.order.push(expression.into());
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        match self.column_ref(column) {
            Ok(quoted) => self.group.push(quoted),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// AND a raw HAVING condition
    pub fn having(mut self, condition: &str, params: Params) -> Self {
        match self.params.merge_into_sql(condition, params) {
            Ok(condition) => {
                self.having = Some(match self.having.take() {
                    Some(existing) => format!("({}) AND ({})", existing, condition),
                    None => condition,
                });
            }
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    fn combine(mut self, operator: &str, condition: &str, params: Params) -> Self {
        if condition.trim().is_empty() {
            return self;
        }
        let result = self.params.merge_into_sql(condition, params);
        match result {
            Ok(condition) => self.push_where(operator, condition),
            Err(err) => self.record_error(err),
        }
        self
    }

    fn apply(mut self, fragment: ModelResult<String>) -> Self {
        match fragment {
            Ok(fragment) => self.push_where("AND", fragment),
            Err(err) => self.record_error(err),
        }
        self
    }

    fn push_where(&mut self, operator: &str, condition: String) {
        self.where_sql = Some(match self.where_sql.take() {
            Some(existing) => format!("({}) {} ({})", existing, operator, condition),
            None => condition,
        });
    }

    // first error wins
    pub(crate) fn record_error(&mut self, err: ModelError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Surface an error recorded while chaining
    pub fn check(&self) -> ModelResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Split a leading comparison operator off `text`; `=` when there is none
fn split_operator(text: &str) -> (&'static str, String) {
    let trimmed = text.trim_start();
    for operator in OPERATORS {
        if let Some(rest) = trimmed.strip_prefix(operator) {
            return (operator, rest.trim_start().to_string());
        }
    }
    ("=", text.to_string())
}
