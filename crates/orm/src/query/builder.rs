//! Query Builder - Core builder implementation

use crate::error::{ModelError, ModelResult};
use crate::sql::Params;

/// Single-table SQL builder with bound parameters
///
/// Builder methods consume and return `self`. Fragments are not validated:
/// an empty table name or a malformed raw condition simply produces SQL the
/// server will reject.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    pub(crate) table: String,
    pub(crate) alias: Option<String>,
    pub(crate) select_fields: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<String>,
    pub(crate) where_sql: Option<String>,
    pub(crate) having_sql: Option<String>,
    pub(crate) params: Params,
    pub(crate) order_by: Vec<String>,
    pub(crate) group_by: Vec<String>,
    pub(crate) limit_count: Option<u64>,
    pub(crate) offset_value: Option<u64>,
    pub(crate) compare_index: usize,
    pub(crate) cursor: u64,
    pub(crate) error: Option<ModelError>,
}

impl QueryBuilder {
    /// Create a builder for `table`
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Parameters bound so far
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The WHERE expression without the keyword
    pub fn where_sql(&self) -> Option<&str> {
        self.where_sql.as_deref()
    }

    // first error wins; later ones are usually consequences
    pub(crate) fn record_error(&mut self, err: ModelError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Surface an error recorded while chaining
    pub(crate) fn check(&self) -> ModelResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
