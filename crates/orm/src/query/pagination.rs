//! Query Builder pagination operations

use super::builder::QueryBuilder;
use crate::backends::Row;
use crate::connection::Connection;
use crate::error::ModelResult;

impl QueryBuilder {
    /// Add LIMIT clause
    pub fn limit(mut self, count: u64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: u64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// Add pagination (LIMIT + OFFSET); pages start at 1
    pub fn paginate(mut self, per_page: u64, page: u64) -> Self {
        self.limit_count = Some(per_page);
        self.offset_value = Some(page.saturating_sub(1).saturating_mul(per_page));
        self
    }

    /// Fetch the row under the cursor and advance it.
    ///
    /// Yields `None` once the cursor has passed the configured limit or the
    /// table runs out of rows.
    pub async fn next(&mut self, conn: &Connection) -> ModelResult<Option<Row>> {
        self.check()?;
        if self.limit_count.is_some_and(|limit| self.cursor >= limit) {
            return Ok(None);
        }

        let offset = self.offset_value.unwrap_or(0).saturating_add(self.cursor);
        let sql = self.select_sql_window(Some(1), Some(offset));
        let row = conn.query_rows(&sql, &self.params).await?.into_iter().next();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    /// Rewind [`next`](Self::next) to the first row
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}
