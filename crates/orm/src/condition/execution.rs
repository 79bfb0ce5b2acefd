//! Condition execution

use std::future::Future;
use std::pin::Pin;

use super::Condition;
use crate::connection::Connection;
use crate::error::ModelResult;
use crate::hydration::hydrate_row;
use crate::model::Model;
use crate::query::execution::count_value;
use crate::relations::{load_deferred, PlannedJoin};

/// Boxed future returned by recursive condition execution
pub type ModelFuture<'a, T> = Pin<Box<dyn Future<Output = ModelResult<T>> + Send + 'a>>;

impl Condition {
    /// Run the query, hydrate every row and load the deferred relations
    ///
    /// Boxed because deferred relations run conditions of their own.
    pub fn fetch_all(mut self, conn: &Connection) -> ModelFuture<'_, Vec<Model>> {
        Box::pin(async move {
            let query = self.get_as_query(false)?;
            let plan = self.plan()?;
            let rows = conn.query_rows(&query.sql, &query.params).await?;

            let mut models: Vec<Model> = {
                let joins: Vec<&PlannedJoin> = plan.selected_joins().collect();
                rows.into_iter()
                    .map(|row| hydrate_row(&self.definition, &joins, row))
                    .collect()
            };

            if !models.is_empty() {
                for deferred in &plan.deferred {
                    load_deferred(conn, &self.schema, &self.definition, &mut models, deferred).await?;
                }
            }
            self.planner.mark_extra_queries_computed();

            if let Some(observer) = self.definition.observer() {
                for model in &mut models {
                    observer.after_load(model).await?;
                }
            }
            self.planner.mark_done();
            Ok(models)
        })
    }

    /// First matching record
    pub async fn fetch_one(self, conn: &Connection) -> ModelResult<Option<Model>> {
        Ok(self.limit(1).fetch_all(conn).await?.into_iter().next())
    }

    /// Number of primary records matching the filter
    pub async fn fetch_count(&mut self, conn: &Connection) -> ModelResult<u64> {
        let query = self.get_as_query(true)?;
        count_value(conn.query_scalar(&query.sql, &query.params).await?)
    }
}
