//! SQL assembly for conditions

use std::sync::Arc;

use super::Condition;
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;
use crate::relations::{PlannedJoin, RelationPlan};
use crate::sql::{quote_column, quote_identifier, Params, PRIMARY_ALIAS};

/// Final SQL text with its named parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Params,
}

impl Condition {
    /// The classified relation plan, computed once per condition
    pub(crate) fn plan(&mut self) -> ModelResult<Arc<RelationPlan>> {
        self.planner
            .plan(&self.schema, &self.definition, &self.with, &self.filter_paths)
    }

    /// Assemble the SELECT, or the COUNT when `for_count` is set
    pub fn get_as_query(&mut self, for_count: bool) -> ModelResult<BuiltQuery> {
        self.check()?;
        let plan = self.plan()?;
        let query = if for_count {
            self.count_query(&plan)?
        } else {
            let builder = self.select_builder(&plan)?;
            BuiltQuery {
                sql: builder.to_select_sql(),
                params: builder.params,
            }
        };
        self.planner.mark_joins_computed();
        Ok(query)
    }

    pub fn to_select_sql(&mut self) -> ModelResult<String> {
        Ok(self.get_as_query(false)?.sql)
    }

    pub fn to_count_sql(&mut self) -> ModelResult<String> {
        Ok(self.get_as_query(true)?.sql)
    }

    /// Builder for UPDATE or DELETE over the filter and its required joins
    pub(crate) fn write_builder(&mut self) -> ModelResult<QueryBuilder> {
        self.check()?;
        let plan = self.plan()?;
        let mut params = self.params.clone();
        let joins = self.render_joins(&plan.count_joins(), &mut params)?;
        Ok(QueryBuilder {
            table: self.definition.table().to_string(),
            alias: Some(PRIMARY_ALIAS.to_string()),
            joins,
            where_sql: self.where_sql.clone(),
            params,
            ..QueryBuilder::default()
        })
    }

    fn select_builder(&self, plan: &RelationPlan) -> ModelResult<QueryBuilder> {
        let mut params = self.params.clone();
        let joins: Vec<&PlannedJoin> = plan.joins.iter().collect();
        let joins = self.render_joins(&joins, &mut params)?;

        let mut select = if self.fields.is_empty() {
            vec![quote_column(PRIMARY_ALIAS, "*")]
        } else {
            self.fields.clone()
        };
        for join in plan.selected_joins() {
            if join.target.columns().is_empty() {
                return Err(ModelError::Configuration(format!(
                    "Columns of model '{}' are unknown; declare them or introspect the schema before joining '{}'",
                    join.target.name(),
                    join.path
                )));
            }
            for column in join.target.columns() {
                select.push(format!(
                    "{} AS {}",
                    quote_column(&join.alias, column),
                    quote_identifier(&format!("{}.{}", join.path, column))
                ));
            }
        }
        select.extend(self.extra_select.iter().cloned());

        Ok(QueryBuilder {
            select_fields: select,
            distinct: self.distinct || plan.has_collection_join(),
            joins,
            order_by: self.order.clone(),
            limit_count: self.limit,
            offset_value: self.offset,
            ..self.base_builder(params)
        })
    }

    /// COUNT over the filter; only joins that can change row existence are kept
    ///
    /// A joined collection repeats primary rows, so the count switches to
    /// distinct primary keys. Grouped conditions count groups.
    fn count_query(&self, plan: &RelationPlan) -> ModelResult<BuiltQuery> {
        let mut params = self.params.clone();
        let count_joins = plan.count_joins();
        let multiplies = count_joins.iter().any(|j| !j.is_single());
        let joins = self.render_joins(&count_joins, &mut params)?;
        let mut builder = QueryBuilder {
            joins,
            ..self.base_builder(params)
        };

        if !self.group.is_empty() {
            builder.select_fields = if self.fields.is_empty() {
                self.group.clone()
            } else {
                self.fields.clone()
            };
            builder.distinct = self.distinct;
        } else if self.distinct && !self.fields.is_empty() {
            builder.select_fields = self.fields.clone();
            builder.distinct = true;
        } else if multiplies || self.distinct {
            match self.definition.primary_key() {
                Some(pk) => {
                    let sql = format!(
                        "SELECT COUNT(DISTINCT {}) FROM {}{}",
                        quote_column(PRIMARY_ALIAS, pk),
                        builder.from_clause(),
                        builder.where_clause()
                    );
                    return Ok(BuiltQuery {
                        sql,
                        params: builder.params,
                    });
                }
                None => {
                    builder.select_fields = vec![quote_column(PRIMARY_ALIAS, "*")];
                    builder.distinct = true;
                }
            }
        }

        Ok(BuiltQuery {
            sql: builder.to_count_sql(),
            params: builder.params,
        })
    }

    fn base_builder(&self, params: Params) -> QueryBuilder {
        QueryBuilder {
            table: self.definition.table().to_string(),
            alias: Some(PRIMARY_ALIAS.to_string()),
            where_sql: self.where_sql.clone(),
            having_sql: self.having.clone(),
            group_by: self.group.clone(),
            params,
            ..QueryBuilder::default()
        }
    }

    fn render_joins(&self, joins: &[&PlannedJoin], params: &mut Params) -> ModelResult<Vec<String>> {
        let mut rendered = Vec::with_capacity(joins.len() + self.joins.len());
        for join in joins {
            rendered.push(join.join_sql(params)?);
        }
        rendered.extend(self.joins.iter().cloned());
        Ok(rendered)
    }
}
