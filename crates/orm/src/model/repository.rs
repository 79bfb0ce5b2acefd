//! Repository: finders and writes for one model
//!
//! The record type carries no persistence behaviour of its own; everything
//! that touches storage goes through a [`Repository`] built over a shared
//! connection and schema.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::definition::{ModelDefinition, Schema};
use super::record::{Model, RelationValue};
use super::validation::ValidationErrors;
use crate::condition::Condition;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::query::{OnDuplicate, QueryBuilder};
use crate::relations::{load_deferred, DeferredRelation};
use crate::sql::{quote_column, Params, PRIMARY_ALIAS};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Repository {
    conn: Arc<Connection>,
    schema: Arc<Schema>,
    definition: Arc<ModelDefinition>,
}

impl Repository {
    /// Repository for the model registered as `model`
    pub fn new(conn: Arc<Connection>, schema: Arc<Schema>, model: &str) -> ModelResult<Self> {
        let definition = schema.model(model)?;
        Ok(Self {
            conn,
            schema,
            definition,
        })
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// A fresh unsaved record
    pub fn new_model(&self) -> Model {
        Model::new(Arc::clone(&self.definition))
    }

    /// An empty condition on this model
    pub fn condition(&self) -> Condition {
        Condition::for_definition(Arc::clone(&self.schema), Arc::clone(&self.definition))
    }

    pub async fn find(&self, condition: Condition) -> ModelResult<Option<Model>> {
        self.ensure_condition(&condition)?;
        condition.fetch_one(&self.conn).await
    }

    pub async fn find_all(&self, condition: Condition) -> ModelResult<Vec<Model>> {
        self.ensure_condition(&condition)?;
        condition.fetch_all(&self.conn).await
    }

    /// [`find_all`](Self::find_all) deserialized into plain structs
    pub async fn find_all_as<T: DeserializeOwned>(&self, condition: Condition) -> ModelResult<Vec<T>> {
        self.find_all(condition)
            .await?
            .iter()
            .map(Model::into_entity)
            .collect()
    }

    pub async fn find_by_pk(&self, key: impl Into<Value>) -> ModelResult<Option<Model>> {
        self.find(self.pk_condition(key.into())?).await
    }

    /// Records whose columns equal every given value
    pub async fn find_all_by_attributes<K, V, I>(&self, attributes: I) -> ModelResult<Vec<Model>>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut condition = self.condition();
        for (column, value) in attributes {
            condition = condition.equals(column.as_ref(), value);
        }
        self.find_all(condition).await
    }

    /// Hydrate records from hand-written SQL; every returned column is kept
    pub async fn find_by_sql(&self, sql: &str, params: &Params) -> ModelResult<Vec<Model>> {
        let mut models: Vec<Model> = self.conn.query_typed(sql, params, &self.definition).await?;
        if let Some(observer) = self.definition.observer() {
            for model in &mut models {
                observer.after_load(model).await?;
            }
        }
        Ok(models)
    }

    pub async fn count(&self, mut condition: Condition) -> ModelResult<u64> {
        self.ensure_condition(&condition)?;
        condition.fetch_count(&self.conn).await
    }

    pub async fn exists(&self, condition: Condition) -> ModelResult<bool> {
        Ok(self.count(condition).await? > 0)
    }

    /// Run the declared rules and the observer's check; errors land on the record
    pub fn validate(&self, model: &mut Model) -> bool {
        let mut errors = ValidationErrors::new();
        for (attribute, rule) in self.definition.rules() {
            let value = model.attributes.get(attribute).cloned().unwrap_or(Value::Null);
            if let Some(message) = rule.check(attribute, &value) {
                errors.entry(attribute.clone()).or_default().push(message);
            }
        }
        if let Some(observer) = self.definition.observer() {
            observer.validate(model, &mut errors);
        }
        let valid = errors.is_empty();
        model.errors = errors;
        valid
    }

    /// Persist the record
    ///
    /// New records INSERT their dirty attributes and are reloaded; persisted
    /// records UPDATE whatever is still dirty. Returns `false` on failed
    /// validation, a declined `before_save`, an INSERT that wrote nothing or
    /// produced no key.
    pub async fn save(&self, model: &mut Model, validate: bool) -> ModelResult<bool> {
        self.ensure_model(model)?;
        if validate && !self.validate(model) {
            debug!(model = %self.definition.name(), errors = ?model.errors, "Validation failed");
            return Ok(false);
        }

        let observer = self.definition.observer().cloned();
        if let Some(observer) = &observer {
            if !observer.before_save(model).await? {
                return Ok(false);
            }
        }

        let pk = self
            .definition
            .primary_key()
            .ok_or(ModelError::MissingPrimaryKey)?
            .to_string();

        if model.is_new_record() {
            let builder = QueryBuilder::table(self.definition.table());
            let (sql, params) = builder.to_insert_sql(model.dirty_attributes(), &OnDuplicate::Error)?;
            let outcome = self.conn.execute_write(&sql, &params).await?;
            if outcome.failed || outcome.rows_affected == 0 {
                warn!(model = %self.definition.name(), failed = outcome.failed, "INSERT wrote no row");
                return Ok(false);
            }

            let key = match outcome.last_insert_id {
                Some(id) => i64::try_from(id).map(Value::Int).unwrap_or(Value::UInt(id)),
                None => match model.primary_key_value() {
                    Some(key) => key.clone(),
                    None => {
                        warn!(model = %self.definition.name(), "INSERT produced no primary key");
                        return Ok(false);
                    }
                },
            };
            model.attributes.insert(pk.clone(), key);
            model.new_record = false;
            model.mark_clean();
            self.reload(model).await?;
        }

        if model.is_dirty() {
            let key = model.primary_key_value().cloned().ok_or(ModelError::MissingPrimaryKey)?;
            let builder = QueryBuilder::table(self.definition.table()).compare([(pk.as_str(), key)]);
            builder.check()?;
            let (sql, params) = builder.to_update_sql(model.dirty_attributes())?;
            // zero affected rows is normal when the values did not change
            if self.conn.execute_write(&sql, &params).await?.failed {
                warn!(model = %self.definition.name(), "UPDATE failed; record left dirty");
                return Ok(false);
            }
            model.mark_clean();
        }

        if let Some(observer) = &observer {
            observer.after_save(model).await?;
        }
        Ok(true)
    }

    /// Delete the record by key; `false` when a hook declines or no row went away
    pub async fn delete(&self, model: &Model) -> ModelResult<bool> {
        self.ensure_model(model)?;
        let Some(key) = model.primary_key_value().cloned() else {
            return Ok(false);
        };
        let pk = self.definition.primary_key().ok_or(ModelError::MissingPrimaryKey)?;

        let observer = self.definition.observer().cloned();
        if let Some(observer) = &observer {
            if !observer.before_delete(model).await? {
                return Ok(false);
            }
        }

        let builder = QueryBuilder::table(self.definition.table()).compare([(pk, key)]);
        builder.check()?;
        let outcome = self.conn.execute_write(&builder.to_delete_sql(), &builder.params).await?;
        if outcome.failed || outcome.rows_affected == 0 {
            return Ok(false);
        }

        if let Some(observer) = &observer {
            observer.after_delete(model).await?;
        }
        Ok(true)
    }

    /// Re-fetch by key, replacing attributes and dropping resolved relations
    ///
    /// `false` when the row no longer exists.
    pub async fn reload(&self, model: &mut Model) -> ModelResult<bool> {
        self.ensure_model(model)?;
        let key = model.primary_key_value().cloned().ok_or(ModelError::MissingPrimaryKey)?;
        match self.find_by_pk(key).await? {
            Some(fresh) => {
                model.replace_with(fresh);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolve a relation on first access; later calls return the cached value
    pub async fn load_relation<'m>(&self, model: &'m mut Model, name: &str) -> ModelResult<&'m RelationValue> {
        self.ensure_model(model)?;
        if !model.is_relation_loaded(name) {
            self.definition.require_relation(name)?;
            let root = Arc::clone(model.definition());
            let deferred = DeferredRelation {
                owner_path: String::new(),
                relation: name.to_string(),
                nested: Vec::new(),
            };
            load_deferred(&self.conn, &self.schema, &root, std::slice::from_mut(model), &deferred).await?;
        }
        model.related(name)?.ok_or_else(|| {
            ModelError::Relationship(format!("Relation '{}' could not be resolved", name))
        })
    }

    /// UPDATE every row matching `condition`
    pub async fn update_all<K, V, I>(&self, mut condition: Condition, columns: I) -> ModelResult<u64>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.ensure_condition(&condition)?;
        let columns: Vec<(String, Value)> = columns
            .into_iter()
            .map(|(column, value)| (format!("{}.{}", PRIMARY_ALIAS, column.as_ref()), value.into()))
            .collect();
        condition.write_builder()?.update(&self.conn, columns).await
    }

    /// DELETE every row matching `condition`
    pub async fn delete_all(&self, mut condition: Condition) -> ModelResult<u64> {
        self.ensure_condition(&condition)?;
        condition.write_builder()?.delete(&self.conn).await
    }

    fn pk_condition(&self, key: Value) -> ModelResult<Condition> {
        let pk = self.definition.primary_key().ok_or(ModelError::MissingPrimaryKey)?;
        Ok(self.condition().and_where(
            &format!("{} = :pk", quote_column(PRIMARY_ALIAS, pk)),
            Params::new().with("pk", key),
        ))
    }

    fn ensure_condition(&self, condition: &Condition) -> ModelResult<()> {
        self.ensure_definition(condition.definition())
    }

    fn ensure_model(&self, model: &Model) -> ModelResult<()> {
        self.ensure_definition(model.definition())
    }

    fn ensure_definition(&self, definition: &ModelDefinition) -> ModelResult<()> {
        if definition.name() == self.definition.name() {
            Ok(())
        } else {
            Err(ModelError::Configuration(format!(
                "Repository for '{}' was given a '{}'",
                self.definition.name(),
                definition.name()
            )))
        }
    }
}
