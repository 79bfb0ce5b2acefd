//! Model definitions and the schema registry

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::observer::ModelObserver;
use super::validation::Rule;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::relations::RelationDescriptor;

/// Table, key, columns, relations and behaviour of one model
#[derive(Clone)]
pub struct ModelDefinition {
    name: String,
    table: String,
    primary_key: Option<String>,
    columns: Vec<String>,
    relations: Vec<RelationDescriptor>,
    rules: Vec<(String, Rule)>,
    observer: Option<Arc<dyn ModelObserver>>,
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("relations", &self.relations.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field("rules", &self.rules.len())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ModelDefinition {
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> ModelDefinitionBuilder {
        ModelDefinitionBuilder {
            definition: ModelDefinition {
                name: name.into(),
                table: table.into(),
                primary_key: None,
                columns: Vec::new(),
                relations: Vec::new(),
                rules: Vec::new(),
                observer: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Declared columns in table order; empty until declared or introspected
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name() == name)
    }

    /// The relation or an `UnknownRelation` error naming it
    pub fn require_relation(&self, name: &str) -> ModelResult<&RelationDescriptor> {
        self.relation(name).ok_or_else(|| ModelError::UnknownRelation {
            model: self.name.clone(),
            relation: name.to_string(),
        })
    }

    pub fn rules(&self) -> &[(String, Rule)] {
        &self.rules
    }

    pub fn observer(&self) -> Option<&Arc<dyn ModelObserver>> {
        self.observer.as_ref()
    }
}

/// Builder returned by [`ModelDefinition::builder`]
pub struct ModelDefinitionBuilder {
    definition: ModelDefinition,
}

impl ModelDefinitionBuilder {
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.definition.primary_key = Some(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        self.definition.relations.push(relation);
        self
    }

    pub fn rule(mut self, attribute: impl Into<String>, rule: Rule) -> Self {
        self.definition.rules.push((attribute.into(), rule));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ModelObserver>) -> Self {
        self.definition.observer = Some(observer);
        self
    }

    /// Finish the definition; relation names must be unique
    pub fn build(self) -> ModelResult<ModelDefinition> {
        let definition = self.definition;
        let mut seen = BTreeSet::new();
        for relation in &definition.relations {
            if !seen.insert(relation.name()) {
                return Err(ModelError::Configuration(format!(
                    "Relation '{}' is declared twice on model '{}'",
                    relation.name(),
                    definition.name
                )));
            }
        }
        if let Some(pk) = &definition.primary_key {
            if !definition.columns.is_empty() && !definition.columns.contains(pk) {
                return Err(ModelError::Configuration(format!(
                    "Primary key '{}' is not a declared column of model '{}'",
                    pk, definition.name
                )));
            }
        }
        Ok(definition)
    }
}

/// Registry of model definitions keyed by model name
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: HashMap<String, Arc<ModelDefinition>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ModelDefinition) -> Arc<ModelDefinition> {
        let definition = Arc::new(definition);
        self.models
            .insert(definition.name().to_string(), Arc::clone(&definition));
        definition
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, definition: ModelDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelDefinition>> {
        self.models.get(name).cloned()
    }

    /// The named definition or a configuration error
    pub fn model(&self, name: &str) -> ModelResult<Arc<ModelDefinition>> {
        self.get(name)
            .ok_or_else(|| ModelError::Configuration(format!("Model '{}' is not registered", name)))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Check that every relation points at a registered model
    pub fn validate(&self) -> ModelResult<()> {
        for definition in self.models.values() {
            for relation in definition.relations() {
                if !self.models.contains_key(relation.target()) {
                    return Err(ModelError::Configuration(format!(
                        "Relation '{}' on '{}' targets unregistered model '{}'",
                        relation.name(),
                        definition.name(),
                        relation.target()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fill missing columns and primary keys from the connection's table metadata
    pub async fn introspect(&mut self, conn: &Connection) -> ModelResult<()> {
        let names: Vec<String> = self.models.keys().cloned().collect();
        for name in names {
            let Some(current) = self.models.get(&name).cloned() else {
                continue;
            };
            if !current.columns.is_empty() && current.primary_key.is_some() {
                continue;
            }

            let metadata = conn.table_columns(&current.table).await?;
            if metadata.is_empty() {
                return Err(ModelError::Schema(format!(
                    "No column metadata for table '{}' of model '{}'",
                    current.table, name
                )));
            }

            let mut definition = (*current).clone();
            if definition.columns.is_empty() {
                definition.columns = metadata.iter().map(|c| c.name.clone()).collect();
            }
            if definition.primary_key.is_none() {
                definition.primary_key = conn.table_primary_key(&definition.table).await?;
            }
            debug!(
                model = %name,
                table = %definition.table,
                columns = definition.columns.len(),
                "Introspected model definition"
            );
            self.models.insert(name, Arc::new(definition));
        }
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockDriver, Row};
    use tessera_core::DatabaseConfig;

    #[test]
    fn test_builder_rejects_duplicate_relations() {
        let result = ModelDefinition::builder("User", "users")
            .relation(RelationDescriptor::has_many("posts", "Post"))
            .relation(RelationDescriptor::has_one("posts", "Post"))
            .build();
        assert!(matches!(result, Err(ModelError::Configuration(_))));
    }

    #[test]
    fn test_builder_rejects_undeclared_primary_key() {
        let result = ModelDefinition::builder("User", "users")
            .primary_key("uuid")
            .columns(["id", "name"])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_lookup_and_validation() {
        let schema = Schema::new().with(
            ModelDefinition::builder("User", "users")
                .relation(RelationDescriptor::has_many("posts", "Post"))
                .build()
                .unwrap(),
        );
        assert!(schema.get("User").is_some());
        assert!(matches!(schema.model("Post"), Err(ModelError::Configuration(_))));
        assert!(schema.validate().is_err());
    }

    #[tokio::test]
    async fn test_introspect_fills_columns_and_key() {
        let driver = MockDriver::new();
        driver.on_query(
            "SHOW COLUMNS FROM `users`",
            vec![
                Row::from_pairs([("Field", "id"), ("Type", "int"), ("Null", "NO"), ("Key", "PRI"), ("Extra", "auto_increment")]),
                Row::from_pairs([("Field", "name"), ("Type", "varchar(64)"), ("Null", "YES"), ("Key", ""), ("Extra", "")]),
            ],
        );
        let conn = Connection::with_driver(DatabaseConfig::new("mysql://localhost/app"), Arc::new(driver.clone()));
        let mut schema = Schema::new().with(ModelDefinition::builder("User", "users").build().unwrap());

        schema.introspect(&conn).await.unwrap();
        let user = schema.model("User").unwrap();
        assert_eq!(user.columns(), ["id".to_string(), "name".to_string()]);
        assert_eq!(user.primary_key(), Some("id"));
        assert_eq!(driver.statements().len(), 1);
    }
}
