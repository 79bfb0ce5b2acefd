//! The model record: attributes, dirty tracking and resolved relations

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use super::definition::ModelDefinition;
use super::validation::ValidationErrors;
use crate::backends::Row;
use crate::connection::Hydrate;
use crate::error::{ModelError, ModelResult};
use crate::value::Value;

static NULL: Value = Value::Null;

/// A resolved relation on a record
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Option<Box<Model>>),
    Many(Vec<Model>),
}

impl RelationValue {
    /// Empty value of the right shape for `single` or collection relations
    pub fn empty(single: bool) -> Self {
        if single {
            RelationValue::One(None)
        } else {
            RelationValue::Many(Vec::new())
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            RelationValue::One(Some(model)) => model.to_json(),
            RelationValue::One(None) => JsonValue::Null,
            RelationValue::Many(models) => JsonValue::Array(models.iter().map(Model::to_json).collect()),
        }
    }
}

/// One row of a model's table
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) definition: Arc<ModelDefinition>,
    pub(crate) attributes: BTreeMap<String, Value>,
    pub(crate) dirty: BTreeSet<String>,
    pub(crate) new_record: bool,
    pub(crate) relations: BTreeMap<String, RelationValue>,
    pub(crate) extras: BTreeMap<String, Value>,
    pub(crate) errors: ValidationErrors,
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.definition.name() == other.definition.name()
            && self.attributes == other.attributes
            && self.relations == other.relations
            && self.extras == other.extras
            && self.new_record == other.new_record
    }
}

impl Model {
    /// A fresh, unsaved record
    pub fn new(definition: Arc<ModelDefinition>) -> Self {
        Self {
            definition,
            attributes: BTreeMap::new(),
            dirty: BTreeSet::new(),
            new_record: true,
            relations: BTreeMap::new(),
            extras: BTreeMap::new(),
            errors: ValidationErrors::new(),
        }
    }

    /// A persisted record built from loaded values
    ///
    /// Declared columns become attributes, anything else an ad-hoc extra.
    /// A definition without declared columns takes every value as an attribute.
    pub fn from_values<I>(definition: Arc<ModelDefinition>, values: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut model = Self::new(definition);
        model.new_record = false;
        let open = model.definition.columns().is_empty();
        for (column, value) in values {
            if open || model.definition.has_column(&column) {
                model.attributes.insert(column, value);
            } else {
                model.extras.insert(column, value);
            }
        }
        model
    }

    pub fn from_row(definition: Arc<ModelDefinition>, row: Row) -> Self {
        Self::from_values(definition, row)
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    /// Value of the primary key, `None` when undeclared or unset
    pub fn primary_key_value(&self) -> Option<&Value> {
        let pk = self.definition.primary_key()?;
        self.attributes.get(pk).filter(|v| !v.is_null())
    }

    /// Read an attribute, a declared-but-unloaded column (null) or an extra
    pub fn get(&self, name: &str) -> ModelResult<&Value> {
        if let Some(value) = self.attributes.get(name) {
            return Ok(value);
        }
        if let Some(value) = self.extras.get(name) {
            return Ok(value);
        }
        if self.definition.has_column(name) {
            return Ok(&NULL);
        }
        Err(self.unknown_field(name))
    }

    /// Read an attribute through serde
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> ModelResult<T> {
        let value = self.get(name)?;
        serde_json::from_value(value.to_json())
            .map_err(|e| ModelError::Serialization(format!("Attribute '{}': {}", name, e)))
    }

    /// Write an attribute and mark it dirty
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        let value = value.into();
        let columns_known = !self.definition.columns().is_empty();
        if columns_known && !self.definition.has_column(name) {
            return Err(self.unknown_field(name));
        }

        if !self.new_record && self.definition.primary_key() == Some(name) {
            let current = self.attributes.get(name).unwrap_or(&NULL);
            if *current != value {
                return Err(ModelError::ImmutablePrimaryKey {
                    model: self.definition.name().to_string(),
                    column: name.to_string(),
                });
            }
            return Ok(());
        }

        self.attributes.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
        Ok(())
    }

    /// [`set`](Self::set) for each pair; stops at the first error
    pub fn set_attributes<K, V, I>(&mut self, values: I) -> ModelResult<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (name, value) in values {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Non-column values returned by the query that loaded this record
    pub fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extras
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_attribute_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// Dirty attributes with their current values, in column order
    pub fn dirty_attributes(&self) -> Vec<(String, Value)> {
        self.dirty
            .iter()
            .map(|name| (name.clone(), self.attributes.get(name).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// A resolved relation, `None` while it has not been loaded
    pub fn related(&self, name: &str) -> ModelResult<Option<&RelationValue>> {
        self.definition.require_relation(name)?;
        Ok(self.relations.get(name))
    }

    /// The record of a loaded single-result relation
    pub fn related_one(&self, name: &str) -> ModelResult<Option<&Model>> {
        match self.related(name)? {
            Some(RelationValue::One(model)) => Ok(model.as_deref()),
            Some(RelationValue::Many(_)) => Err(ModelError::Relationship(format!(
                "Relation '{}' holds a collection",
                name
            ))),
            None => Ok(None),
        }
    }

    /// The records of a loaded collection relation; empty while unloaded
    pub fn related_many(&self, name: &str) -> ModelResult<&[Model]> {
        match self.related(name)? {
            Some(RelationValue::Many(models)) => Ok(models),
            Some(RelationValue::One(_)) => Err(ModelError::Relationship(format!(
                "Relation '{}' holds a single record",
                name
            ))),
            None => Ok(&[]),
        }
    }

    pub fn is_relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Attach a resolved relation
    pub fn set_relation(&mut self, name: &str, value: RelationValue) -> ModelResult<()> {
        let relation = self.definition.require_relation(name)?;
        let shape_ok = matches!(
            (&value, relation.has_single_result()),
            (RelationValue::One(_), true) | (RelationValue::Many(_), false)
        );
        if !shape_ok {
            return Err(ModelError::Relationship(format!(
                "Relation '{}' on '{}' has the wrong cardinality for this value",
                name,
                self.definition.name()
            )));
        }
        self.relations.insert(name.to_string(), value);
        Ok(())
    }

    /// Validation messages from the last `validate` or `save`
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(attribute.into()).or_default().push(message.into());
    }

    /// Attributes, extras and loaded relations as one JSON object
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::new();
        for (name, value) in self.attributes.iter().chain(self.extras.iter()) {
            object.insert(name.clone(), value.to_json());
        }
        for (name, relation) in &self.relations {
            object.insert(name.clone(), relation.to_json());
        }
        JsonValue::Object(object)
    }

    /// Deserialize the record (with loaded relations) into a plain struct
    pub fn into_entity<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Replace everything loaded from storage, as after a fresh fetch
    pub(crate) fn replace_with(&mut self, fresh: Model) {
        self.attributes = fresh.attributes;
        self.extras = fresh.extras;
        self.relations.clear();
        self.dirty.clear();
        self.new_record = false;
    }

    fn unknown_field(&self, name: &str) -> ModelError {
        ModelError::UnknownField {
            model: self.definition.name().to_string(),
            field: name.to_string(),
        }
    }
}

impl Hydrate for Model {
    type Seed = Arc<ModelDefinition>;

    fn hydrate(definition: &Arc<ModelDefinition>, row: Row) -> ModelResult<Self> {
        Ok(Model::from_row(Arc::clone(definition), row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RelationDescriptor;
    use serde::Deserialize;

    fn users() -> Arc<ModelDefinition> {
        Arc::new(
            ModelDefinition::builder("User", "users")
                .primary_key("id")
                .columns(["id", "name", "age"])
                .relation(RelationDescriptor::has_many("posts", "Post").on("user_id", "id"))
                .relation(RelationDescriptor::belongs_to("team", "Team").on("id", "team_id"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_unknown_fields_are_errors() {
        let mut user = Model::new(users());
        assert!(matches!(user.get("nmae"), Err(ModelError::UnknownField { .. })));
        assert!(matches!(user.set("nmae", "x"), Err(ModelError::UnknownField { .. })));
        assert_eq!(user.get("age").unwrap(), &Value::Null);
    }

    #[test]
    fn test_set_tracks_dirty_attributes() {
        let mut user = Model::new(users());
        user.set_attributes([("name", "ann"), ("age", "31")]).unwrap();
        assert!(user.is_dirty());
        assert_eq!(
            user.dirty_attributes(),
            vec![("age".to_string(), Value::from("31")), ("name".to_string(), Value::from("ann"))]
        );
        user.mark_clean();
        assert!(!user.is_dirty());
    }

    #[test]
    fn test_primary_key_is_immutable_once_persisted() {
        let mut user = Model::from_values(users(), [("id".to_string(), Value::Int(4))]);
        assert!(!user.is_new_record());
        assert!(user.set("id", 4).is_ok());
        assert!(matches!(
            user.set("id", 5),
            Err(ModelError::ImmutablePrimaryKey { .. })
        ));
        assert!(!user.is_dirty());
    }

    #[test]
    fn test_unknown_columns_become_extras() {
        let row = Row::from_pairs([("id", Value::Int(1)), ("post_count", Value::Int(3))]);
        let user = Model::from_row(users(), row);
        assert_eq!(user.attributes().len(), 1);
        assert_eq!(user.get("post_count").unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_relation_access_checks_cardinality() {
        let mut user = Model::new(users());
        assert!(matches!(user.related("comments"), Err(ModelError::UnknownRelation { .. })));
        assert!(user.related_many("posts").unwrap().is_empty());
        assert!(user.set_relation("posts", RelationValue::One(None)).is_err());
        user.set_relation("team", RelationValue::One(None)).unwrap();
        assert!(user.is_relation_loaded("team"));
        assert!(user.related_one("team").unwrap().is_none());
    }

    #[test]
    fn test_into_entity() {
        #[derive(Deserialize)]
        struct User {
            id: i64,
            name: String,
            posts: Vec<serde_json::Value>,
        }

        let mut user = Model::from_values(
            users(),
            [("id".to_string(), Value::Int(7)), ("name".to_string(), Value::from("ann"))],
        );
        user.set_relation("posts", RelationValue::Many(Vec::new())).unwrap();
        let entity: User = user.into_entity().unwrap();
        assert_eq!(entity.id, 7);
        assert_eq!(entity.name, "ann");
        assert!(entity.posts.is_empty());
        assert_eq!(user.get_as::<i64>("id").unwrap(), 7);
    }
}
