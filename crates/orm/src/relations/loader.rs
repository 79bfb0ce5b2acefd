//! Batched loading of deferred relations
//!
//! One follow-up query per deferred relation per level: the owners' link
//! values are bound once, a `CASE` projection tags every returned row with
//! the index of the key it matched, and the rows are handed back to each
//! owner sharing that key.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::descriptor::{ColumnSet, Predicate, RelationDescriptor, RelationKind};
use super::planner::DeferredRelation;
use crate::condition::Condition;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, ModelDefinition, RelationValue, Schema};
use crate::sql::{quote_column, quote_identifier, quote_table, Params, PRIMARY_ALIAS};
use crate::value::Value;

/// Projected column carrying the matched key index
pub const OWNER_INDEX: &str = "__owner_index";

/// Alias of the link table in a many-to-many follow-up query
const VIA_ALIAS: &str = "__via";

/// How target rows are matched to owners
#[derive(Debug, Clone, PartialEq)]
struct Link {
    /// Expression on the follow-up query holding the owner's key
    target_expr: String,
    owner_column: String,
    join: Option<String>,
}

/// Load `deferred` for every owner reachable from `models`
pub(crate) async fn load_deferred(
    conn: &Connection,
    schema: &Arc<Schema>,
    root: &Arc<ModelDefinition>,
    models: &mut [Model],
    deferred: &DeferredRelation,
) -> ModelResult<()> {
    let owner = definition_at(schema, root, &deferred.owner_path)?;
    let relation = owner.require_relation(&deferred.relation)?.clone();
    let target = schema.model(relation.target())?;
    let link = link_for(&relation, &owner, &target)?;
    let single = relation.has_single_result();

    let mut keys: Vec<Value> = Vec::new();
    let mut key_index: HashMap<String, usize> = HashMap::new();
    let mut owner_keys: Vec<Option<usize>> = Vec::new();
    for model in owners_at_path(models, &deferred.owner_path) {
        model
            .relations
            .insert(relation.name().to_string(), RelationValue::empty(single));
        let key = match model.attributes.get(&link.owner_column) {
            Some(value) if !value.is_null() => {
                let tag = value.key_string();
                let index = match key_index.get(&tag) {
                    Some(&index) => index,
                    None => {
                        keys.push(value.clone());
                        key_index.insert(tag, keys.len() - 1);
                        keys.len() - 1
                    }
                };
                Some(index)
            }
            _ => None,
        };
        owner_keys.push(key);
    }

    if keys.is_empty() {
        return Ok(());
    }

    debug!(
        relation = %deferred.full_path(),
        keys = keys.len(),
        owners = owner_keys.len(),
        "Loading deferred relation"
    );

    let condition = follow_up_condition(schema, &relation, &target, &link, &keys, &deferred.nested)?;
    let related = condition.fetch_all(conn).await?;

    let mut buckets: Vec<Vec<Model>> = vec![Vec::new(); keys.len()];
    for mut model in related {
        let tag = model
            .extras
            .remove(OWNER_INDEX)
            .or_else(|| model.attributes.remove(OWNER_INDEX));
        let index = tag
            .as_ref()
            .and_then(Value::as_i64)
            .and_then(|i| usize::try_from(i).ok());
        if let Some(bucket) = index.and_then(|i| buckets.get_mut(i)) {
            bucket.push(model);
        }
    }

    for (model, key) in owners_at_path(models, &deferred.owner_path)
        .into_iter()
        .zip(owner_keys)
    {
        let Some(key) = key else {
            continue;
        };
        let bucket = &buckets[key];
        let value = if single {
            RelationValue::One(bucket.first().cloned().map(Box::new))
        } else {
            RelationValue::Many(bucket.clone())
        };
        model.relations.insert(relation.name().to_string(), value);
    }
    Ok(())
}

fn follow_up_condition(
    schema: &Arc<Schema>,
    relation: &RelationDescriptor,
    target: &Arc<ModelDefinition>,
    link: &Link,
    keys: &[Value],
    nested: &[String],
) -> ModelResult<Condition> {
    let mut condition = Condition::for_definition(Arc::clone(schema), Arc::clone(target));
    if let Some(join) = &link.join {
        condition = condition.join_raw(join.clone());
    }

    let mut names = Vec::with_capacity(keys.len());
    for key in keys {
        names.push(format!(":{}", condition.params.bind_unique("__link", key.clone())?));
    }
    let cases: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(index, name)| format!("WHEN {} THEN {}", name, index))
        .collect();
    condition = condition
        .select_raw(format!(
            "CASE {} {} END AS {}",
            link.target_expr,
            cases.join(" "),
            quote_identifier(OWNER_INDEX)
        ))
        .and_where(&format!("{} IN ({})", link.target_expr, names.join(", ")), Params::new());

    for filter in relation.value_conditions(PRIMARY_ALIAS, &mut condition.params)? {
        condition = condition.and_where(&filter, Params::new());
    }
    if let Some(order) = &relation.order {
        condition = condition.order_raw(order.clone());
    }
    if let Some(limit) = relation.limit {
        condition = condition.limit(limit);
    }
    if let Some(offset) = relation.offset {
        condition = condition.offset(offset);
    }
    Ok(condition.with(nested.iter().cloned()))
}

/// The owner-to-target key pair a follow-up query can batch on
///
/// Only a single one-column equality can be batched; other column
/// predicates depend on the owner row and are rejected.
fn link_for(relation: &RelationDescriptor, owner: &ModelDefinition, target: &ModelDefinition) -> ModelResult<Link> {
    let column_predicates: Vec<&Predicate> = relation
        .predicates()
        .iter()
        .filter(|p| matches!(p, Predicate::ColumnEq { .. } | Predicate::ColumnNe { .. }))
        .collect();

    if relation.kind() == RelationKind::ManyToMany {
        if !column_predicates.is_empty() {
            return Err(unbatchable(relation, owner));
        }
        let link = relation.join_table().ok_or_else(|| {
            ModelError::Configuration(format!(
                "Many-to-many relation '{}' on '{}' has no join table",
                relation.name(),
                owner.name()
            ))
        })?;
        let owner_pk = owner.primary_key().ok_or(ModelError::MissingPrimaryKey)?;
        let target_pk = target.primary_key().ok_or(ModelError::MissingPrimaryKey)?;
        return Ok(Link {
            target_expr: quote_column(VIA_ALIAS, &link.local_column),
            owner_column: owner_pk.to_string(),
            join: Some(format!(
                "INNER JOIN {} AS {} ON ({} = {})",
                quote_table(&link.table),
                quote_identifier(VIA_ALIAS),
                quote_column(VIA_ALIAS, &link.remote_column),
                quote_column(PRIMARY_ALIAS, target_pk)
            )),
        });
    }

    match column_predicates.as_slice() {
        [Predicate::ColumnEq {
            target: ColumnSet::One(target_column),
            owner: ColumnSet::One(owner_column),
        }] => Ok(Link {
            target_expr: quote_column(PRIMARY_ALIAS, target_column),
            owner_column: owner_column.clone(),
            join: None,
        }),
        _ => Err(unbatchable(relation, owner)),
    }
}

fn unbatchable(relation: &RelationDescriptor, owner: &ModelDefinition) -> ModelError {
    ModelError::Relationship(format!(
        "Relation '{}' on '{}' needs exactly one single-column equality to be loaded by a separate query",
        relation.name(),
        owner.name()
    ))
}

/// Definition reached by walking `path` from `root`
fn definition_at(schema: &Schema, root: &Arc<ModelDefinition>, path: &str) -> ModelResult<Arc<ModelDefinition>> {
    let mut current = Arc::clone(root);
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let relation = current.require_relation(segment)?;
        current = schema.model(relation.target())?;
    }
    Ok(current)
}

/// Records at `path` below `models`, following loaded single relations
pub(crate) fn owners_at_path<'a>(models: &'a mut [Model], path: &str) -> Vec<&'a mut Model> {
    let mut current: Vec<&'a mut Model> = models.iter_mut().collect();
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current
            .into_iter()
            .filter_map(|model| match model.relations.get_mut(segment) {
                Some(RelationValue::One(Some(child))) => Some(child.as_mut()),
                _ => None,
            })
            .collect();
    }
    current
}
