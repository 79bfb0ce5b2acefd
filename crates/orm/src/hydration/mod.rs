//! Result hydration
//!
//! Turns one flat driver row of a condition SELECT into a primary record
//! with its joined single-result relations attached. Joined columns arrive
//! aliased as `path.column`; everything before the last dot names the
//! relation path the value belongs to.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::backends::Row;
use crate::model::{Model, ModelDefinition, RelationValue};
use crate::relations::PlannedJoin;
use crate::value::Value;

/// Build the record graph for one row
pub fn hydrate_row(root: &Arc<ModelDefinition>, joins: &[&PlannedJoin], row: Row) -> Model {
    let known: HashMap<&str, &PlannedJoin> = joins.iter().map(|j| (j.path.as_str(), *j)).collect();
    let mut root_values = Vec::new();
    let mut buckets: HashMap<String, Vec<(String, Value)>> = HashMap::new();

    for (column, value) in row {
        match column.rsplit_once('.') {
            Some((path, name)) if known.contains_key(path) => {
                let name = name.to_string();
                buckets.entry(path.to_string()).or_default().push((name, value));
            }
            _ => root_values.push((column, value)),
        }
    }

    let mut built: BTreeMap<String, Option<Model>> = BTreeMap::new();
    for join in joins {
        let values = buckets.remove(&join.path).unwrap_or_default();
        let child = present(&join.target, &values)
            .then(|| Model::from_values(Arc::clone(&join.target), values));
        built.insert(join.path.clone(), child);
    }

    let mut root_model = Model::from_values(Arc::clone(root), root_values);

    // attach deepest first so every child is complete before it moves
    let mut order: Vec<&PlannedJoin> = joins.to_vec();
    order.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.path.cmp(&b.path)));
    for join in order {
        let child = built.remove(&join.path).flatten();
        let name = join.relation.name().to_string();
        let value = RelationValue::One(child.map(Box::new));
        let parent = join.parent_path();
        if parent.is_empty() {
            root_model.relations.insert(name, value);
        } else if let Some(Some(parent_model)) = built.get_mut(parent) {
            parent_model.relations.insert(name, value);
        }
    }

    root_model
}

/// A LEFT JOIN miss comes back as all nulls; the key decides when known
fn present(target: &ModelDefinition, values: &[(String, Value)]) -> bool {
    if let Some(pk) = target.primary_key() {
        if let Some((_, value)) = values.iter().find(|(name, _)| name == pk) {
            return !value.is_null();
        }
    }
    values.iter().any(|(_, value)| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Schema;
    use crate::relations::{classify, RelationDescriptor};
    use std::collections::BTreeSet;

    fn schema() -> (Schema, Arc<ModelDefinition>) {
        let mut schema = Schema::new()
            .with(
                ModelDefinition::builder("Team", "teams")
                    .primary_key("id")
                    .columns(["id", "name", "owner_id"])
                    .relation(RelationDescriptor::belongs_to("owner", "Person").on("id", "owner_id"))
                    .build()
                    .unwrap(),
            )
            .with(
                ModelDefinition::builder("Person", "people")
                    .primary_key("id")
                    .columns(["id", "name"])
                    .build()
                    .unwrap(),
            );
        let user = schema.register(
            ModelDefinition::builder("User", "users")
                .primary_key("id")
                .columns(["id", "name", "team_id"])
                .relation(RelationDescriptor::belongs_to("team", "Team").on("id", "team_id"))
                .build()
                .unwrap(),
        );
        (schema, user)
    }

    #[test]
    fn test_row_without_relations_round_trips() {
        let (_, user) = schema();
        let row = Row::from_pairs([("id", Value::Int(1)), ("name", Value::from("ann")), ("team_id", Value::Null)]);
        let model = hydrate_row(&user, &[], row.clone());
        assert_eq!(model.attributes().len(), 3);
        for (column, value) in row.iter() {
            assert_eq!(model.get(column).unwrap(), value);
        }
        assert!(!model.is_new_record());
    }

    #[test]
    fn test_nested_single_relations_are_attached() {
        let (schema, user) = schema();
        let plan = classify(&schema, &user, &["team.owner".to_string()], &BTreeSet::new()).unwrap();
        let joins: Vec<_> = plan.selected_joins().collect();

        let row = Row::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::from("ann")),
            ("team_id", Value::Int(9)),
            ("team.id", Value::Int(9)),
            ("team.name", Value::from("core")),
            ("team.owner_id", Value::Int(3)),
            ("team.owner.id", Value::Int(3)),
            ("team.owner.name", Value::from("bob")),
        ]);
        let model = hydrate_row(&user, &joins, row);

        let team = model.related_one("team").unwrap().unwrap();
        assert_eq!(team.get("name").unwrap(), &Value::from("core"));
        let owner = team.related_one("owner").unwrap().unwrap();
        assert_eq!(owner.get("name").unwrap(), &Value::from("bob"));
        assert_eq!(model.attributes().len(), 3);
    }

    #[test]
    fn test_missing_join_yields_empty_relation() {
        let (schema, user) = schema();
        let plan = classify(&schema, &user, &["team".to_string()], &BTreeSet::new()).unwrap();
        let joins: Vec<_> = plan.selected_joins().collect();

        let row = Row::from_pairs([
            ("id", Value::Int(2)),
            ("team.id", Value::Null),
            ("team.name", Value::Null),
            ("team.owner_id", Value::Null),
        ]);
        let model = hydrate_row(&user, &joins, row);
        assert!(model.is_relation_loaded("team"));
        assert!(model.related_one("team").unwrap().is_none());
    }
}
