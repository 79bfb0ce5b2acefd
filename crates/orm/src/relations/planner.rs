//! Relation planning
//!
//! Decides, for a model and a list of requested relation paths, which
//! relations are joined into the main SELECT and which are loaded by a
//! separate batched query after the main rows are hydrated.
//!
//! A segment is joined and selected when it yields at most one row per
//! owner. The first collection segment of a path stops the walk: it and
//! everything below it are deferred. Paths referenced by the filter are
//! always joined (collections unselected) so the WHERE clause can see them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::descriptor::RelationDescriptor;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelDefinition, Schema};
use crate::sql::{Params, PRIMARY_ALIAS};

/// Where a planner is in the life of its condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlannerState {
    #[default]
    Unparsed,
    Parsed,
    MainQueryJoinsComputed,
    ExtraQueriesComputed,
    Done,
}

/// A relation joined into the main query
#[derive(Debug, Clone)]
pub struct PlannedJoin {
    /// Dot path from the primary model, e.g. `author.team`
    pub path: String,
    pub alias: String,
    pub owner_alias: String,
    pub owner: Arc<ModelDefinition>,
    pub target: Arc<ModelDefinition>,
    pub relation: RelationDescriptor,
    /// Target columns are projected and hydrated
    pub selected: bool,
    /// Referenced by WHERE, HAVING or ORDER
    pub for_filter: bool,
}

impl PlannedJoin {
    pub fn is_single(&self) -> bool {
        self.relation.has_single_result()
    }

    /// Number of segments in the path
    pub fn depth(&self) -> usize {
        self.path.split('.').count()
    }

    pub fn parent_path(&self) -> &str {
        self.path.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("")
    }

    pub fn join_sql(&self, params: &mut Params) -> ModelResult<String> {
        self.relation
            .join_sql(&self.owner, &self.target, &self.owner_alias, &self.alias, params)
    }
}

/// A relation loaded by a follow-up query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRelation {
    /// Path of the owning records, empty for the primary model
    pub owner_path: String,
    pub relation: String,
    /// Relation paths requested below the deferred one, relative to its target
    pub nested: Vec<String>,
}

impl DeferredRelation {
    pub fn full_path(&self) -> String {
        if self.owner_path.is_empty() {
            self.relation.clone()
        } else {
            format!("{}.{}", self.owner_path, self.relation)
        }
    }
}

/// Result of classifying the requested relations of one condition
#[derive(Debug, Clone, Default)]
pub struct RelationPlan {
    pub joins: Vec<PlannedJoin>,
    pub deferred: Vec<DeferredRelation>,
}

impl RelationPlan {
    /// Joins whose columns are projected, in join order
    pub fn selected_joins(&self) -> impl Iterator<Item = &PlannedJoin> {
        self.joins.iter().filter(|j| j.selected)
    }

    /// A collection relation is joined, so primary rows may repeat
    pub fn has_collection_join(&self) -> bool {
        self.joins.iter().any(|j| !j.is_single())
    }

    /// Joins a COUNT needs: filter-referenced or INNER ones, plus their ancestors
    pub fn count_joins(&self) -> Vec<&PlannedJoin> {
        let mut needed = BTreeSet::new();
        for join in &self.joins {
            if join.for_filter || join.relation.get_join_type().is_inner() {
                let mut path = join.path.as_str();
                loop {
                    needed.insert(path.to_string());
                    match path.rsplit_once('.') {
                        Some((parent, _)) => path = parent,
                        None => break,
                    }
                }
            }
        }
        self.joins.iter().filter(|j| needed.contains(&j.path)).collect()
    }
}

/// Cached classification owned by a condition
#[derive(Debug, Clone, Default)]
pub struct RelationPlanner {
    state: PlannerState,
    plan: Option<Arc<RelationPlan>>,
}

impl RelationPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// Forget the plan; the next request reclassifies
    pub fn reset(&mut self) {
        self.state = PlannerState::Unparsed;
        self.plan = None;
    }

    /// The cached plan, classifying on first use
    pub fn plan(
        &mut self,
        schema: &Schema,
        root: &Arc<ModelDefinition>,
        requested: &[String],
        filter_paths: &BTreeSet<String>,
    ) -> ModelResult<Arc<RelationPlan>> {
        if let Some(plan) = &self.plan {
            return Ok(Arc::clone(plan));
        }
        let plan = Arc::new(classify(schema, root, requested, filter_paths)?);
        self.plan = Some(Arc::clone(&plan));
        self.state = PlannerState::Parsed;
        Ok(plan)
    }

    pub fn mark_joins_computed(&mut self) {
        if self.state == PlannerState::Parsed {
            self.state = PlannerState::MainQueryJoinsComputed;
        }
    }

    pub fn mark_extra_queries_computed(&mut self) {
        self.state = PlannerState::ExtraQueriesComputed;
    }

    pub fn mark_done(&mut self) {
        self.state = PlannerState::Done;
    }
}

/// Partition `requested` into joined and deferred relations
///
/// A pure function of the declarations, the requested paths and the
/// filter-referenced paths.
pub fn classify(
    schema: &Schema,
    root: &Arc<ModelDefinition>,
    requested: &[String],
    filter_paths: &BTreeSet<String>,
) -> ModelResult<RelationPlan> {
    let mut builder = PlanBuilder {
        schema,
        root,
        filter_paths,
        joins: Vec::new(),
        by_path: HashMap::new(),
        alias_owner: HashMap::new(),
        deferred: BTreeMap::new(),
        deferred_order: Vec::new(),
    };

    for path in requested {
        builder.walk_requested(path)?;
    }
    for path in filter_paths.iter() {
        builder.walk_filter(path)?;
    }

    let deferred = builder
        .deferred_order
        .iter()
        .filter_map(|key| builder.deferred.remove(key))
        .collect();
    Ok(RelationPlan {
        joins: builder.joins,
        deferred,
    })
}

struct PlanBuilder<'a> {
    schema: &'a Schema,
    root: &'a Arc<ModelDefinition>,
    filter_paths: &'a BTreeSet<String>,
    joins: Vec<PlannedJoin>,
    by_path: HashMap<String, usize>,
    alias_owner: HashMap<String, String>,
    deferred: BTreeMap<(String, String), DeferredRelation>,
    deferred_order: Vec<(String, String)>,
}

impl PlanBuilder<'_> {
    fn walk_requested(&mut self, path: &str) -> ModelResult<()> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let mut owner = Arc::clone(self.root);
        let mut owner_path = String::new();

        for (index, segment) in segments.iter().enumerate() {
            let relation = owner.require_relation(segment)?.clone();
            let target = self.schema.model(relation.target())?;
            let current = join_path(&owner_path, segment);

            if relation.has_single_result() {
                self.ensure_join(&current, &owner_path, &owner, &target, &relation, true, false)?;
            } else {
                if self.is_filter_referenced(&current) {
                    self.ensure_join(&current, &owner_path, &owner, &target, &relation, false, true)?;
                }
                let nested = segments[index + 1..].join(".");
                self.defer(&owner_path, segment, nested);
                return Ok(());
            }

            owner = target;
            owner_path = current;
        }
        Ok(())
    }

    fn walk_filter(&mut self, path: &str) -> ModelResult<()> {
        let mut owner = Arc::clone(self.root);
        let mut owner_path = String::new();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            let relation = owner.require_relation(segment)?.clone();
            let target = self.schema.model(relation.target())?;
            let current = join_path(&owner_path, segment);
            self.ensure_join(&current, &owner_path, &owner, &target, &relation, false, true)?;
            owner = target;
            owner_path = current;
        }
        Ok(())
    }

    fn is_filter_referenced(&self, path: &str) -> bool {
        let prefix = format!("{}.", path);
        self.filter_paths
            .iter()
            .any(|p| p == path || p.starts_with(&prefix))
    }

    #[allow(clippy::too_many_arguments)]
    fn ensure_join(
        &mut self,
        path: &str,
        owner_path: &str,
        owner: &Arc<ModelDefinition>,
        target: &Arc<ModelDefinition>,
        relation: &RelationDescriptor,
        selected: bool,
        for_filter: bool,
    ) -> ModelResult<()> {
        if let Some(&index) = self.by_path.get(path) {
            let join = &mut self.joins[index];
            join.selected |= selected && join.is_single();
            join.for_filter |= for_filter;
            return Ok(());
        }

        let alias = path.replace('.', "_");
        if alias == PRIMARY_ALIAS {
            return Err(ModelError::AliasCollision {
                alias,
                first: "<primary table>".to_string(),
                second: path.to_string(),
            });
        }
        if let Some(existing) = self.alias_owner.get(&alias) {
            return Err(ModelError::AliasCollision {
                alias,
                first: existing.clone(),
                second: path.to_string(),
            });
        }

        let owner_alias = if owner_path.is_empty() {
            PRIMARY_ALIAS.to_string()
        } else {
            owner_path.replace('.', "_")
        };
        self.alias_owner.insert(alias.clone(), path.to_string());
        self.by_path.insert(path.to_string(), self.joins.len());
        self.joins.push(PlannedJoin {
            path: path.to_string(),
            alias,
            owner_alias,
            owner: Arc::clone(owner),
            target: Arc::clone(target),
            relation: relation.clone(),
            selected,
            for_filter,
        });
        Ok(())
    }

    fn defer(&mut self, owner_path: &str, relation: &str, nested: String) {
        let key = (owner_path.to_string(), relation.to_string());
        let entry = self.deferred.entry(key.clone()).or_insert_with(|| DeferredRelation {
            owner_path: owner_path.to_string(),
            relation: relation.to_string(),
            nested: Vec::new(),
        });
        if !nested.is_empty() && !entry.nested.contains(&nested) {
            entry.nested.push(nested);
        }
        if !self.deferred_order.contains(&key) {
            self.deferred_order.push(key);
        }
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::JoinType;

    fn schema() -> (Schema, Arc<ModelDefinition>) {
        let mut schema = Schema::new()
            .with(
                ModelDefinition::builder("Post", "posts")
                    .primary_key("id")
                    .relation(RelationDescriptor::belongs_to("author", "User").on("id", "user_id"))
                    .relation(RelationDescriptor::has_many("comments", "Comment").on("post_id", "id"))
                    .build()
                    .unwrap(),
            )
            .with(ModelDefinition::builder("Team", "teams").primary_key("id").build().unwrap())
            .with(ModelDefinition::builder("Comment", "comments").primary_key("id").build().unwrap());
        let user = schema.register(
            ModelDefinition::builder("User", "users")
                .primary_key("id")
                .relation(RelationDescriptor::has_many("posts", "Post").on("user_id", "id"))
                .relation(
                    RelationDescriptor::belongs_to("team", "Team")
                        .on("id", "team_id")
                        .join_type(JoinType::Inner),
                )
                .relation(RelationDescriptor::belongs_to("team_lead", "User").on("id", "lead_id"))
                .build()
                .unwrap(),
        );
        (schema, user)
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_relations_are_joined_and_collections_deferred() {
        let (schema, user) = schema();
        let plan = classify(&schema, &user, &paths(&["team", "posts.author", "posts.comments"]), &BTreeSet::new()).unwrap();

        let joined: Vec<_> = plan.joins.iter().map(|j| (j.path.as_str(), j.selected)).collect();
        assert_eq!(joined, vec![("team", true)]);
        assert_eq!(
            plan.deferred,
            vec![DeferredRelation {
                owner_path: String::new(),
                relation: "posts".to_string(),
                nested: vec!["author".to_string(), "comments".to_string()],
            }]
        );
        assert!(!plan.has_collection_join());
    }

    #[test]
    fn test_filter_referenced_collections_are_joined_unselected() {
        let (schema, user) = schema();
        let filter: BTreeSet<String> = ["posts".to_string()].into_iter().collect();
        let plan = classify(&schema, &user, &paths(&["posts"]), &filter).unwrap();

        assert_eq!(plan.joins.len(), 1);
        assert!(!plan.joins[0].selected);
        assert!(plan.joins[0].for_filter);
        assert_eq!(plan.deferred.len(), 1);
        assert!(plan.has_collection_join());
    }

    #[test]
    fn test_nested_filter_paths_join_every_prefix() {
        let (schema, user) = schema();
        let filter: BTreeSet<String> = ["posts.author".to_string()].into_iter().collect();
        let plan = classify(&schema, &user, &[], &filter).unwrap();
        let aliases: Vec<_> = plan.joins.iter().map(|j| (j.alias.as_str(), j.owner_alias.as_str())).collect();
        assert_eq!(aliases, vec![("posts", "t"), ("posts_author", "posts")]);
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn test_count_joins_keep_filter_and_inner_relations() {
        let (schema, user) = schema();
        let plan = classify(&schema, &user, &paths(&["team", "team_lead"]), &BTreeSet::new()).unwrap();
        let counted: Vec<_> = plan.count_joins().into_iter().map(|j| j.path.as_str()).collect();
        assert_eq!(counted, vec!["team"]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let (schema, user) = schema();
        let requested = paths(&["posts.comments", "team", "team_lead"]);
        let filter: BTreeSet<String> = ["team_lead".to_string()].into_iter().collect();
        let first = classify(&schema, &user, &requested, &filter).unwrap();
        let second = classify(&schema, &user, &requested, &filter).unwrap();
        let summary = |plan: &RelationPlan| {
            plan.joins
                .iter()
                .map(|j| (j.path.clone(), j.selected, j.for_filter))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.deferred, second.deferred);
    }

    #[test]
    fn test_unknown_segments_and_alias_collisions() {
        let (schema, user) = schema();
        let err = classify(&schema, &user, &paths(&["posts.autor"]), &BTreeSet::new());
        assert!(err.is_ok(), "segments below a deferred relation are resolved by the follow-up query");

        let err = classify(&schema, &user, &paths(&["teem"]), &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, ModelError::UnknownRelation { ref relation, .. } if relation == "teem"));

        // `team_lead` and `team.lead` would both become alias `team_lead`
        let mut schema = schema;
        schema.register(
            ModelDefinition::builder("Team", "teams")
                .primary_key("id")
                .relation(RelationDescriptor::belongs_to("lead", "User").on("id", "lead_id"))
                .build()
                .unwrap(),
        );
        let err = classify(&schema, &user, &paths(&["team_lead", "team.lead"]), &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, ModelError::AliasCollision { ref alias, .. } if alias == "team_lead"));
    }

    #[test]
    fn test_planner_caches_until_reset() {
        let (schema, user) = schema();
        let mut planner = RelationPlanner::new();
        assert_eq!(planner.state(), PlannerState::Unparsed);
        let first = planner.plan(&schema, &user, &paths(&["team"]), &BTreeSet::new()).unwrap();
        let second = planner.plan(&schema, &user, &[], &BTreeSet::new()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(planner.state(), PlannerState::Parsed);
        planner.mark_joins_computed();
        assert_eq!(planner.state(), PlannerState::MainQueryJoinsComputed);
        planner.reset();
        assert_eq!(planner.state(), PlannerState::Unparsed);
    }
}
