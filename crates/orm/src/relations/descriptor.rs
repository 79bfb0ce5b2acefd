//! Relation descriptors
//!
//! A [`RelationDescriptor`] declares one association from an owner model to
//! a target model and renders the JOIN that connects them.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::model::ModelDefinition;
use crate::query::JoinType;
use crate::sql::{param_safe, quote_column, quote_identifier, quote_table, Params};
use crate::value::Value;

/// Cardinality of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl RelationKind {
    /// At most one related record per owner
    pub fn is_single(self) -> bool {
        matches!(self, RelationKind::BelongsTo | RelationKind::HasOne)
    }
}

/// One column or several, compared pairwise or by membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSet {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for ColumnSet {
    fn from(column: &str) -> Self {
        ColumnSet::One(column.to_string())
    }
}

impl From<String> for ColumnSet {
    fn from(column: String) -> Self {
        ColumnSet::One(column)
    }
}

impl<S: Into<String>> From<Vec<S>> for ColumnSet {
    fn from(columns: Vec<S>) -> Self {
        ColumnSet::Many(columns.into_iter().map(Into::into).collect())
    }
}

/// A single ON-clause term
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Target column(s) equal owner column(s)
    ColumnEq { target: ColumnSet, owner: ColumnSet },
    /// Target column(s) differ from owner column(s)
    ColumnNe { target: ColumnSet, owner: ColumnSet },
    /// Target column equals a constant
    Literal { column: String, value: Value },
    /// Target column equals a per-owner-type discriminator supplied at declaration
    Discriminator { column: String, value: Value },
}

/// Link table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    /// Column of the link table pointing at the owner's primary key
    pub local_column: String,
    /// Column of the link table pointing at the target's primary key
    pub remote_column: String,
}

/// Declared association between two models
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDescriptor {
    pub(crate) name: String,
    pub(crate) kind: RelationKind,
    pub(crate) target: String,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) join_type: JoinType,
    pub(crate) order: Option<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) join_table: Option<JoinTable>,
}

impl RelationDescriptor {
    pub fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            predicates: Vec::new(),
            join_type: JoinType::default(),
            order: None,
            limit: None,
            offset: None,
            join_table: None,
        }
    }

    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::BelongsTo, target)
    }

    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasOne, target)
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasMany, target)
    }

    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::ManyToMany, target)
    }

    /// `target.target_column = owner.owner_column`
    pub fn on(self, target_column: impl Into<ColumnSet>, owner_column: impl Into<ColumnSet>) -> Self {
        self.predicate(Predicate::ColumnEq {
            target: target_column.into(),
            owner: owner_column.into(),
        })
    }

    /// `target.target_column <> owner.owner_column`
    pub fn not_on(self, target_column: impl Into<ColumnSet>, owner_column: impl Into<ColumnSet>) -> Self {
        self.predicate(Predicate::ColumnNe {
            target: target_column.into(),
            owner: owner_column.into(),
        })
    }

    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Restrict the target to rows where `column` equals `value`
    pub fn where_literal(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicate(Predicate::Literal {
            column: column.into(),
            value: value.into(),
        })
    }

    /// Restrict the target by a type discriminator of the owner model
    pub fn discriminator(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicate(Predicate::Discriminator {
            column: column.into(),
            value: value.into(),
        })
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    /// Raw ORDER BY used when the relation is loaded by a separate query
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Link table for a many-to-many relation
    pub fn through(
        mut self,
        table: impl Into<String>,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        self.join_table = Some(JoinTable {
            table: table.into(),
            local_column: local_column.into(),
            remote_column: remote_column.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Name of the target model
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn get_join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn join_table(&self) -> Option<&JoinTable> {
        self.join_table.as_ref()
    }

    pub fn has_single_result(&self) -> bool {
        self.kind.is_single()
    }

    /// Alias of the link table joined for `alias`
    pub fn via_alias(alias: &str) -> String {
        format!("{}__via", alias)
    }

    /// JOIN fragment attaching the target as `alias` to the owner at `owner_alias`
    ///
    /// Many-to-many relations emit the link-table join first. Literal and
    /// discriminator values are bound into `params`.
    pub fn join_sql(
        &self,
        owner: &ModelDefinition,
        target: &ModelDefinition,
        owner_alias: &str,
        alias: &str,
        params: &mut Params,
    ) -> ModelResult<String> {
        let mut conditions = Vec::new();
        let mut sql = String::new();

        if self.kind == RelationKind::ManyToMany {
            let link = self.join_table.as_ref().ok_or_else(|| {
                ModelError::Configuration(format!(
                    "Many-to-many relation '{}' on '{}' has no join table",
                    self.name,
                    owner.name()
                ))
            })?;
            let owner_pk = required_primary_key(owner, &self.name)?;
            let target_pk = required_primary_key(target, &self.name)?;
            let via = Self::via_alias(alias);

            sql.push_str(&format!(
                "{} {} AS {} ON ({} = {}) ",
                self.join_type,
                quote_table(&link.table),
                quote_identifier(&via),
                quote_column(&via, &link.local_column),
                quote_column(owner_alias, owner_pk)
            ));
            conditions.push(format!(
                "{} = {}",
                quote_column(alias, target_pk),
                quote_column(&via, &link.remote_column)
            ));
        }

        conditions.extend(self.column_conditions(owner_alias, alias)?);
        conditions.extend(self.value_conditions(alias, params)?);
        if conditions.is_empty() {
            conditions.push("1 = 1".to_string());
        }

        sql.push_str(&format!(
            "{} {} AS {} ON ({})",
            self.join_type,
            quote_table(target.table()),
            quote_identifier(alias),
            conditions.join(" AND ")
        ));
        Ok(sql)
    }

    /// Rendered column-to-column predicates
    pub(crate) fn column_conditions(&self, owner_alias: &str, alias: &str) -> ModelResult<Vec<String>> {
        let mut conditions = Vec::new();
        for predicate in &self.predicates {
            let (target, owner, negated) = match predicate {
                Predicate::ColumnEq { target, owner } => (target, owner, false),
                Predicate::ColumnNe { target, owner } => (target, owner, true),
                _ => continue,
            };
            conditions.push(self.render_columns(target, owner, negated, owner_alias, alias)?);
        }
        Ok(conditions)
    }

    /// Rendered literal and discriminator predicates on `alias`
    pub(crate) fn value_conditions(&self, alias: &str, params: &mut Params) -> ModelResult<Vec<String>> {
        let mut conditions = Vec::new();
        for predicate in &self.predicates {
            let (column, value, prefix) = match predicate {
                Predicate::Literal { column, value } => (column, value, "rl"),
                Predicate::Discriminator { column, value } => (column, value, "rd"),
                _ => continue,
            };
            let quoted = quote_column(alias, column);
            let base = format!("{}_{}_{}", prefix, param_safe(alias), param_safe(column));
            let condition = match value {
                Value::Null => format!("{} IS NULL", quoted),
                Value::List(items) if items.is_empty() => "0 = 1".to_string(),
                Value::List(items) => {
                    let mut names = Vec::with_capacity(items.len());
                    for item in items {
                        names.push(format!(":{}", params.bind_unique(&base, item.clone())?));
                    }
                    format!("{} IN ({})", quoted, names.join(", "))
                }
                scalar => format!("{} = :{}", quoted, params.bind_unique(&base, scalar.clone())?),
            };
            conditions.push(condition);
        }
        Ok(conditions)
    }

    fn render_columns(
        &self,
        target: &ColumnSet,
        owner: &ColumnSet,
        negated: bool,
        owner_alias: &str,
        alias: &str,
    ) -> ModelResult<String> {
        let operator = if negated { "<>" } else { "=" };
        let membership = if negated { "NOT IN" } else { "IN" };

        match (target, owner) {
            (ColumnSet::One(t), ColumnSet::One(o)) => Ok(format!(
                "{} {} {}",
                quote_column(alias, t),
                operator,
                quote_column(owner_alias, o)
            )),
            (ColumnSet::Many(ts), ColumnSet::Many(os)) => {
                if ts.is_empty() || ts.len() != os.len() {
                    return Err(ModelError::Configuration(format!(
                        "Relation '{}' compares {} target columns with {} owner columns",
                        self.name,
                        ts.len(),
                        os.len()
                    )));
                }
                let pairs: Vec<String> = ts
                    .iter()
                    .zip(os)
                    .map(|(t, o)| format!("{} {} {}", quote_column(alias, t), operator, quote_column(owner_alias, o)))
                    .collect();
                Ok(format!("({})", pairs.join(" OR ")))
            }
            (ColumnSet::One(t), ColumnSet::Many(os)) => {
                let owners = self.column_list(owner_alias, os)?;
                Ok(format!("{} {} ({})", quote_column(alias, t), membership, owners))
            }
            (ColumnSet::Many(ts), ColumnSet::One(o)) => {
                let targets = self.column_list(alias, ts)?;
                Ok(format!("{} {} ({})", quote_column(owner_alias, o), membership, targets))
            }
        }
    }

    fn column_list(&self, alias: &str, columns: &[String]) -> ModelResult<String> {
        if columns.is_empty() {
            return Err(ModelError::Configuration(format!(
                "Relation '{}' has an empty column list",
                self.name
            )));
        }
        Ok(columns
            .iter()
            .map(|c| quote_column(alias, c))
            .collect::<Vec<_>>()
            .join(", "))
    }
}

fn required_primary_key<'a>(definition: &'a ModelDefinition, relation: &str) -> ModelResult<&'a str> {
    definition.primary_key().ok_or_else(|| {
        ModelError::Configuration(format!(
            "Relation '{}' needs a primary key on model '{}'",
            relation,
            definition.name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, table: &str) -> ModelDefinition {
        ModelDefinition::builder(name, table)
            .primary_key("id")
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_result_kinds() {
        assert!(RelationDescriptor::belongs_to("author", "User").has_single_result());
        assert!(RelationDescriptor::has_one("profile", "Profile").has_single_result());
        assert!(!RelationDescriptor::has_many("posts", "Post").has_single_result());
        assert!(!RelationDescriptor::many_to_many("tags", "Tag").has_single_result());
    }

    #[test]
    fn test_column_equality_join() {
        let user = definition("User", "users");
        let post = definition("Post", "posts");
        let relation = RelationDescriptor::has_many("posts", "Post").on("user_id", "id");
        let mut params = Params::new();

        let sql = relation.join_sql(&user, &post, "t", "posts", &mut params).unwrap();
        assert_eq!(sql, "LEFT JOIN `posts` AS `posts` ON (`posts`.`user_id` = `t`.`id`)");
        assert!(params.is_empty());
    }

    #[test]
    fn test_pairwise_and_membership_predicates() {
        let owner = definition("Message", "messages");
        let target = definition("User", "users");
        let mut params = Params::new();

        let pairwise = RelationDescriptor::belongs_to("party", "User").on(vec!["id", "alt_id"], vec!["sender_id", "receiver_id"]);
        let sql = pairwise.join_sql(&owner, &target, "t", "party", &mut params).unwrap();
        assert!(sql.ends_with("ON ((`party`.`id` = `t`.`sender_id` OR `party`.`alt_id` = `t`.`receiver_id`))"));

        let membership = RelationDescriptor::belongs_to("party", "User")
            .join_type(JoinType::Inner)
            .not_on("id", vec!["sender_id", "receiver_id"]);
        let sql = membership.join_sql(&owner, &target, "t", "party", &mut params).unwrap();
        assert_eq!(
            sql,
            "INNER JOIN `users` AS `party` ON (`party`.`id` NOT IN (`t`.`sender_id`, `t`.`receiver_id`))"
        );

        let broken = RelationDescriptor::belongs_to("party", "User").on(vec!["id"], vec!["a", "b"]);
        assert!(matches!(
            broken.join_sql(&owner, &target, "t", "party", &mut params),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_literals_and_discriminators_are_bound() {
        let owner = definition("Post", "posts");
        let target = definition("Comment", "comments");
        let relation = RelationDescriptor::has_many("comments", "Comment")
            .on("commentable_id", "id")
            .discriminator("commentable_type", "post")
            .where_literal("approved", true)
            .where_literal("deleted_at", Value::Null);
        let mut params = Params::new();

        let sql = relation.join_sql(&owner, &target, "t", "comments", &mut params).unwrap();
        assert_eq!(
            sql,
            "LEFT JOIN `comments` AS `comments` ON (`comments`.`commentable_id` = `t`.`id` \
             AND `comments`.`commentable_type` = :rd_comments_commentable_type \
             AND `comments`.`approved` = :rl_comments_approved \
             AND `comments`.`deleted_at` IS NULL)"
        );
        assert_eq!(params.get("rd_comments_commentable_type"), Some(&Value::from("post")));
        assert_eq!(params.get("rl_comments_approved"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_many_to_many_joins_link_table_first() {
        let post = definition("Post", "posts");
        let tag = definition("Tag", "tags");
        let relation = RelationDescriptor::many_to_many("tags", "Tag")
            .through("post_tags", "post_id", "tag_id")
            .join_type(JoinType::Inner);
        let mut params = Params::new();

        let sql = relation.join_sql(&post, &tag, "t", "tags", &mut params).unwrap();
        assert_eq!(
            sql,
            "INNER JOIN `post_tags` AS `tags__via` ON (`tags__via`.`post_id` = `t`.`id`) \
             INNER JOIN `tags` AS `tags` ON (`tags`.`id` = `tags__via`.`tag_id`)"
        );

        let missing = RelationDescriptor::many_to_many("tags", "Tag");
        assert!(missing.join_sql(&post, &tag, "t", "tags", &mut params).is_err());
    }

    #[test]
    fn test_relation_without_predicates_joins_unconditionally() {
        let owner = definition("User", "users");
        let target = definition("Setting", "settings");
        let relation = RelationDescriptor::has_one("settings", "Setting");
        let mut params = Params::new();
        let sql = relation.join_sql(&owner, &target, "t", "settings", &mut params).unwrap();
        assert!(sql.ends_with("ON (1 = 1)"));
    }
}
