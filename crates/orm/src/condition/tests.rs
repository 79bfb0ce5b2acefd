use std::sync::Arc;

use super::*;
use crate::model::ModelDefinition;
use crate::query::JoinType;
use crate::relations::RelationDescriptor;

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new()
            .with(
                ModelDefinition::builder("User", "users")
                    .primary_key("id")
                    .columns(["id", "name", "age", "team_id", "lead_id"])
                    .relation(RelationDescriptor::has_many("posts", "Post").on("user_id", "id"))
                    .relation(
                        RelationDescriptor::belongs_to("team", "Team")
                            .on("id", "team_id")
                            .join_type(JoinType::Inner),
                    )
                    .relation(RelationDescriptor::belongs_to("lead", "User").on("id", "lead_id"))
                    .build()
                    .unwrap(),
            )
            .with(
                ModelDefinition::builder("Post", "posts")
                    .primary_key("id")
                    .columns(["id", "user_id", "title"])
                    .relation(RelationDescriptor::belongs_to("author", "User").on("id", "user_id"))
                    .build()
                    .unwrap(),
            )
            .with(
                ModelDefinition::builder("Team", "teams")
                    .primary_key("id")
                    .columns(["id", "name"])
                    .build()
                    .unwrap(),
            ),
    )
}

fn users() -> Condition {
    Condition::new(schema(), "User").unwrap()
}

#[test]
fn test_operator_is_extracted_from_comparison_value() {
    let condition = users().compare_column("age", ">=18");
    assert_eq!(condition.where_sql(), Some("`t`.`age` >= :ag_age"));
    assert_eq!(condition.params().get("ag_age"), Some(&Value::from("18")));

    let condition = users().compare_column("name", "ann");
    assert_eq!(condition.where_sql(), Some("`t`.`name` = :ag_name"));

    let condition = users().compare_column("age", "<> 3");
    assert_eq!(condition.params().get("ag_age"), Some(&Value::from("3")));
    assert_eq!(condition.where_sql(), Some("`t`.`age` <> :ag_age"));
}

#[test]
fn test_equals_keeps_operator_like_strings() {
    let condition = users().equals("name", ">=x");
    assert_eq!(condition.where_sql(), Some("`t`.`name` = :ag_name"));
    assert_eq!(condition.params().get("ag_name"), Some(&Value::from(">=x")));
}

#[test]
fn test_repeated_comparisons_get_unique_parameters() {
    let condition = users()
        .compare_column("age", ">1")
        .compare_column("age", "<9")
        .compare_column("age", "!=5");

    assert_eq!(condition.params().len(), 3);
    assert_eq!(condition.params().get("ag_age"), Some(&Value::from("1")));
    assert_eq!(condition.params().get("ag_age0"), Some(&Value::from("9")));
    assert_eq!(condition.params().get("ag_age1"), Some(&Value::from("5")));
    assert_eq!(
        condition.where_sql(),
        Some("((`t`.`age` > :ag_age) AND (`t`.`age` < :ag_age0)) AND (`t`.`age` != :ag_age1)")
    );
}

#[test]
fn test_lists_nulls_and_like() {
    let condition = users()
        .compare_column("id", vec![1, 2])
        .compare_column("lead_id", Value::Null)
        .compare_column_like("name", "50%_off");

    assert_eq!(
        condition.where_sql(),
        Some("((`t`.`id` IN (:ag_id, :ag_id0)) AND (`t`.`lead_id` IS NULL)) AND (`t`.`name` LIKE :ag_name)")
    );
    assert_eq!(condition.params().get("ag_name"), Some(&Value::from("%50\\%\\_off%")));

    let nothing = users().compare_column("id", Vec::<i64>::new());
    assert_eq!(nothing.where_sql(), Some("0 = 1"));
}

#[test]
fn test_raw_conditions_rename_colliding_parameters() {
    let condition = users()
        .where_raw("`t`.`age` > :min", Params::new().with("min", 1))
        .or_where("`t`.`age` < :min", Params::new().with("min", 5));

    assert_eq!(condition.where_sql(), Some("(`t`.`age` > :min) OR (`t`.`age` < :min0)"));
    assert_eq!(condition.params().get("min0"), Some(&Value::Int(5)));
}

#[test]
fn test_single_relations_are_joined_and_selected() {
    let mut condition = users().with(["team"]);
    assert_eq!(
        condition.to_select_sql().unwrap(),
        "SELECT `t`.*, `team`.`id` AS `team.id`, `team`.`name` AS `team.name` FROM `users` AS `t` \
         INNER JOIN `teams` AS `team` ON (`team`.`id` = `t`.`team_id`)"
    );
    assert_eq!(condition.planner_state(), PlannerState::MainQueryJoinsComputed);
}

#[test]
fn test_dotted_columns_join_their_path() {
    let mut condition = users().compare_column("posts.author.name", "ann");
    assert_eq!(condition.where_sql(), Some("`posts_author`.`name` = :ag_posts_author_name"));
    assert!(condition.filter_paths().contains("posts.author"));

    let sql = condition.to_select_sql().unwrap();
    assert_eq!(
        sql,
        "SELECT DISTINCT `t`.* FROM `users` AS `t` \
         LEFT JOIN `posts` AS `posts` ON (`posts`.`user_id` = `t`.`id`) \
         LEFT JOIN `users` AS `posts_author` ON (`posts_author`.`id` = `posts`.`user_id`) \
         WHERE `posts_author`.`name` = :ag_posts_author_name"
    );
}

#[test]
fn test_count_with_joined_collection_counts_distinct_keys() {
    let mut condition = users().compare_column("posts.title", "hello");
    assert_eq!(
        condition.to_count_sql().unwrap(),
        "SELECT COUNT(DISTINCT `t`.`id`) FROM `users` AS `t` \
         LEFT JOIN `posts` AS `posts` ON (`posts`.`user_id` = `t`.`id`) \
         WHERE `posts`.`title` = :ag_posts_title"
    );
}

#[test]
fn test_count_keeps_only_required_joins() {
    let mut condition = users().with(["team", "lead"]);
    assert_eq!(
        condition.to_count_sql().unwrap(),
        "SELECT COUNT(*) FROM `users` AS `t` INNER JOIN `teams` AS `team` ON (`team`.`id` = `t`.`team_id`)"
    );

    let mut plain = users().compare_column("age", 30);
    assert_eq!(
        plain.to_count_sql().unwrap(),
        "SELECT COUNT(*) FROM `users` AS `t` WHERE `t`.`age` = :ag_age"
    );
}

#[test]
fn test_grouped_count_counts_groups() {
    let mut condition = users()
        .group_by("team_id")
        .having("COUNT(*) > :n", Params::new().with("n", 1));
    assert_eq!(
        condition.to_count_sql().unwrap(),
        "SELECT COUNT(*) FROM (SELECT `t`.`team_id` FROM `users` AS `t` \
         GROUP BY `t`.`team_id` HAVING COUNT(*) > :n) AS `counted`"
    );
}

#[test]
fn test_fields_order_and_window() {
    let mut condition = users()
        .fields(["id", "name"])
        .order_by("name", OrderDirection::Desc)
        .limit(10)
        .offset(20);
    assert_eq!(
        condition.to_select_sql().unwrap(),
        "SELECT `t`.`id`, `t`.`name` FROM `users` AS `t` ORDER BY `t`.`name` DESC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn test_related_fields_are_aliased_by_path() {
    let mut condition = users().fields(["name", "team.name", "t.age"]);
    assert_eq!(
        condition.to_select_sql().unwrap(),
        "SELECT `t`.`name`, `team`.`name` AS `team.name`, `t`.`age` FROM `users` AS `t` \
         INNER JOIN `teams` AS `team` ON (`team`.`id` = `t`.`team_id`)"
    );
    assert!(condition.filter_paths().contains("team"));
}

#[test]
fn test_unknown_relation_surfaces_at_build_time() {
    let mut condition = users().compare_column("teem.name", "core");
    let err = condition.to_select_sql().unwrap_err();
    assert!(matches!(
        err,
        ModelError::UnknownRelation { ref model, ref relation } if model == "User" && relation == "teem"
    ));

    let mut condition = users().with(["posts", "nope"]);
    assert!(matches!(condition.get_as_query(false), Err(ModelError::UnknownRelation { .. })));

    assert!(Condition::new(schema(), "Ghost").is_err());
}

#[test]
fn test_relation_literals_land_in_query_params() {
    let schema = Arc::new(
        Schema::new()
            .with(
                ModelDefinition::builder("Post", "posts")
                    .primary_key("id")
                    .columns(["id", "title"])
                    .relation(
                        RelationDescriptor::has_one("cover", "Image")
                            .on("post_id", "id")
                            .where_literal("kind", "cover"),
                    )
                    .build()
                    .unwrap(),
            )
            .with(
                ModelDefinition::builder("Image", "images")
                    .primary_key("id")
                    .columns(["id", "post_id", "kind"])
                    .build()
                    .unwrap(),
            ),
    );
    let mut condition = Condition::new(schema, "Post").unwrap().with(["cover"]);
    let query = condition.get_as_query(false).unwrap();
    assert!(query.sql.contains("`cover`.`kind` = :rl_cover_kind"));
    assert_eq!(query.params.get("rl_cover_kind"), Some(&Value::from("cover")));
    assert!(condition.params().is_empty());
}
