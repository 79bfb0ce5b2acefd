use std::sync::Arc;

use super::*;
use crate::backends::{ExecOutcome, MockDriver, Row};
use crate::connection::Connection;
use crate::sql::Params;
use crate::value::Value;
use tessera_core::DatabaseConfig;

fn connection(driver: &MockDriver) -> Connection {
    Connection::with_driver(DatabaseConfig::new("mysql://localhost/app"), Arc::new(driver.clone()))
}

#[test]
fn test_where_conditions_are_parenthesized_and_kept() {
    let query = QueryBuilder::table("users")
        .where_raw("a = :a", Params::new().with("a", 1))
        .and_where("b = :b", Params::new().with("b", 2))
        .or_where("c = :a", Params::new().with("a", 3));

    assert_eq!(
        query.to_select_sql(),
        "SELECT * FROM `users` WHERE ((a = :a) AND (b = :b)) OR (c = :a0)"
    );
    assert_eq!(query.params().get("a"), Some(&Value::Int(1)));
    assert_eq!(query.params().get("a0"), Some(&Value::Int(3)));
}

#[test]
fn test_compare_lists_scalars_and_nulls() {
    let query = QueryBuilder::table("users").compare([
        ("id", Value::from(vec![1, 2])),
        ("status", Value::from("active")),
        ("deleted_at", Value::Null),
    ]);

    assert_eq!(
        query.where_sql(),
        Some("`id` IN (:_compare_0_id_0, :_compare_0_id_1) AND `status` = :_compare_1_status AND `deleted_at` IS NULL")
    );
    assert_eq!(query.params().get("_compare_0_id_1"), Some(&Value::Int(2)));
}

#[test]
fn test_compare_empty_list_matches_nothing() {
    let query = QueryBuilder::table("users").compare([("id", Vec::<i64>::new())]);
    assert_eq!(query.where_sql(), Some("0 = 1"));
}

#[test]
fn test_select_clauses_in_order() {
    let query = QueryBuilder::table("posts")
        .alias("p")
        .select(["`p`.`user_id`", "COUNT(*) AS `n`"])
        .join("LEFT JOIN `users` AS `u` ON (`u`.`id` = `p`.`user_id`)")
        .where_raw("`u`.`active` = :on", Params::new().with("on", true))
        .group_by("p.user_id")
        .having("COUNT(*) > :min", Params::new().with("min", 2))
        .order_by("n", OrderDirection::Desc)
        .limit(10)
        .offset(20);

    assert_eq!(
        query.to_select_sql(),
        "SELECT `p`.`user_id`, COUNT(*) AS `n` FROM `posts` AS `p` \
         LEFT JOIN `users` AS `u` ON (`u`.`id` = `p`.`user_id`) \
         WHERE `u`.`active` = :on GROUP BY `p`.`user_id` HAVING COUNT(*) > :min \
         ORDER BY `n` DESC LIMIT 10 OFFSET 20"
    );
    assert!(query.to_count_sql().starts_with("SELECT COUNT(*) FROM (SELECT `p`.`user_id`"));
}

#[test]
fn test_paginate_clamps_huge_pages() {
    let query = QueryBuilder::table("users").paginate(20, 3);
    assert_eq!(query.to_select_sql(), "SELECT * FROM `users` LIMIT 20 OFFSET 40");

    let query = QueryBuilder::table("users").paginate(20, 0);
    assert_eq!(query.to_select_sql(), "SELECT * FROM `users` LIMIT 20");

    let query = QueryBuilder::table("users").paginate(u64::MAX, u64::MAX);
    assert_eq!(
        query.to_select_sql(),
        format!("SELECT * FROM `users` LIMIT {0} OFFSET {0}", u64::MAX)
    );
}

#[test]
fn test_insert_sql_variants() {
    let query = QueryBuilder::table("users");
    let (sql, params) = query
        .to_insert_sql([("name", "ann"), ("email", "a@x")], &OnDuplicate::Error)
        .unwrap();
    assert_eq!(
        sql,
        "INSERT INTO `users` (`name`, `email`) VALUES (:_insert_name, :_insert_email)"
    );
    assert_eq!(params.len(), 2);

    let (sql, _) = query.to_insert_sql([("name", "ann")], &OnDuplicate::Ignore).unwrap();
    assert!(sql.starts_with("INSERT IGNORE INTO `users`"));

    let (sql, params) = query
        .to_insert_sql([("name", "ann")], &OnDuplicate::update([("name", "bob")]))
        .unwrap();
    assert!(sql.ends_with("ON DUPLICATE KEY UPDATE `name` = :_upsert_name"));
    assert_eq!(params.get("_upsert_name"), Some(&Value::from("bob")));
}

#[test]
fn test_update_and_delete_respect_limit() {
    let query = QueryBuilder::table("users")
        .where_raw("id > :min", Params::new().with("min", 5))
        .limit(3);

    let (sql, params) = query.to_update_sql([("name", "x")]).unwrap();
    assert_eq!(sql, "UPDATE `users` SET `name` = :_update_name WHERE id > :min LIMIT 3");
    assert_eq!(params.len(), 2);
    assert_eq!(query.to_delete_sql(), "DELETE FROM `users` WHERE id > :min LIMIT 3");

    let aliased = QueryBuilder::table("users").alias("u").limit(3);
    assert_eq!(aliased.to_delete_sql(), "DELETE `u` FROM `users` AS `u`");
}

#[tokio::test]
async fn test_insert_returns_generated_id() {
    let driver = MockDriver::new();
    driver.on_execute("INSERT INTO `users`", ExecOutcome::inserted(1, 42));
    driver.on_execute("INSERT IGNORE", ExecOutcome::affected(0));
    let conn = connection(&driver);

    let id = QueryBuilder::table("users")
        .insert(&conn, [("name", "ann")], OnDuplicate::Error)
        .await
        .unwrap();
    assert_eq!(id, Some(42));

    let ignored = QueryBuilder::table("users")
        .insert(&conn, [("name", "ann")], OnDuplicate::Ignore)
        .await
        .unwrap();
    assert_eq!(ignored, None);
}

#[tokio::test]
async fn test_update_without_columns_issues_nothing() {
    let driver = MockDriver::new();
    let conn = connection(&driver);
    let affected = QueryBuilder::table("users")
        .update(&conn, Vec::<(String, Value)>::new())
        .await
        .unwrap();
    assert_eq!(affected, 0);
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn test_next_walks_rows_until_limit() {
    let driver = MockDriver::new();
    driver.on_query("LIMIT 1", vec![Row::from_pairs([("id", 1)])]);
    driver.on_query("LIMIT 1 OFFSET 1", vec![Row::from_pairs([("id", 2)])]);
    driver.on_query("LIMIT 1 OFFSET 2", vec![Row::from_pairs([("id", 3)])]);
    let conn = connection(&driver);

    let mut query = QueryBuilder::table("users").limit(2);
    let first = query.next(&conn).await.unwrap().unwrap();
    let second = query.next(&conn).await.unwrap().unwrap();
    assert_eq!(first.get("id"), Some(&Value::Int(1)));
    assert_eq!(second.get("id"), Some(&Value::Int(2)));
    assert!(query.next(&conn).await.unwrap().is_none());
    assert_eq!(driver.statements().len(), 2);

    query.reset_cursor();
    let again = query.next(&conn).await.unwrap().unwrap();
    assert_eq!(again.get("id"), Some(&Value::Int(1)));
}

#[tokio::test]
async fn test_next_stops_when_rows_run_out() {
    let driver = MockDriver::new();
    driver.on_query("LIMIT 1", vec![Row::from_pairs([("id", 1)])]);
    driver.on_query("OFFSET 1", vec![]);
    let conn = connection(&driver);

    let mut query = QueryBuilder::table("users");
    assert!(query.next(&conn).await.unwrap().is_some());
    assert!(query.next(&conn).await.unwrap().is_none());
    assert_eq!(query.cursor(), 1);
}

#[tokio::test]
async fn test_count_reads_scalar() {
    let driver = MockDriver::new();
    driver.on_query("SELECT COUNT(*)", vec![Row::from_pairs([("COUNT(*)", 7)])]);
    let conn = connection(&driver);

    let count = QueryBuilder::table("users")
        .compare([("active", true)])
        .count(&conn)
        .await
        .unwrap();
    assert_eq!(count, 7);
    assert_eq!(
        driver.statements()[0].sql,
        "SELECT COUNT(*) FROM `users` WHERE `active` = ?"
    );
}
