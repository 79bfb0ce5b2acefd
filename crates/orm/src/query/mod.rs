//! Query Builder Module - fluent single-table SQL builder
//!
//! Knows nothing about models or relations; the condition layer builds on
//! top of it.

pub mod builder;
pub mod dml;
pub mod execution;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

#[cfg(test)]
mod tests;

pub use builder::QueryBuilder;
pub use types::{JoinType, OnDuplicate, OrderDirection};
