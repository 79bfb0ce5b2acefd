//! # tessera-orm: relation-aware query building and hydration for MySQL
//!
//! Builds parameterized SQL for models with declared relations, decides per
//! relation whether it is joined into the main SELECT or loaded by a
//! batched follow-up query, and hydrates flat rows into record graphs.
//!
//! Layers, leaf first:
//!
//! - [`sql`]: identifier quoting and named parameters
//! - [`backends`]: the driver trait, MySQL over sqlx and a scripted mock
//! - [`connection`]: statement execution, logging and the metadata cache
//! - [`query`]: the single-table [`QueryBuilder`]
//! - [`relations`]: relation descriptors, the planner and the deferred loader
//! - [`condition`]: the model-aware [`Condition`]
//! - [`hydration`]: rows to record graphs
//! - [`model`]: definitions, records and the [`Repository`]

pub mod backends;
pub mod condition;
pub mod connection;
pub mod error;
pub mod hydration;
pub mod model;
pub mod query;
pub mod relations;
pub mod sql;
pub mod value;

// Re-export core traits and types
pub use backends::{DatabaseDriver, ExecOutcome, LoggedStatement, MockDriver, MySqlDriver, Row};
pub use condition::{BuiltQuery, Condition};
pub use connection::{ColumnMeta, Connection, ConnectionRegistry, Hydrate, KeyRole, MemorySchemaCache, SchemaCache};
pub use error::*;
pub use model::{Model, ModelDefinition, ModelObserver, Repository, RelationValue, Rule, Schema, ValidationErrors};
pub use query::{JoinType, OnDuplicate, OrderDirection, QueryBuilder};
pub use relations::{ColumnSet, Predicate, RelationDescriptor, RelationKind};
pub use sql::Params;
pub use value::Value;

pub use tessera_core::{DatabaseConfig, ErrorPolicy};
