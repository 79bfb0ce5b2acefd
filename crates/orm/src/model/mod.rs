//! Model System
//!
//! - `definition`: model definitions and the schema registry
//! - `record`: the record type with attribute and relation access
//! - `validation`: declarative attribute rules
//! - `observer`: lifecycle hooks around loads and writes
//! - `repository`: finders and writes for one model

pub mod definition;
pub mod observer;
pub mod record;
pub mod repository;
pub mod validation;

pub use definition::{ModelDefinition, ModelDefinitionBuilder, Schema};
pub use observer::ModelObserver;
pub use record::{Model, RelationValue};
pub use repository::Repository;
pub use validation::{Rule, ValidationErrors};
