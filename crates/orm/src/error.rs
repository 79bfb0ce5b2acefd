//! Error types for the ORM system
//!
//! Every fallible operation in the crate returns [`ModelResult`]. Statement
//! failures carry the SQL text and parameters that produced them so a failure
//! can be replayed from the log alone.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The driver rejected a statement (malformed SQL, constraint violation, ...)
    #[error("Statement failed: {message} (sql: {sql}, params: {params})")]
    Statement {
        sql: String,
        params: String,
        message: String,
    },

    /// Query could not be assembled or bound
    #[error("Query error: {0}")]
    Query(String),

    /// Connection pool or driver connectivity error
    #[error("Connection error: {0}")]
    Connection(String),

    /// A relation path segment is not declared on the model it was resolved against
    #[error("Unknown relation '{relation}' on model '{model}'")]
    UnknownRelation { model: String, relation: String },

    /// Attribute access on a name that is neither a column, a loaded attribute nor a relation
    #[error("Unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    /// Two distinct relation paths render to the same SQL alias
    #[error("Relation paths '{first}' and '{second}' both map to alias '{alias}'")]
    AliasCollision {
        alias: String,
        first: String,
        second: String,
    },

    /// Attempt to change the primary key of a persisted record
    #[error("Primary key '{column}' of a persisted '{model}' cannot be changed")]
    ImmutablePrimaryKey { model: String, column: String },

    /// Primary key is missing or invalid
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    /// Model not found in database
    #[error("Record not found in table '{0}'")]
    NotFound(String),

    /// Table metadata is unusable for the requested operation
    #[error("Schema error: {0}")]
    Schema(String),

    /// Misconfigured descriptor, definition or connection settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Relationship loading failed
    #[error("Relationship error: {0}")]
    Relationship(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// External schema cache failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Model validation failed
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ModelError {
    /// Build a statement error from the failing SQL, its parameters and the driver message
    pub fn statement(sql: &str, params: &impl std::fmt::Debug, message: impl Into<String>) -> Self {
        ModelError::Statement {
            sql: sql.to_string(),
            params: format!("{:?}", params),
            message: message.into(),
        }
    }

    /// True for errors raised by the driver while executing a statement
    pub fn is_statement(&self) -> bool {
        matches!(self, ModelError::Statement { .. })
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                ModelError::Connection(err.to_string())
            }
            other => ModelError::Query(other.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<tessera_core::ConfigError> for ModelError {
    fn from(err: tessera_core::ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_carries_sql_and_params() {
        let err = ModelError::statement("SELECT 1 FROM `x`", &vec![1, 2], "table missing");
        let rendered = err.to_string();
        assert!(rendered.contains("SELECT 1 FROM `x`"));
        assert!(rendered.contains("[1, 2]"));
        assert!(rendered.contains("table missing"));
        assert!(err.is_statement());
    }

    #[test]
    fn test_unknown_relation_names_segment() {
        let err = ModelError::UnknownRelation {
            model: "User".to_string(),
            relation: "postz".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown relation 'postz' on model 'User'");
    }
}
