//! Query Builder Types - Core types and enums for query building

use std::fmt;

use crate::value::Value;

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
}

impl JoinType {
    /// Inner joins restrict the owner rows, so count queries must keep them
    pub fn is_inner(&self) -> bool {
        matches!(self, JoinType::Inner)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// What an INSERT does when it hits an existing unique key
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OnDuplicate {
    /// Plain INSERT; the server reports the duplicate as an error
    #[default]
    Error,
    /// `INSERT IGNORE`
    Ignore,
    /// `ON DUPLICATE KEY UPDATE` with these assignments
    Update(Vec<(String, Value)>),
}

impl OnDuplicate {
    /// Build an update strategy from column/value pairs
    pub fn update<K, V, I>(assignments: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        OnDuplicate::Update(
            assignments
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        )
    }
}
