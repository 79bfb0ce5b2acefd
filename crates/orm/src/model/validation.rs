//! Attribute validation rules

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// Messages collected per attribute
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

/// A declarative check on one attribute
#[derive(Debug, Clone)]
pub enum Rule {
    /// Value must be present and not an empty string
    Required,
    /// String value may not exceed this many characters
    MaxLength(usize),
    /// String value must match the pattern
    Matches(Regex),
}

impl Rule {
    /// Compile a [`Rule::Matches`]
    pub fn matches(pattern: &str) -> ModelResult<Self> {
        Regex::new(pattern)
            .map(Rule::Matches)
            .map_err(|e| ModelError::Configuration(format!("Invalid validation pattern '{}': {}", pattern, e)))
    }

    /// Check `value`, returning the message on failure
    ///
    /// Only `Required` rejects null; the other rules ignore absent values.
    pub fn check(&self, attribute: &str, value: &Value) -> Option<String> {
        match self {
            Rule::Required => match value {
                Value::Null => Some(format!("{} is required", attribute)),
                Value::String(s) if s.trim().is_empty() => Some(format!("{} is required", attribute)),
                _ => None,
            },
            Rule::MaxLength(max) => match value {
                Value::String(s) if s.chars().count() > *max => {
                    Some(format!("{} may not be longer than {} characters", attribute, max))
                }
                _ => None,
            },
            Rule::Matches(pattern) => match value {
                Value::String(s) if !pattern.is_match(s) => Some(format!("{} has an invalid format", attribute)),
                _ => None,
            },
        }
    }
}
