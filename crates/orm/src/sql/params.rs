//! Named parameters
//!
//! Statements are assembled with `:name` placeholders and a [`Params`] map.
//! Right before execution [`bind_named`] rewrites them to the positional `?`
//! form the MySQL driver expects. Placeholders inside quoted strings and
//! backtick identifiers are left alone.

use std::collections::BTreeMap;

use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// Bound parameters keyed by name (stored without the leading colon)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    /// How many suffixes `bind_unique` tries before giving up
    pub const MAX_SUFFIX_ATTEMPTS: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name.trim_start_matches(':'))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name.trim_start_matches(':'))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Insert or overwrite a parameter
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<Value>) {
        self.values
            .insert(name.as_ref().trim_start_matches(':').to_string(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind `value` under `base`, or `base0`, `base1`, ... when taken.
    ///
    /// Returns the name actually used (without colon).
    pub fn bind_unique(&mut self, base: &str, value: impl Into<Value>) -> ModelResult<String> {
        let name = self.free_name(base)?;
        self.values.insert(name.clone(), value.into());
        Ok(name)
    }

    fn free_name(&self, base: &str) -> ModelResult<String> {
        let base = base.trim_start_matches(':');
        if !self.values.contains_key(base) {
            return Ok(base.to_string());
        }
        (0..Self::MAX_SUFFIX_ATTEMPTS - 1)
            .map(|i| format!("{}{}", base, i))
            .find(|candidate| !self.values.contains_key(candidate))
            .ok_or_else(|| {
                ModelError::Configuration(format!(
                    "Could not find a free parameter name for ':{}' after {} attempts",
                    base,
                    Self::MAX_SUFFIX_ATTEMPTS
                ))
            })
    }

    /// Merge `other` into `self`, renaming colliding names in `sql`.
    ///
    /// Returns `sql` with every renamed placeholder rewritten. Renames are
    /// applied in one pass so a new name never collides with another
    /// incoming one.
    pub fn merge_into_sql(&mut self, sql: &str, other: Params) -> ModelResult<String> {
        let incoming: Vec<String> = other.values.keys().cloned().collect();
        let mut renames = BTreeMap::new();
        for (name, value) in other.values {
            let used = if self.values.contains_key(&name) {
                let mut reserved = self.clone();
                for pending in &incoming {
                    reserved.values.entry(pending.clone()).or_insert(Value::Null);
                }
                reserved.free_name(&name)?
            } else {
                name.clone()
            };
            self.values.insert(used.clone(), value);
            if used != name {
                renames.insert(name, used);
            }
        }
        Ok(rename_params(sql, &renames))
    }

    /// Copy every parameter of `other` verbatim (names must already be unique)
    pub fn extend(&mut self, other: &Params) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Turn an arbitrary column reference into a parameter-name-safe fragment
pub fn param_safe(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// A `:name` placeholder found in SQL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte offset of the colon
    pub start: usize,
    /// Byte offset one past the last name character
    pub end: usize,
    pub name: String,
}

/// Locate every named placeholder outside quoted strings, identifiers and comments
///
/// `/*! ... */` bodies are executed by MySQL and are scanned like plain SQL.
pub fn placeholders(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\\' && quote != b'`' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == quote {
                        // doubled quote is an escaped quote
                        if i + 1 < bytes.len() && bytes[i + 1] == quote {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'#' => i = line_end(bytes, i),
            b'-' if bytes.get(i + 1) == Some(&b'-')
                && bytes.get(i + 2).map_or(true, |b| b.is_ascii_whitespace()) =>
            {
                i = line_end(bytes, i)
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') && bytes.get(i + 2) != Some(&b'!') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 2);
            }
            b':' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b':' {
                    i += 2;
                    continue;
                }
                let start = i;
                let mut end = i + 1;
                if end < bytes.len() && (bytes[end].is_ascii_alphabetic() || bytes[end] == b'_') {
                    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                        end += 1;
                    }
                    found.push(Placeholder {
                        start,
                        end,
                        name: sql[start + 1..end].to_string(),
                    });
                }
                i = end;
            }
            _ => i += 1,
        }
    }

    found
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| from + offset)
}

/// Rewrite `:from` placeholders to `:to`
pub fn rename_param(sql: &str, from: &str, to: &str) -> String {
    let from = from.trim_start_matches(':');
    let to = to.trim_start_matches(':');
    let mut out = String::with_capacity(sql.len() + 4);
    let mut cursor = 0;
    for placeholder in placeholders(sql).into_iter().filter(|p| p.name == from) {
        out.push_str(&sql[cursor..placeholder.start]);
        out.push(':');
        out.push_str(to);
        cursor = placeholder.end;
    }
    out.push_str(&sql[cursor..]);
    out
}

/// Rewrite several placeholders at once according to `renames`
fn rename_params(sql: &str, renames: &BTreeMap<String, String>) -> String {
    if renames.is_empty() {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 4 * renames.len());
    let mut cursor = 0;
    for placeholder in placeholders(sql) {
        if let Some(to) = renames.get(&placeholder.name) {
            out.push_str(&sql[cursor..placeholder.start]);
            out.push(':');
            out.push_str(to);
            cursor = placeholder.end;
        }
    }
    out.push_str(&sql[cursor..]);
    out
}

/// Rewrite named placeholders to `?` and collect their values in order
pub fn bind_named(sql: &str, params: &Params) -> ModelResult<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut cursor = 0;

    for placeholder in placeholders(sql) {
        let value = params.get(&placeholder.name).ok_or_else(|| {
            ModelError::Query(format!("Parameter ':{}' is not bound", placeholder.name))
        })?;
        if value.is_list() {
            return Err(ModelError::Query(format!(
                "Parameter ':{}' is a list; expand it into an IN clause before binding",
                placeholder.name
            )));
        }
        out.push_str(&sql[cursor..placeholder.start]);
        out.push('?');
        values.push(value.clone());
        cursor = placeholder.end;
    }
    out.push_str(&sql[cursor..]);

    Ok((out, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_unique_suffixes() {
        let mut params = Params::new();
        assert_eq!(params.bind_unique("ag_age", 1).unwrap(), "ag_age");
        assert_eq!(params.bind_unique("ag_age", 2).unwrap(), "ag_age0");
        assert_eq!(params.bind_unique(":ag_age", 3).unwrap(), "ag_age1");
        assert_eq!(params.get("ag_age0"), Some(&Value::Int(2)));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_bind_unique_gives_up() {
        let mut params = Params::new();
        for i in 0..Params::MAX_SUFFIX_ATTEMPTS {
            params.bind_unique("x", i as i64).unwrap();
        }
        let err = params.bind_unique("x", 0).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_placeholders_skip_quoted_text() {
        let sql = "SELECT ':nope', `a:b`, \"x\\\":y\" FROM t WHERE a = :a AND b::int = :b_2 AND c = 'it''s :no'";
        let names: Vec<_> = placeholders(sql).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b_2"]);
    }

    #[test]
    fn test_placeholders_skip_comments() {
        let sql = "SELECT a -- :dash\nFROM t # :hash\nWHERE b = :b /* :block\n:more */ AND c = 1--:d\n/*! AND d = :e */";
        let names: Vec<_> = placeholders(sql).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["b", "d", "e"]);

        let params = Params::new().with("b", 1).with("d", 2).with("e", 3);
        let (bound, values) = bind_named(sql, &params).unwrap();
        assert!(bound.contains("-- :dash\n"));
        assert!(bound.contains("/* :block\n:more */"));
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        assert!(placeholders("SELECT 1 /* :open").is_empty());
    }

    #[test]
    fn test_bind_named_is_positional_and_repeatable() {
        let params = Params::new().with("id", 5).with("name", "x");
        let (sql, values) = bind_named("a = :id OR b = :name OR c = :id", &params).unwrap();
        assert_eq!(sql, "a = ? OR b = ? OR c = ?");
        assert_eq!(values, vec![Value::Int(5), Value::String("x".into()), Value::Int(5)]);
    }

    #[test]
    fn test_bind_named_rejects_missing_and_lists() {
        assert!(bind_named("a = :missing", &Params::new()).is_err());
        let params = Params::new().with("ids", vec![1, 2]);
        assert!(bind_named("a IN :ids", &params).is_err());
    }

    #[test]
    fn test_merge_renames_colliding_placeholders() {
        let mut params = Params::new().with("q", "first");
        let incoming = Params::new().with("q", "second").with("r", 1);
        let sql = params.merge_into_sql("name = :q OR alias = :q OR x = :r", incoming).unwrap();
        assert_eq!(sql, "name = :q0 OR alias = :q0 OR x = :r");
        assert_eq!(params.get("q"), Some(&Value::String("first".into())));
        assert_eq!(params.get("q0"), Some(&Value::String("second".into())));
    }

    #[test]
    fn test_merge_does_not_rename_into_incoming_names() {
        let mut params = Params::new().with("a", 1);
        let incoming = Params::new().with("a", 2).with("a0", 3);
        let sql = params.merge_into_sql("x = :a AND y = :a0", incoming).unwrap();
        assert_eq!(sql, "x = :a1 AND y = :a0");
        assert_eq!(params.get("a1"), Some(&Value::Int(2)));
        assert_eq!(params.get("a0"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_param_safe() {
        assert_eq!(param_safe("author.name"), "author_name");
        assert_eq!(param_safe("weird col`"), "weird_col_");
    }
}
