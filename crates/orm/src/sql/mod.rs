//! SQL text helpers
//!
//! Identifier quoting for the MySQL dialect and the named-parameter machinery
//! shared by the query builder and the condition. Values never enter SQL text
//! through this module; only identifiers are quoted in.

pub mod params;

pub use params::{bind_named, param_safe, placeholders, rename_param, Params};

/// Alias of the primary table in every condition-generated SELECT
pub const PRIMARY_ALIAS: &str = "t";

/// LIMIT used when only an OFFSET was requested
pub const MAX_LIMIT: u64 = u64::MAX;

/// Quote an identifier with backticks, doubling any embedded backtick
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Quote a dotted identifier such as `schema.table` segment by segment
pub fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// `` `alias`.`column` ``, leaving `*` unquoted
pub fn quote_column(alias: &str, column: &str) -> String {
    if column == "*" {
        format!("{}.*", quote_identifier(alias))
    } else {
        format!("{}.{}", quote_identifier(alias), quote_identifier(column))
    }
}

/// Escape LIKE metacharacters so a value matches literally
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// `LIMIT n [OFFSET m]` clause for MySQL; an offset alone gets the maximum limit
pub fn limit_clause(limit: Option<u64>, offset: Option<u64>) -> String {
    match (limit, offset) {
        (Some(limit), Some(offset)) if offset > 0 => format!(" LIMIT {} OFFSET {}", limit, offset),
        (Some(limit), _) => format!(" LIMIT {}", limit),
        (None, Some(offset)) if offset > 0 => format!(" LIMIT {} OFFSET {}", MAX_LIMIT, offset),
        _ => String::new(),
    }
}
