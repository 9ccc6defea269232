// src/query_builders/utils.rs
//! Identifier checks and LIKE escaping

const RESERVED_WORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER",
    "UNION", "JOIN", "ORDER", "GROUP", "HAVING", "EXISTS", "AND", "OR", "NOT", "NULL", "AS",
    "TABLE", "INDEX", "VIEW", "TRIGGER", "INTO", "VALUES", "SET", "PRAGMA", "ATTACH",
];

const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Escape character used by every LIKE condition the builders emit.
pub const LIKE_ESCAPE: char = '\\';

/// Escape LIKE wildcards so user input matches literally
pub fn escape_like_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Plain identifier: ASCII letter first, then letters, digits or `_`.
/// A single dot is allowed for `alias.column`.
pub fn is_safe_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LENGTH {
        return false;
    }
    if RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return false;
    }

    let mut parts = name.split('.');
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    };

    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), None, _) => valid_part(a),
        (Some(a), Some(b), None) => valid_part(a) && valid_part(b),
        _ => false,
    }
}

#[inline]
pub fn normalize_sort_order(order: &str) -> &'static str {
    match order.to_uppercase().as_str() {
        "ASC" => "ASC",
        _ => "DESC",
    }
}

/// Trimmed filter value, `None` when absent or blank.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
