//! SQL identifier checks.
//!
//! Table and column names cannot be bound as parameters, so anything spliced
//! into DDL has to pass [`is_valid_identifier`] first and is then quoted.

use std::sync::LazyLock;

use regex::Regex;

pub const MAX_IDENTIFIER_LEN: usize = 64;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

static SQL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?$").expect("sql type regex")
});

/// Alphanumeric plus underscore, not starting with a digit.
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(name)
}

/// Column type names such as `TEXT`, `VARCHAR(255)` or `DECIMAL(10, 2)`.
pub fn is_valid_sql_type(sql_type: &str) -> bool {
    SQL_TYPE.is_match(sql_type.trim())
}

/// Double-quote an identifier that already passed [`is_valid_identifier`].
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}
