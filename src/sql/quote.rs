//! Identifier and literal quoting for the PostgreSQL dialect.
//!
//! Every identifier that reaches emitted SQL goes through these helpers;
//! embedded quote characters are escaped by doubling, so caller-supplied
//! names can never break out of their quoted position.

/// Quote an identifier (table, column, alias) with double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a qualified identifier: `"table"."column"`.
pub fn quote_qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(table), quote_ident(column))
}

/// Quote a table reference, optionally schema-qualified:
/// `"schema"."table"` or `"table"`.
pub fn quote_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quote_ident(s), quote_ident(table)),
        None => quote_ident(table),
    }
}

/// Quote a string literal with single quotes, `''` doubling.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
