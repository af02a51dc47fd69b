//! Named-parameter rewriting for the raw-SQL path.
//!
//! Raw SQL may use `:name` parameters; the datastore only takes positional
//! `$n`. The rewrite is a character scan, not a regex, so it can skip string
//! literals, quoted identifiers, and `::type` casts.

use std::collections::BTreeMap;

use super::ExecuteError;
use crate::query::Value;

/// Rewrite `:name` references to `$n` and collect the bound values in
/// placeholder order. A parameter referenced in the SQL but absent from
/// `supplied` is an error; supplied-but-unreferenced parameters are ignored.
pub fn bind_named_params(
    sql: &str,
    supplied: &BTreeMap<String, Value>,
) -> Result<(String, Vec<Value>), ExecuteError> {
    let mut rewritten = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            // String literal: copy verbatim through the closing quote,
            // honoring '' escapes.
            '\'' => {
                rewritten.push(c);
                while let Some(ch) = chars.next() {
                    rewritten.push(ch);
                    if ch == '\'' {
                        if chars.peek() == Some(&'\'') {
                            rewritten.push(chars.next().unwrap());
                        } else {
                            break;
                        }
                    }
                }
            }
            // Quoted identifier: copy verbatim.
            '"' => {
                rewritten.push(c);
                for ch in chars.by_ref() {
                    rewritten.push(ch);
                    if ch == '"' {
                        break;
                    }
                }
            }
            ':' => {
                // A second colon is a cast, not a parameter.
                if chars.peek() == Some(&':') {
                    chars.next();
                    rewritten.push_str("::");
                    continue;
                }

                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }

                if name.is_empty() {
                    rewritten.push(':');
                    continue;
                }

                if !supplied.contains_key(&name) {
                    return Err(ExecuteError::MissingParameter(name));
                }

                let position = match names.iter().position(|n| *n == name) {
                    Some(pos) => pos,
                    None => {
                        names.push(name);
                        names.len() - 1
                    }
                };
                rewritten.push_str(&format!("${}", position + 1));
            }
            _ => rewritten.push(c),
        }
    }

    let values = names
        .iter()
        .map(|name| supplied[name].clone())
        .collect();

    Ok((rewritten, values))
}
