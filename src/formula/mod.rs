//! Calculated-field engine.
//!
//! Parses calculated-field expressions (`[field]` references, arithmetic,
//! comparisons, and a fixed function set) into an expression tree and
//! resolves each field to a SQL fragment annotated with whether it
//! aggregates.
//!
//! Parse failures are recoverable by contract: one broken calculated field
//! must not take down an otherwise-valid query, so [`resolve_all`] drops the
//! offending field with a warning instead of failing.

pub mod ast;
pub mod emit;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Expr, Func, Literal, UnaryOp};
pub use emit::{ResolvedFormula, TOTAL_CLOSE, TOTAL_OPEN};

use thiserror::Error;
use tracing::warn;

use crate::query::CalculatedField;

/// Errors raised while parsing or emitting a formula.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string literal starting at offset {pos}")]
    UnterminatedString { pos: usize },

    #[error("unterminated field reference starting at offset {pos}")]
    UnterminatedFieldRef { pos: usize },

    #[error("invalid number '{text}' at offset {pos}")]
    InvalidNumber { text: String, pos: usize },

    #[error("unexpected token '{found}'")]
    UnexpectedToken { found: String },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("wrong number of arguments to {func} ({found} given)")]
    WrongArity { func: &'static str, found: usize },

    #[error("unknown datediff unit '{unit}'")]
    UnknownUnit { unit: String },
}

/// Parse and emit one expression.
///
/// Unqualified `[field]` references are qualified with `base_table`.
pub fn resolve(expression: &str, base_table: &str) -> Result<ResolvedFormula, ParseError> {
    let expr = parser::parse(expression)?;
    emit::emit(&expr, base_table)
}

/// Resolve a set of calculated fields, dropping any that fail to parse.
///
/// Returns `(name, resolution)` pairs in input order. Dropped fields are
/// logged at warn level; they simply disappear from the compiled query.
pub fn resolve_all(
    fields: &[CalculatedField],
    base_table: &str,
) -> Vec<(String, ResolvedFormula)> {
    let mut resolved = Vec::with_capacity(fields.len());

    for field in fields {
        match resolve(&field.expression, base_table) {
            Ok(formula) => resolved.push((field.name.clone(), formula)),
            Err(err) => {
                warn!(
                    field = %field.name,
                    error = %err,
                    "dropping calculated field that failed to parse"
                );
            }
        }
    }

    resolved
}
