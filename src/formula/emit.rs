//! Tree-walk SQL emission for formula expressions.
//!
//! Walks a parsed [`Expr`] and produces a PostgreSQL fragment, tracking
//! whether the fragment aggregates. Two shapes get special treatment:
//!
//! - **Percent-of-whole**: a division of one plain aggregate by another is
//!   the "share of total" pattern. Once a GROUP BY is applied, the
//!   denominator would shrink to the group's own total and the ratio would
//!   silently become 100%. The denominator is therefore emitted between
//!   placeholder markers; the SQL builder substitutes a scalar subquery
//!   that reuses the outer query's FROM/WHERE.
//! - **Nested aggregates**: an aggregate applied over an expression that
//!   already aggregates (`sum(sum([x]))`) is only expressible in a single
//!   statement as a window: the outer call is emitted with `OVER ()`.

use super::ast::{BinaryOp, Expr, Func, Literal, UnaryOp};
use super::ParseError;
use crate::sql::quote::{quote_qualified, quote_string};

/// Opening marker for a scalar-subquery placeholder.
pub const TOTAL_OPEN: &str = "__QUARRY_TOTAL__(";

/// Closing marker for a scalar-subquery placeholder.
pub const TOTAL_CLOSE: &str = ")__END_TOTAL__";

/// A calculated field resolved to SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFormula {
    /// The emitted SQL fragment.
    pub sql: String,

    /// Whether the fragment contains aggregation.
    pub has_aggregation: bool,
}

/// Emit SQL for a parsed expression.
///
/// Unqualified field references are qualified with `base_table`.
pub fn emit(expr: &Expr, base_table: &str) -> Result<ResolvedFormula, ParseError> {
    let sql = emit_expr(expr, base_table)?;
    Ok(ResolvedFormula {
        sql,
        has_aggregation: expr.contains_aggregate(),
    })
}

fn emit_expr(expr: &Expr, base_table: &str) -> Result<String, ParseError> {
    match expr {
        Expr::Literal(Literal::Int(v)) => Ok(v.to_string()),
        Expr::Literal(Literal::Float(v)) => Ok(format_float(*v)),
        Expr::Literal(Literal::Str(s)) => Ok(quote_string(s)),

        Expr::FieldRef { table, field } => {
            let table = table.as_deref().unwrap_or(base_table);
            Ok(quote_qualified(table, field))
        }

        Expr::Unary { op: UnaryOp::Neg, expr } => {
            Ok(format!("-{}", emit_operand(expr, base_table)?))
        }

        Expr::Binary { left, op, right } => {
            if *op == BinaryOp::Div && left.contains_aggregate() && right.is_plain_aggregate() {
                // Percent-of-whole: the denominator keeps its grouping-free
                // scope via a scalar subquery, guarded against zero totals.
                let numerator = emit_operand(left, base_table)?;
                let total = emit_expr(right, base_table)?;
                return Ok(format!(
                    "{} / NULLIF({}{}{}, 0)",
                    numerator, TOTAL_OPEN, total, TOTAL_CLOSE
                ));
            }

            Ok(format!(
                "{} {} {}",
                emit_operand(left, base_table)?,
                op.sql(),
                emit_operand(right, base_table)?
            ))
        }

        Expr::Call { func, args } => emit_call(*func, args, base_table),
    }
}

/// Emit a subexpression as an operand, parenthesizing compound shapes so
/// the emitted text preserves the parsed precedence.
fn emit_operand(expr: &Expr, base_table: &str) -> Result<String, ParseError> {
    let sql = emit_expr(expr, base_table)?;
    match expr {
        Expr::Binary { .. } => Ok(format!("({})", sql)),
        _ => Ok(sql),
    }
}

fn emit_call(func: Func, args: &[Expr], base_table: &str) -> Result<String, ParseError> {
    match func {
        Func::If => {
            let cond = emit_expr(&args[0], base_table)?;
            let then = emit_expr(&args[1], base_table)?;
            let otherwise = emit_expr(&args[2], base_table)?;
            Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                cond, then, otherwise
            ))
        }

        Func::Sum | Func::Avg | Func::Min | Func::Max => {
            let name = match func {
                Func::Sum => "SUM",
                Func::Avg => "AVG",
                Func::Min => "MIN",
                Func::Max => "MAX",
                _ => unreachable!(),
            };
            let inner = emit_expr(&args[0], base_table)?;
            if args[0].contains_aggregate() {
                Ok(format!("{}({}) OVER ()", name, inner))
            } else {
                Ok(format!("{}({})", name, inner))
            }
        }

        Func::Count => {
            if args.is_empty() {
                return Ok("COUNT(*)".to_string());
            }
            let inner = emit_expr(&args[0], base_table)?;
            if args[0].contains_aggregate() {
                Ok(format!("COUNT({}) OVER ()", inner))
            } else {
                Ok(format!("COUNT({})", inner))
            }
        }

        Func::Find => {
            // find(needle, haystack); STRPOS takes (haystack, needle).
            let needle = emit_expr(&args[0], base_table)?;
            let haystack = emit_expr(&args[1], base_table)?;
            Ok(format!("STRPOS({}, {})", haystack, needle))
        }

        Func::Date => {
            let parts: Result<Vec<_>, _> =
                args.iter().map(|a| emit_expr(a, base_table)).collect();
            let parts = parts?;
            if args.len() == 3 {
                Ok(format!("MAKE_DATE({})", parts.join(", ")))
            } else {
                Ok(format!("MAKE_TIMESTAMP({})", parts.join(", ")))
            }
        }

        Func::Year | Func::Month | Func::Day => {
            let part = match func {
                Func::Year => "YEAR",
                Func::Month => "MONTH",
                Func::Day => "DAY",
                _ => unreachable!(),
            };
            let inner = emit_expr(&args[0], base_table)?;
            Ok(format!("EXTRACT({} FROM {})", part, inner))
        }

        Func::DateDiff => emit_datediff(args, base_table),

        Func::Today => Ok("CURRENT_DATE".to_string()),

        Func::Concatenate => {
            let parts: Result<Vec<_>, _> =
                args.iter().map(|a| emit_expr(a, base_table)).collect();
            Ok(format!("CONCAT({})", parts?.join(", ")))
        }
    }
}

fn emit_datediff(args: &[Expr], base_table: &str) -> Result<String, ParseError> {
    let from = emit_expr(&args[0], base_table)?;
    let to = emit_expr(&args[1], base_table)?;
    let unit = datediff_unit(&args[2])?;

    let sql = match unit {
        "day" => format!(
            "DATE_PART('day', {}::timestamp - {}::timestamp)",
            to, from
        ),
        "month" => format!(
            "(DATE_PART('year', {to}) - DATE_PART('year', {from})) * 12 + \
             (DATE_PART('month', {to}) - DATE_PART('month', {from}))",
            to = to,
            from = from
        ),
        "year" => format!("DATE_PART('year', {}) - DATE_PART('year', {})", to, from),
        "hour" => format!(
            "FLOOR(DATE_PART('epoch', {}::timestamp - {}::timestamp) / 3600)",
            to, from
        ),
        "minute" => format!(
            "FLOOR(DATE_PART('epoch', {}::timestamp - {}::timestamp) / 60)",
            to, from
        ),
        "second" => format!(
            "FLOOR(DATE_PART('epoch', {}::timestamp - {}::timestamp))",
            to, from
        ),
        _ => unreachable!(),
    };

    Ok(sql)
}

/// Normalize a datediff unit argument, accepting the short aliases.
fn datediff_unit(arg: &Expr) -> Result<&'static str, ParseError> {
    let raw = match arg {
        Expr::Literal(Literal::Str(s)) => s.as_str(),
        // Bare identifiers never parse (every identifier must call), so a
        // non-string unit is whatever the user typed; report it.
        _ => {
            return Err(ParseError::UnknownUnit {
                unit: "<expression>".to_string(),
            })
        }
    };

    match raw.to_ascii_lowercase().as_str() {
        "d" | "day" => Ok("day"),
        "m" | "month" => Ok("month"),
        "y" | "year" => Ok("year"),
        "h" | "hour" => Ok("hour"),
        "mi" | "minute" => Ok("minute"),
        "s" | "second" => Ok("second"),
        other => Err(ParseError::UnknownUnit {
            unit: other.to_string(),
        }),
    }
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}
