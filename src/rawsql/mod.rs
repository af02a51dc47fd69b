//! Raw-SQL safety validation.
//!
//! Free-form SQL from callers is parsed with a dialect-aware parser and
//! allow-listed against the exposed schema before anything reaches the
//! datastore: a single read-only statement, no `SELECT ... INTO`, no DML
//! smuggled into set operations or expression subqueries, and every
//! referenced table must be exposed. What executes afterwards is the
//! canonical re-serialization of the parsed statement, never the caller's
//! original text.

use std::ops::ControlFlow;

use sqlparser::ast::{self, visit_expressions, visit_relations, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::schema::Schema;

/// Raw-SQL safety violations. All of these are hard failures; the statement
/// is never executed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SqlValidationError {
    #[error("SQL parse error: {0}")]
    Parse(String),

    #[error("expected exactly one statement, got {count}")]
    MultipleStatements { count: usize },

    #[error("only read-only queries are allowed, got {kind}")]
    NotReadOnly { kind: String },

    #[error("SELECT INTO is not allowed")]
    SelectInto,

    #[error("write statements are not allowed inside queries")]
    WriteInSubquery,

    #[error("table(s) not allowed: {}", tables.join(", "))]
    TablesNotAllowed { tables: Vec<String> },
}

/// The sanitized form of a validated statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedSql {
    /// Canonical re-serialization of the parsed statement.
    pub sql: String,

    /// Exposed tables the statement references, deduplicated, in order of
    /// first appearance. Useful for cache-invalidation bookkeeping upstream.
    pub tables: Vec<String>,
}

/// Validate caller-supplied SQL against the exposed schema.
pub fn validate_raw_sql(sql: &str, schema: &Schema) -> Result<SanitizedSql, SqlValidationError> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| SqlValidationError::Parse(e.to_string()))?;

    if statements.len() != 1 {
        return Err(SqlValidationError::MultipleStatements {
            count: statements.len(),
        });
    }
    let statement = &statements[0];

    let query = match statement {
        Statement::Query(query) => query,
        other => {
            return Err(SqlValidationError::NotReadOnly {
                kind: statement_kind(other),
            })
        }
    };

    // CTE names are statement-local relations, not schema tables.
    let mut cte_names = Vec::new();
    check_query(query, &mut cte_names)?;

    // Queries can also hide in expression position (IN (...), EXISTS (...),
    // scalar subqueries); walk them all.
    let flow = visit_expressions(statement, |expr: &ast::Expr| {
        let subquery = match expr {
            ast::Expr::Subquery(q) => Some(q.as_ref()),
            ast::Expr::InSubquery { subquery, .. } => Some(subquery.as_ref()),
            ast::Expr::Exists { subquery, .. } => Some(subquery.as_ref()),
            _ => None,
        };
        if let Some(q) = subquery {
            if let Err(err) = check_query(q, &mut cte_names) {
                return ControlFlow::Break(err);
            }
        }
        ControlFlow::Continue(())
    });
    if let ControlFlow::Break(err) = flow {
        return Err(err);
    }

    // Allow-list every referenced relation.
    let mut referenced = Vec::new();
    let _ = visit_relations(statement, |name: &ast::ObjectName| {
        let table = name
            .0
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default();
        if !referenced.contains(&table) {
            referenced.push(table);
        }
        ControlFlow::<()>::Continue(())
    });

    let mut denied = Vec::new();
    let mut allowed = Vec::new();
    for table in referenced {
        if cte_names.iter().any(|c| c.eq_ignore_ascii_case(&table)) {
            continue;
        }
        if schema.has_table(&table) {
            allowed.push(table);
        } else {
            denied.push(table);
        }
    }

    if !denied.is_empty() {
        return Err(SqlValidationError::TablesNotAllowed { tables: denied });
    }

    Ok(SanitizedSql {
        sql: statement.to_string(),
        tables: allowed,
    })
}

/// Walk a query body for `SELECT INTO` and write statements, collecting CTE
/// names along the way.
fn check_query(
    query: &ast::Query,
    cte_names: &mut Vec<String>,
) -> Result<(), SqlValidationError> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            cte_names.push(cte.alias.name.value.clone());
            check_query(&cte.query, cte_names)?;
        }
    }
    check_set_expr(&query.body, cte_names)
}

fn check_set_expr(
    body: &ast::SetExpr,
    cte_names: &mut Vec<String>,
) -> Result<(), SqlValidationError> {
    match body {
        ast::SetExpr::Select(select) => {
            if select.into.is_some() {
                return Err(SqlValidationError::SelectInto);
            }
            for twj in &select.from {
                check_table_factor(&twj.relation, cte_names)?;
                for join in &twj.joins {
                    check_table_factor(&join.relation, cte_names)?;
                }
            }
            Ok(())
        }
        ast::SetExpr::Query(query) => check_query(query, cte_names),
        ast::SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left, cte_names)?;
            check_set_expr(right, cte_names)
        }
        ast::SetExpr::Values(_) => Ok(()),
        ast::SetExpr::Insert { .. } | ast::SetExpr::Update { .. } => {
            Err(SqlValidationError::WriteInSubquery)
        }
        _ => Ok(()),
    }
}

fn check_table_factor(
    factor: &ast::TableFactor,
    cte_names: &mut Vec<String>,
) -> Result<(), SqlValidationError> {
    match factor {
        ast::TableFactor::Derived { subquery, .. } => check_query(subquery, cte_names),
        ast::TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            check_table_factor(&table_with_joins.relation, cte_names)?;
            for join in &table_with_joins.joins {
                check_table_factor(&join.relation, cte_names)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn statement_kind(statement: &Statement) -> String {
    match statement {
        Statement::Insert { .. } => "INSERT".to_string(),
        Statement::Update { .. } => "UPDATE".to_string(),
        Statement::Delete { .. } => "DELETE".to_string(),
        Statement::Merge { .. } => "MERGE".to_string(),
        Statement::Truncate { .. } => "TRUNCATE".to_string(),
        Statement::Drop { .. } => "DROP".to_string(),
        Statement::CreateTable { .. } => "CREATE TABLE".to_string(),
        Statement::CreateView { .. } => "CREATE VIEW".to_string(),
        Statement::Copy { .. } => "COPY".to_string(),
        Statement::Grant { .. } => "GRANT".to_string(),
        other => {
            // First keyword of the serialized statement is a good label.
            other
                .to_string()
                .split_whitespace()
                .next()
                .unwrap_or("statement")
                .to_string()
        }
    }
}
