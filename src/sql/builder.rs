//! SQL generation.
//!
//! A pure transform from a validated, preprocessed query definition to a
//! parameterized PostgreSQL statement. Every identifier is quoted, every
//! concrete filter value becomes a `$n` placeholder, and the output is
//! deterministic: the same definition always yields the same SQL and the
//! same parameter order.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::formula::{TOTAL_CLOSE, TOTAL_OPEN};
use crate::query::{
    Aggregation, ColumnSelection, Filter, FilterOperator, QueryDefinition, SortDirection, Value,
};
use crate::sql::quote::{quote_ident, quote_qualified, quote_string, quote_table};

/// A built statement: SQL text plus its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Errors from SQL generation.
///
/// A validated definition cannot hit these; they guard the builder against
/// being called on unvalidated input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("query declares no tables")]
    NoTables,

    #[error("unknown table id '{0}'")]
    UnknownTableId(String),

    #[error("invalid date_trunc unit '{0}'")]
    InvalidTruncUnit(String),

    #[error("in_subquery filter on '{0}' is missing its subquery")]
    MissingSubquery(String),

    #[error("between filter on '{0}' requires exactly two values")]
    InvalidBetween(String),
}

/// Build a parameterized SELECT for a definition.
///
/// `target_schema` namespaces every emitted table reference for
/// multi-tenant deployments (`"tenant_7"."orders"`).
pub fn build(
    query: &QueryDefinition,
    target_schema: Option<&str>,
) -> Result<BuiltQuery, BuildError> {
    let mut builder = Builder {
        target_schema,
        params: Vec::new(),
    };

    let rendered = builder.render_select(query)?;
    let sql = substitute_totals(rendered.sql, &rendered.from_clause, &rendered.where_clause);

    debug!(sql = %sql, params = builder.params.len(), "built query");

    Ok(BuiltQuery {
        sql,
        params: builder.params,
    })
}

/// Wrap a built statement in the datastore's plan facility.
///
/// PostgreSQL refuses bind parameters on utility statements, so parameters
/// are inlined as quoted literals first.
pub fn explain_sql(built: &BuiltQuery) -> String {
    format!(
        "EXPLAIN (ANALYZE, FORMAT JSON) {}",
        inline_params(&built.sql, &built.params)
    )
}

struct Builder<'a> {
    target_schema: Option<&'a str>,
    params: Vec<Value>,
}

struct RenderedSelect {
    sql: String,
    /// FROM plus JOIN text, kept for scalar-subquery substitution.
    from_clause: String,
    /// WHERE predicate text (no `WHERE` keyword), markers stripped.
    where_clause: String,
}

impl Builder<'_> {
    fn render_select(&mut self, query: &QueryDefinition) -> Result<RenderedSelect, BuildError> {
        let first = query.tables.first().ok_or(BuildError::NoTables)?;

        // SELECT list
        let mut select_items = Vec::new();

        if let Some(ts) = &query.time_series {
            let unit = trunc_unit(&ts.interval)
                .ok_or_else(|| BuildError::InvalidTruncUnit(ts.interval.clone()))?;
            let alias = self.table_alias(query, &ts.table_id)?;
            select_items.push(format!(
                "DATE_TRUNC('{}', {}) AS {}",
                unit,
                quote_qualified(&alias, &ts.date_column),
                quote_ident("time_bucket")
            ));
        }

        for selection in &query.columns {
            select_items.push(self.render_selection(query, selection)?);
        }

        if select_items.is_empty() {
            select_items.push("*".to_string());
        }

        // FROM and JOINs
        let mut from_clause = quote_table(self.target_schema, &first.name);
        if first.is_aliased() {
            from_clause.push_str(&format!(" AS {}", quote_ident(&first.id)));
        }

        let mut joined_ids = vec![first.id.as_str()];
        for join in &query.joins {
            let to_table = query
                .table_by_id(&join.to_table_id)
                .ok_or_else(|| BuildError::UnknownTableId(join.to_table_id.clone()))?;
            let from_alias = self.table_alias(query, &join.from_table_id)?;
            let to_alias = self.table_alias(query, &join.to_table_id)?;

            let keyword = match join.join_type {
                crate::query::JoinType::Inner => "INNER JOIN",
                crate::query::JoinType::Left => "LEFT JOIN",
                crate::query::JoinType::Right => "RIGHT JOIN",
                crate::query::JoinType::Full => "FULL OUTER JOIN",
            };

            let mut table_ref = quote_table(self.target_schema, &to_table.name);
            if to_table.is_aliased() {
                table_ref.push_str(&format!(" AS {}", quote_ident(&to_table.id)));
            }

            from_clause.push_str(&format!(
                " {} {} ON {} = {}",
                keyword,
                table_ref,
                quote_qualified(&from_alias, &join.from_column),
                quote_qualified(&to_alias, &join.to_column)
            ));
            joined_ids.push(to_table.id.as_str());
        }

        // Declared tables not reached by any join fall back to a cross join.
        for table in &query.tables {
            if joined_ids.contains(&table.id.as_str()) {
                continue;
            }
            let mut table_ref = quote_table(self.target_schema, &table.name);
            if table.is_aliased() {
                table_ref.push_str(&format!(" AS {}", quote_ident(&table.id)));
            }
            from_clause.push_str(&format!(" CROSS JOIN {}", table_ref));
        }

        // WHERE
        let mut predicates = Vec::new();
        for filter in &query.filters {
            predicates.push(self.render_filter(query, filter)?);
        }
        let where_clause = predicates.join(" AND ");

        // GROUP BY
        let group_exprs = self.render_group_by(query)?;

        // ORDER BY
        let order_exprs = self.render_order_by(query)?;

        let mut sql = format!("SELECT {} FROM {}", select_items.join(", "), from_clause);
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {}", where_clause));
        }
        if !group_exprs.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", group_exprs.join(", ")));
        }
        if !order_exprs.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", order_exprs.join(", ")));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok(RenderedSelect {
            sql,
            from_clause,
            where_clause: strip_total_markers(&where_clause),
        })
    }

    /// The name a table is referred to by in column positions: its id when
    /// aliased, its schema name otherwise.
    fn table_alias(&self, query: &QueryDefinition, id: &str) -> Result<String, BuildError> {
        let table = query
            .table_by_id(id)
            .ok_or_else(|| BuildError::UnknownTableId(id.to_string()))?;
        Ok(if table.is_aliased() {
            table.id.clone()
        } else {
            table.name.clone()
        })
    }

    fn render_selection(
        &mut self,
        query: &QueryDefinition,
        selection: &ColumnSelection,
    ) -> Result<String, BuildError> {
        let expr = self.selection_expr(query, selection)?;

        // Calculated columns keep their field name as the output name.
        let alias = selection
            .alias
            .clone()
            .or_else(|| {
                selection
                    .calculated_expression
                    .is_some()
                    .then(|| selection.column.clone())
            })
            .filter(|a| !a.is_empty());

        Ok(match alias {
            Some(alias) => format!("{} AS {}", expr, quote_ident(&alias)),
            None => expr,
        })
    }

    /// The projected expression for a selection, without its alias. Shared
    /// by the SELECT list, GROUP BY, and ORDER BY so sort and grouping
    /// always match what was actually projected.
    fn selection_expr(
        &self,
        query: &QueryDefinition,
        selection: &ColumnSelection,
    ) -> Result<String, BuildError> {
        if let Some(expr) = &selection.calculated_expression {
            return Ok(expr.clone());
        }

        if selection.column == "*" {
            return Ok(match selection.aggregation {
                Aggregation::Count | Aggregation::CountDistinct => "COUNT(*)".to_string(),
                _ if query.tables.len() > 1 => {
                    let alias = self.table_alias(query, &selection.table_id)?;
                    format!("{}.*", quote_ident(&alias))
                }
                _ => "*".to_string(),
            });
        }

        let alias = self.table_alias(query, &selection.table_id)?;
        let mut expr = quote_qualified(&alias, &selection.column);

        if let Some(unit) = &selection.date_trunc {
            let unit = trunc_unit(unit)
                .ok_or_else(|| BuildError::InvalidTruncUnit(unit.clone()))?;
            expr = format!("DATE_TRUNC('{}', {})", unit, expr);
        }

        expr = match selection.aggregation {
            Aggregation::None => expr,
            Aggregation::CountDistinct => format!("COUNT(DISTINCT {})", expr),
            agg => format!("{}({})", agg.sql_name().unwrap_or("COUNT"), expr),
        };

        Ok(expr)
    }

    fn render_filter(
        &mut self,
        query: &QueryDefinition,
        filter: &Filter,
    ) -> Result<String, BuildError> {
        let lhs = match &filter.calculated_expression {
            Some(expr) => expr.clone(),
            None => {
                let alias = self.table_alias(query, &filter.table_id)?;
                quote_qualified(&alias, &filter.column)
            }
        };

        let sql = match filter.operator {
            FilterOperator::Eq if filter.value.is_null() => format!("{} IS NULL", lhs),
            FilterOperator::Ne if filter.value.is_null() => format!("{} IS NOT NULL", lhs),

            FilterOperator::Eq => format!("{} = {}", lhs, self.placeholder(filter.value.clone())),
            FilterOperator::Ne => format!("{} <> {}", lhs, self.placeholder(filter.value.clone())),
            FilterOperator::Gt => format!("{} > {}", lhs, self.placeholder(filter.value.clone())),
            FilterOperator::Gte => format!("{} >= {}", lhs, self.placeholder(filter.value.clone())),
            FilterOperator::Lt => format!("{} < {}", lhs, self.placeholder(filter.value.clone())),
            FilterOperator::Lte => format!("{} <= {}", lhs, self.placeholder(filter.value.clone())),

            FilterOperator::In => match filter.value.as_array() {
                // IN () is invalid SQL in most dialects; an empty list can
                // never match, which is spelled FALSE.
                Some([]) | None => "FALSE".to_string(),
                Some(items) => format!("{} IN ({})", lhs, self.placeholder_list(items)),
            },

            FilterOperator::InOrNull => match filter.value.as_array() {
                Some([]) | None => format!("{} IS NULL", lhs),
                Some(items) => format!(
                    "({} IN ({}) OR {} IS NULL)",
                    lhs,
                    self.placeholder_list(items),
                    lhs
                ),
            },

            FilterOperator::InSubquery => {
                let subquery = filter
                    .subquery
                    .as_deref()
                    .ok_or_else(|| BuildError::MissingSubquery(filter.column.clone()))?;
                let rendered = self.render_select(subquery)?;
                format!("{} IN ({})", lhs, rendered.sql)
            }

            FilterOperator::Like => {
                let pattern = like_pattern(&filter.value);
                format!("{} LIKE {}", lhs, self.placeholder(pattern))
            }
            FilterOperator::NotLike => {
                let pattern = like_pattern(&filter.value);
                format!("{} NOT LIKE {}", lhs, self.placeholder(pattern))
            }

            FilterOperator::Between => match filter.value.as_array() {
                Some([low, high]) => {
                    let low = self.placeholder(low.clone());
                    let high = self.placeholder(high.clone());
                    format!("{} BETWEEN {} AND {}", lhs, low, high)
                }
                _ => return Err(BuildError::InvalidBetween(filter.column.clone())),
            },
        };

        Ok(sql)
    }

    fn render_group_by(&self, query: &QueryDefinition) -> Result<Vec<String>, BuildError> {
        let mut exprs = Vec::new();
        let aggregates = query.columns.iter().any(ColumnSelection::aggregates);

        if aggregates {
            if let Some(ts) = &query.time_series {
                let unit = trunc_unit(&ts.interval)
                    .ok_or_else(|| BuildError::InvalidTruncUnit(ts.interval.clone()))?;
                let alias = self.table_alias(query, &ts.table_id)?;
                exprs.push(format!(
                    "DATE_TRUNC('{}', {})",
                    unit,
                    quote_qualified(&alias, &ts.date_column)
                ));
            }
        }

        for group in &query.group_by {
            let matched = self.find_selection(query, &group.table_id, &group.column);

            if let Some(selection) = matched {
                if selection.aggregates() {
                    continue;
                }
                exprs.push(self.selection_expr(query, selection)?);
            } else {
                let alias = self.table_alias(query, &group.table_id)?;
                exprs.push(quote_qualified(&alias, &group.column));
            }
        }

        Ok(exprs)
    }

    fn render_order_by(&self, query: &QueryDefinition) -> Result<Vec<String>, BuildError> {
        let mut exprs = Vec::new();

        for sort in &query.sort_by {
            let expr = match self.find_selection(query, &sort.table_id, &sort.column) {
                Some(selection) => self.selection_expr(query, selection)?,
                None => {
                    let alias = self.table_alias(query, &sort.table_id)?;
                    quote_qualified(&alias, &sort.column)
                }
            };
            let dir = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            exprs.push(format!("{} {}", expr, dir));
        }

        // A time-series query with no explicit sort orders by its bucket.
        if exprs.is_empty() {
            if let Some(ts) = &query.time_series {
                let unit = trunc_unit(&ts.interval)
                    .ok_or_else(|| BuildError::InvalidTruncUnit(ts.interval.clone()))?;
                let alias = self.table_alias(query, &ts.table_id)?;
                exprs.push(format!(
                    "DATE_TRUNC('{}', {}) ASC",
                    unit,
                    quote_qualified(&alias, &ts.date_column)
                ));
            }
        }

        Ok(exprs)
    }

    /// Find the selection a group-by/order-by entry refers to, by alias
    /// first, then by column name on the same table.
    fn find_selection<'q>(
        &self,
        query: &'q QueryDefinition,
        table_id: &str,
        column: &str,
    ) -> Option<&'q ColumnSelection> {
        query
            .columns
            .iter()
            .find(|c| c.alias.as_deref() == Some(column))
            .or_else(|| {
                query
                    .columns
                    .iter()
                    .find(|c| c.table_id == table_id && c.column == column)
            })
    }

    fn placeholder(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn placeholder_list(&mut self, items: &[Value]) -> String {
        items
            .iter()
            .map(|item| self.placeholder(item.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Wrap a LIKE value in `%...%`. Non-string values pass through and are
/// left to the datastore to reject (the validator flags them first).
fn like_pattern(value: &Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(format!("%{}%", s)),
        other => other.clone(),
    }
}

/// Replace percent-of-whole placeholders with scalar subqueries reusing the
/// outer statement's FROM/WHERE, so the denominator keeps its grouping-free
/// scope after a GROUP BY is applied.
fn substitute_totals(mut sql: String, from_clause: &str, where_clause: &str) -> String {
    while let Some(start) = sql.find(TOTAL_OPEN) {
        let inner_start = start + TOTAL_OPEN.len();
        let Some(inner_len) = sql[inner_start..].find(TOTAL_CLOSE) else {
            break;
        };
        let inner = sql[inner_start..inner_start + inner_len].to_string();

        let where_part = if where_clause.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clause)
        };
        let replacement = format!("(SELECT {} FROM {}{})", inner, from_clause, where_part);

        sql.replace_range(start..inner_start + inner_len + TOTAL_CLOSE.len(), &replacement);
    }
    sql
}

/// Drop placeholder markers from a fragment that is about to be reused
/// inside a scalar subquery, where plain aggregate scope is already right.
fn strip_total_markers(fragment: &str) -> String {
    fragment.replace(TOTAL_OPEN, "(").replace(TOTAL_CLOSE, ")")
}

static PARAM_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$(\d+)").unwrap());

/// Inline parameters as quoted literals. Only used for EXPLAIN, which
/// cannot take bind parameters.
fn inline_params(sql: &str, params: &[Value]) -> String {
    PARAM_PATTERN
        .replace_all(sql, |caps: &regex::Captures| {
            let index: usize = caps[1].parse().unwrap_or(0);
            match index.checked_sub(1).and_then(|i| params.get(i)) {
                Some(value) => render_literal(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => quote_string(s),
        other => quote_string(&serde_json::Value::from(other).to_string()),
    }
}

const TRUNC_UNITS: [&str; 7] = ["minute", "hour", "day", "week", "month", "quarter", "year"];

/// Canonicalize a date_trunc unit to a static string, so only vetted text
/// is ever spliced into the statement.
fn trunc_unit(unit: &str) -> Option<&'static str> {
    let lower = unit.to_ascii_lowercase();
    TRUNC_UNITS.iter().find(|u| **u == lower).copied()
}
