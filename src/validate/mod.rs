//! Query-definition validation.
//!
//! Two passes share one read-only walk: structural checks (do referenced
//! tables, columns, and join endpoints exist?) and type/semantic checks
//! (aggregation legality, filter-value compatibility). Every applicable rule
//! runs; all diagnostics across the whole query are collected into a single
//! result so a UI can surface every problem at once. Validation never fails
//! fast and never reaches the datastore.

mod suggest;

pub use suggest::closest_match;

use serde::Serialize;
use std::collections::HashSet;

use crate::query::{Filter, FilterOperator, QueryDefinition};
use crate::schema::{Schema, Table, TypeFamily};

/// Diagnostic codes, stable across releases; UIs key behavior off these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TableNotFound,
    ColumnNotFound,
    InvalidJoin,
    CircularJoin,
    InvalidAggregation,
    TypeMismatch,
    DuplicateTableId,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ErrorCode::ColumnNotFound => "COLUMN_NOT_FOUND",
            ErrorCode::InvalidJoin => "INVALID_JOIN",
            ErrorCode::CircularJoin => "CIRCULAR_JOIN",
            ErrorCode::InvalidAggregation => "INVALID_AGGREGATION",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::DuplicateTableId => "DUPLICATE_TABLE_ID",
        };
        f.write_str(s)
    }
}

/// A single validation diagnostic.
///
/// `field` is a dotted/bracketed path into the query definition
/// (`columns[1].column`, `joins[0].from_column`) for precise UI binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    pub field: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// The result of detailed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
}

/// Legacy accessor: diagnostics flattened to their message strings.
pub fn validate(query: &QueryDefinition, schema: &Schema) -> Vec<String> {
    validate_detailed(query, schema)
        .errors
        .into_iter()
        .map(|d| d.message)
        .collect()
}

/// Validate a query definition against the exposed schema.
pub fn validate_detailed(query: &QueryDefinition, schema: &Schema) -> ValidationOutcome {
    let mut errors = Vec::new();

    validate_tables(query, schema, "", &mut errors);
    validate_columns(query, schema, "", &mut errors);
    validate_filters(query, schema, "", &mut errors);
    validate_joins(query, schema, "", &mut errors);
    validate_group_and_sort(query, schema, "", &mut errors);

    ValidationOutcome {
        valid: errors.is_empty(),
        errors,
    }
}

fn validate_tables(
    query: &QueryDefinition,
    schema: &Schema,
    prefix: &str,
    errors: &mut Vec<Diagnostic>,
) {
    let mut seen_ids = HashSet::new();

    for (i, table) in query.tables.iter().enumerate() {
        if !seen_ids.insert(table.id.as_str()) {
            errors.push(Diagnostic {
                code: ErrorCode::DuplicateTableId,
                message: format!("Duplicate table id '{}'", table.id),
                field: format!("{}tables[{}].id", prefix, i),
                suggestion: None,
            });
        }

        if !schema.has_table(&table.name) {
            errors.push(Diagnostic {
                code: ErrorCode::TableNotFound,
                message: format!("Table '{}' does not exist", table.name),
                field: format!("{}tables[{}].name", prefix, i),
                suggestion: closest_match(&table.name, &schema.table_names()),
            });
        }
    }
}

fn validate_columns(
    query: &QueryDefinition,
    schema: &Schema,
    prefix: &str,
    errors: &mut Vec<Diagnostic>,
) {
    for (i, selection) in query.columns.iter().enumerate() {
        let table = match resolve_table(
            query,
            schema,
            &selection.table_id,
            &format!("{}columns[{}].table_id", prefix, i),
            errors,
        ) {
            Some(table) => table,
            None => continue,
        };

        let is_calculated = selection.calculated_expression.is_some()
            || query.calculated_field(&selection.column).is_some();

        if !is_calculated
            && selection.column != "*"
            && is_plain_identifier(&selection.column)
            && !table.has_column(&selection.column)
        {
            errors.push(Diagnostic {
                code: ErrorCode::ColumnNotFound,
                message: format!(
                    "Column '{}' does not exist on table '{}'",
                    selection.column, table.name
                ),
                field: format!("{}columns[{}].column", prefix, i),
                suggestion: closest_match(&selection.column, &table.column_names()),
            });
        }

        if selection.aggregation.requires_numeric() && !is_calculated {
            if let Some(column) = table.column(&selection.column) {
                if !column.is_numeric() {
                    errors.push(Diagnostic {
                        code: ErrorCode::InvalidAggregation,
                        message: format!(
                            "Aggregation {:?} requires a numeric column, but '{}' is {}",
                            selection.aggregation, column.name, column.data_type
                        ),
                        field: format!("{}columns[{}].aggregation", prefix, i),
                        suggestion: Some("count".to_string()),
                    });
                }
            }
        }

        if let Some(unit) = &selection.date_trunc {
            if !is_valid_trunc_unit(unit) {
                errors.push(Diagnostic {
                    code: ErrorCode::TypeMismatch,
                    message: format!("Invalid date_trunc unit '{}'", unit),
                    field: format!("{}columns[{}].date_trunc", prefix, i),
                    suggestion: closest_match(unit, &TRUNC_UNITS.to_vec()),
                });
            }
        }
    }
}

fn validate_filters(
    query: &QueryDefinition,
    schema: &Schema,
    prefix: &str,
    errors: &mut Vec<Diagnostic>,
) {
    for (i, filter) in query.filters.iter().enumerate() {
        let table = resolve_table(
            query,
            schema,
            &filter.table_id,
            &format!("{}filters[{}].table_id", prefix, i),
            errors,
        );

        let is_calculated = filter.calculated_expression.is_some()
            || query.calculated_field(&filter.column).is_some();

        let column = table.and_then(|t| {
            if !is_calculated && is_plain_identifier(&filter.column) && !t.has_column(&filter.column)
            {
                errors.push(Diagnostic {
                    code: ErrorCode::ColumnNotFound,
                    message: format!(
                        "Column '{}' does not exist on table '{}'",
                        filter.column, t.name
                    ),
                    field: format!("{}filters[{}].column", prefix, i),
                    suggestion: closest_match(&filter.column, &t.column_names()),
                });
            }
            t.column(&filter.column)
        });

        validate_filter_value(filter, column.map(|c| c.family()), prefix, i, errors);

        if filter.operator == FilterOperator::InSubquery {
            match &filter.subquery {
                Some(subquery) => {
                    let inner_prefix = format!("{}filters[{}].subquery.", prefix, i);
                    validate_tables(subquery, schema, &inner_prefix, errors);
                    validate_columns(subquery, schema, &inner_prefix, errors);
                    validate_filters(subquery, schema, &inner_prefix, errors);
                    validate_joins(subquery, schema, &inner_prefix, errors);
                    validate_group_and_sort(subquery, schema, &inner_prefix, errors);
                }
                None => errors.push(Diagnostic {
                    code: ErrorCode::TypeMismatch,
                    message: "Operator in_subquery requires a subquery".to_string(),
                    field: format!("{}filters[{}].subquery", prefix, i),
                    suggestion: None,
                }),
            }
        }
    }
}

fn validate_filter_value(
    filter: &Filter,
    family: Option<TypeFamily>,
    prefix: &str,
    index: usize,
    errors: &mut Vec<Diagnostic>,
) {
    let field = format!("{}filters[{}].value", prefix, index);

    match filter.operator {
        FilterOperator::In | FilterOperator::InOrNull => {
            if !filter.value.is_sequence() {
                errors.push(Diagnostic {
                    code: ErrorCode::TypeMismatch,
                    message: format!(
                        "Operator {:?} requires a list of values, got {}",
                        filter.operator,
                        filter.value.kind()
                    ),
                    field,
                    suggestion: None,
                });
            }
        }
        FilterOperator::Between => match filter.value.as_array() {
            Some(items) if items.len() == 2 => {}
            _ => errors.push(Diagnostic {
                code: ErrorCode::TypeMismatch,
                message: "Operator between requires exactly two values".to_string(),
                field,
                suggestion: None,
            }),
        },
        FilterOperator::Like | FilterOperator::NotLike => {
            if !filter.value.is_text() {
                errors.push(Diagnostic {
                    code: ErrorCode::TypeMismatch,
                    message: format!(
                        "Operator {:?} requires a string pattern, got {}",
                        filter.operator,
                        filter.value.kind()
                    ),
                    field,
                    suggestion: None,
                });
            }
        }
        FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte => {
            if filter.value.is_null() {
                errors.push(Diagnostic {
                    code: ErrorCode::TypeMismatch,
                    message: "Ordering comparison against null is not defined".to_string(),
                    field,
                    suggestion: None,
                });
            } else {
                check_scalar_family(filter, family, field, errors);
            }
        }
        FilterOperator::Eq | FilterOperator::Ne => {
            // eq/ne with null compile to IS [NOT] NULL; anything else must
            // match the column's type family.
            if !filter.value.is_null() {
                check_scalar_family(filter, family, field, errors);
            }
        }
        FilterOperator::InSubquery => {}
    }
}

fn check_scalar_family(
    filter: &Filter,
    family: Option<TypeFamily>,
    field: String,
    errors: &mut Vec<Diagnostic>,
) {
    let Some(family) = family else { return };

    let compatible = match family {
        TypeFamily::Numeric => filter.value.is_numeric(),
        TypeFamily::Text => filter.value.is_text(),
        // Temporal columns compare against ISO-8601 strings.
        TypeFamily::Temporal => filter.value.is_text(),
        TypeFamily::Boolean => filter.value.is_bool(),
        TypeFamily::Other => true,
    };

    if !compatible {
        errors.push(Diagnostic {
            code: ErrorCode::TypeMismatch,
            message: format!(
                "Column '{}' is {:?} but the filter value is {}",
                filter.column,
                family,
                filter.value.kind()
            ),
            field,
            suggestion: None,
        });
    }
}

fn validate_joins(
    query: &QueryDefinition,
    schema: &Schema,
    prefix: &str,
    errors: &mut Vec<Diagnostic>,
) {
    for (i, join) in query.joins.iter().enumerate() {
        if join.from_table_id == join.to_table_id {
            errors.push(Diagnostic {
                code: ErrorCode::CircularJoin,
                message: format!("Join from table '{}' to itself", join.from_table_id),
                field: format!("{}joins[{}].to_table_id", prefix, i),
                suggestion: None,
            });
        }

        let from = resolve_join_table(
            query,
            schema,
            &join.from_table_id,
            &format!("{}joins[{}].from_table_id", prefix, i),
            errors,
        );
        let to = resolve_join_table(
            query,
            schema,
            &join.to_table_id,
            &format!("{}joins[{}].to_table_id", prefix, i),
            errors,
        );

        if let Some(table) = from {
            if !table.has_column(&join.from_column) {
                errors.push(Diagnostic {
                    code: ErrorCode::InvalidJoin,
                    message: format!(
                        "Join column '{}' does not exist on table '{}'",
                        join.from_column, table.name
                    ),
                    field: format!("{}joins[{}].from_column", prefix, i),
                    suggestion: closest_match(&join.from_column, &table.column_names()),
                });
            }
        }

        if let Some(table) = to {
            if !table.has_column(&join.to_column) {
                errors.push(Diagnostic {
                    code: ErrorCode::InvalidJoin,
                    message: format!(
                        "Join column '{}' does not exist on table '{}'",
                        join.to_column, table.name
                    ),
                    field: format!("{}joins[{}].to_column", prefix, i),
                    suggestion: closest_match(&join.to_column, &table.column_names()),
                });
            }
        }
    }
}

fn validate_group_and_sort(
    query: &QueryDefinition,
    schema: &Schema,
    prefix: &str,
    errors: &mut Vec<Diagnostic>,
) {
    for (i, group) in query.group_by.iter().enumerate() {
        validate_projection_ref(
            query,
            schema,
            &group.table_id,
            &group.column,
            &format!("{}group_by[{}]", prefix, i),
            errors,
        );
    }

    for (i, sort) in query.sort_by.iter().enumerate() {
        validate_projection_ref(
            query,
            schema,
            &sort.table_id,
            &sort.column,
            &format!("{}sort_by[{}]", prefix, i),
            errors,
        );
    }
}

/// Validate a group-by/order-by reference: either a schema column on the
/// resolved table, a calculated-field name, or an alias already present in
/// the selection list.
fn validate_projection_ref(
    query: &QueryDefinition,
    schema: &Schema,
    table_id: &str,
    column: &str,
    field_base: &str,
    errors: &mut Vec<Diagnostic>,
) {
    let table = match resolve_table(
        query,
        schema,
        table_id,
        &format!("{}.table_id", field_base),
        errors,
    ) {
        Some(table) => table,
        None => return,
    };

    let is_alias = query
        .columns
        .iter()
        .any(|c| c.alias.as_deref() == Some(column));
    let is_calculated = query.calculated_field(column).is_some();

    if !is_alias && !is_calculated && is_plain_identifier(column) && !table.has_column(column) {
        let mut candidates: Vec<&str> = table.column_names();
        let aliases: Vec<&str> = query
            .columns
            .iter()
            .filter_map(|c| c.alias.as_deref())
            .collect();
        candidates.extend(aliases);

        errors.push(Diagnostic {
            code: ErrorCode::ColumnNotFound,
            message: format!(
                "Column '{}' does not exist on table '{}' and is not a selected alias",
                column, table.name
            ),
            field: format!("{}.column", field_base),
            suggestion: closest_match(column, &candidates),
        });
    }
}

/// Resolve a table id to its schema table, reporting unknown ids and
/// unexposed tables along the way. Returns `None` if resolution failed at
/// either step (an unknown table name is already reported by
/// `validate_tables`, so only the id lookup reports here).
fn resolve_table<'a>(
    query: &QueryDefinition,
    schema: &'a Schema,
    table_id: &str,
    field: &str,
    errors: &mut Vec<Diagnostic>,
) -> Option<&'a Table> {
    match query.table_by_id(table_id) {
        Some(declared) => schema.table(&declared.name),
        None => {
            let ids: Vec<&str> = query.tables.iter().map(|t| t.id.as_str()).collect();
            errors.push(Diagnostic {
                code: ErrorCode::TableNotFound,
                message: format!("Unknown table id '{}'", table_id),
                field: field.to_string(),
                suggestion: closest_match(table_id, &ids),
            });
            None
        }
    }
}

/// Like [`resolve_table`] but reports with the join diagnostic code.
fn resolve_join_table<'a>(
    query: &QueryDefinition,
    schema: &'a Schema,
    table_id: &str,
    field: &str,
    errors: &mut Vec<Diagnostic>,
) -> Option<&'a Table> {
    match query.table_by_id(table_id) {
        Some(declared) => schema.table(&declared.name),
        None => {
            let ids: Vec<&str> = query.tables.iter().map(|t| t.id.as_str()).collect();
            errors.push(Diagnostic {
                code: ErrorCode::InvalidJoin,
                message: format!("Join references undeclared table id '{}'", table_id),
                field: field.to_string(),
                suggestion: closest_match(table_id, &ids),
            });
            None
        }
    }
}

const TRUNC_UNITS: [&str; 7] = ["minute", "hour", "day", "week", "month", "quarter", "year"];

fn is_valid_trunc_unit(unit: &str) -> bool {
    TRUNC_UNITS.contains(&unit.to_ascii_lowercase().as_str())
}

/// Whether a name is a plain identifier the schema could contain. Names with
/// characters outside `[A-Za-z0-9_.]` are raw-expression placeholders and
/// skip existence checks (the builder quotes them defensively).
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
