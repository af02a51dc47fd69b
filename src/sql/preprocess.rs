//! Calculated-field preprocessing.
//!
//! Runs between validation and SQL building: resolves the definition's
//! calculated fields, splices the resolved SQL into the column and filter
//! lists, shields ad hoc column names that are not plain identifiers, and
//! applies the window-function conflict rewrite. The pass is idempotent -
//! already-resolved selections are left alone - so callers may preprocess
//! defensively.

use tracing::debug;

use crate::formula::{self, ResolvedFormula};
use crate::query::QueryDefinition;
use crate::sql::quote::quote_qualified;

/// Resolve and splice calculated fields into a definition.
///
/// `base_table` qualifies unqualified `[field]` references; it is normally
/// the name of the definition's first table.
pub fn preprocess_calculated_fields(query: &QueryDefinition, base_table: &str) -> QueryDefinition {
    let mut query = query.clone();
    let resolved = formula::resolve_all(&query.calculated_fields, base_table);

    splice_columns(&mut query, &resolved);
    splice_filters(&mut query, &resolved);
    rewrite_for_window_functions(&mut query);

    query
}

fn lookup<'a>(
    resolved: &'a [(String, ResolvedFormula)],
    name: &str,
) -> Option<&'a ResolvedFormula> {
    resolved
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, formula)| formula)
}

fn splice_columns(query: &mut QueryDefinition, resolved: &[(String, ResolvedFormula)]) {
    // Alias resolution must not borrow query while columns are borrowed
    // mutably, so snapshot (id, alias) pairs up front.
    let aliases: Vec<(String, String)> = query
        .tables
        .iter()
        .map(|t| (t.id.clone(), render_alias(t.is_aliased(), &t.id, &t.name)))
        .collect();

    for selection in &mut query.columns {
        if selection.calculated_expression.is_some() {
            continue;
        }

        if let Some(formula) = lookup(resolved, &selection.column) {
            selection.calculated_expression = Some(formula.sql.clone());
            selection.has_aggregation = formula.has_aggregation;
            continue;
        }

        // Ad hoc names with special characters become one quoted identifier
        // so they can never splice into the statement as syntax.
        if selection.column != "*" && !is_plain_identifier(&selection.column) {
            let table = aliases
                .iter()
                .find(|(id, _)| *id == selection.table_id)
                .map(|(_, alias)| alias.as_str())
                .unwrap_or(selection.table_id.as_str());
            selection.calculated_expression =
                Some(quote_qualified(table, &selection.column));
        }
    }
}

fn splice_filters(query: &mut QueryDefinition, resolved: &[(String, ResolvedFormula)]) {
    for filter in &mut query.filters {
        if filter.calculated_expression.is_some() {
            continue;
        }
        if let Some(formula) = lookup(resolved, &filter.column) {
            filter.calculated_expression = Some(formula.sql.clone());
        }
    }
}

/// Window functions and GROUP BY over the same result set are semantically
/// incompatible. If any resolved expression carries a window (detected by
/// the documented `OVER (` substring heuristic), every other aggregated
/// column is rewritten to an empty-window aggregate and GROUP BY is cleared.
fn rewrite_for_window_functions(query: &mut QueryDefinition) {
    let has_window = query
        .columns
        .iter()
        .filter_map(|c| c.calculated_expression.as_deref())
        .any(|sql| sql.contains("OVER ("));

    if !has_window {
        return;
    }

    debug!("window function detected; rewriting aggregates and clearing GROUP BY");

    let aliases: Vec<(String, String)> = query
        .tables
        .iter()
        .map(|t| (t.id.clone(), render_alias(t.is_aliased(), &t.id, &t.name)))
        .collect();

    for selection in &mut query.columns {
        if selection.calculated_expression.is_some() {
            continue;
        }
        let Some(agg) = selection.aggregation.sql_name() else {
            continue;
        };

        let table = aliases
            .iter()
            .find(|(id, _)| *id == selection.table_id)
            .map(|(_, alias)| alias.as_str())
            .unwrap_or(selection.table_id.as_str());

        let target = if selection.column == "*" {
            "*".to_string()
        } else {
            quote_qualified(table, &selection.column)
        };

        let call = if selection.aggregation == crate::query::Aggregation::CountDistinct {
            format!("COUNT(DISTINCT {})", target)
        } else {
            format!("{}({})", agg, target)
        };

        selection.calculated_expression = Some(format!("{} OVER ()", call));
        selection.has_aggregation = true;
    }

    query.group_by.clear();
}

fn render_alias(aliased: bool, id: &str, name: &str) -> String {
    if aliased {
        id.to_string()
    } else {
        name.to_string()
    }
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
