use quarry::query::{
    Aggregation, CalculatedField, ColumnSelection, Filter, FilterOperator, GroupBy,
    QueryDefinition, Value,
};
use quarry::sql::{build, preprocess_calculated_fields};

#[test]
fn test_preprocess_is_idempotent() {
    let mut query = QueryDefinition::for_table("stats", "stats");
    query
        .calculated_fields
        .push(CalculatedField::new("share", "sum([completed]) / sum([total])"));
    query.columns.push(ColumnSelection::new("stats", "share"));
    query.columns.push(ColumnSelection::new("stats", "region"));

    let once = preprocess_calculated_fields(&query, "stats");
    let twice = preprocess_calculated_fields(&once, "stats");
    assert_eq!(once, twice);
}

#[test]
fn test_percent_of_whole_becomes_scalar_subquery() {
    let mut query = QueryDefinition::for_table("stats", "stats");
    query
        .calculated_fields
        .push(CalculatedField::new("share", "sum([completed]) / sum([total])"));
    query.columns.push(ColumnSelection::new("stats", "region"));
    query.columns.push(ColumnSelection::new("stats", "share"));
    query.group_by.push(GroupBy {
        table_id: "stats".to_string(),
        column: "region".to_string(),
    });

    let processed = preprocess_calculated_fields(&query, "stats");
    let built = build(&processed, None).unwrap();

    // The denominator keeps grouping-free scope through a scalar subquery.
    assert!(built.sql.contains(
        "SUM(\"stats\".\"completed\") / \
         NULLIF((SELECT SUM(\"stats\".\"total\") FROM \"stats\"), 0)"
    ));
    // Grouping on region survives; the ratio's denominator is unaffected.
    assert!(built.sql.contains("GROUP BY \"stats\".\"region\""));
    // No placeholder markers leak into the final SQL.
    assert!(!built.sql.contains("__QUARRY_TOTAL__"));
    assert!(!built.sql.contains("__END_TOTAL__"));
}

#[test]
fn test_scalar_subquery_reuses_where_clause() {
    let mut query = QueryDefinition::for_table("stats", "stats");
    query
        .calculated_fields
        .push(CalculatedField::new("share", "sum([completed]) / sum([total])"));
    query.columns.push(ColumnSelection::new("stats", "share"));
    query.filters.push(Filter::new(
        "stats",
        "year",
        FilterOperator::Eq,
        Value::Int(2024),
    ));

    let built = build(&preprocess_calculated_fields(&query, "stats"), None).unwrap();
    assert!(built.sql.contains(
        "(SELECT SUM(\"stats\".\"total\") FROM \"stats\" WHERE \"stats\".\"year\" = $1)"
    ));
    // One value, referenced from both the outer WHERE and the subquery.
    assert_eq!(built.params, vec![Value::Int(2024)]);
}

#[test]
fn test_window_field_rewrites_siblings_and_clears_group_by() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query
        .calculated_fields
        .push(CalculatedField::new("grand_total", "sum(sum([total]))"));
    query.columns.push(ColumnSelection::new("orders", "grand_total"));
    query.columns.push(
        ColumnSelection::new("orders", "total").with_aggregation(Aggregation::Sum),
    );
    query.group_by.push(GroupBy {
        table_id: "orders".to_string(),
        column: "status".to_string(),
    });

    let built = build(&preprocess_calculated_fields(&query, "orders"), None).unwrap();
    assert!(built.sql.contains("SUM(SUM(\"orders\".\"total\")) OVER ()"));
    assert!(built.sql.contains("SUM(\"orders\".\"total\") OVER ()"));
    assert!(!built.sql.contains("GROUP BY"));
}

#[test]
fn test_calculated_filter_compiles_against_expression() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query
        .calculated_fields
        .push(CalculatedField::new("margin", "[price] - [cost]"));
    query.columns.push(ColumnSelection::new("orders", "id"));
    query.filters.push(Filter::new(
        "orders",
        "margin",
        FilterOperator::Gt,
        Value::Int(0),
    ));

    let built = build(&preprocess_calculated_fields(&query, "orders"), None).unwrap();
    assert!(built
        .sql
        .contains("WHERE \"orders\".\"price\" - \"orders\".\"cost\" > $1"));
}

#[test]
fn test_broken_field_is_dropped_not_fatal() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query
        .calculated_fields
        .push(CalculatedField::new("broken", "sum([total]"));
    query.columns.push(ColumnSelection::new("orders", "id"));

    // The broken field never resolves, but the query still compiles.
    let built = build(&preprocess_calculated_fields(&query, "orders"), None).unwrap();
    assert!(built.sql.contains("\"orders\".\"id\""));
}

#[test]
fn test_calculated_column_keeps_field_name_as_alias() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query
        .calculated_fields
        .push(CalculatedField::new("margin", "[price] - [cost]"));
    query.columns.push(ColumnSelection::new("orders", "margin"));

    let built = build(&preprocess_calculated_fields(&query, "orders"), None).unwrap();
    assert!(built.sql.contains("AS \"margin\""));
}
