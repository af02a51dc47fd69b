use quarry::query::{
    Aggregation, ColumnSelection, Filter, FilterOperator, GroupBy, Join, JoinType,
    QueryDefinition, QueryTable, Sort, SortDirection, TimeSeriesConfig, Value,
};
use quarry::sql::{build, explain_sql};

fn revenue_query() -> QueryDefinition {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.columns.push(
        ColumnSelection::new("orders", "total_amount")
            .with_aggregation(Aggregation::Sum)
            .with_alias("revenue"),
    );
    query.filters.push(Filter::new(
        "orders",
        "status",
        FilterOperator::Eq,
        Value::Str("completed".into()),
    ));
    query
}

#[test]
fn test_revenue_scenario() {
    let built = build(&revenue_query(), None).unwrap();

    assert_eq!(
        built.sql,
        "SELECT SUM(\"orders\".\"total_amount\") AS \"revenue\" FROM \"orders\" \
         WHERE \"orders\".\"status\" = $1"
    );
    assert_eq!(built.params, vec![Value::Str("completed".into())]);
}

#[test]
fn test_build_is_deterministic() {
    let query = revenue_query();
    let first = build(&query, None).unwrap();
    let second = build(&query, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_eq_null_compiles_to_is_null() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "shipped_at",
        FilterOperator::Eq,
        Value::Null,
    ));

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains("\"orders\".\"shipped_at\" IS NULL"));
    assert!(built.params.is_empty());
}

#[test]
fn test_ne_null_compiles_to_is_not_null() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "shipped_at",
        FilterOperator::Ne,
        Value::Null,
    ));

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains("\"orders\".\"shipped_at\" IS NOT NULL"));
}

#[test]
fn test_empty_in_list_compiles_to_false() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "status",
        FilterOperator::In,
        Value::Array(vec![]),
    ));

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains("WHERE FALSE"));
    assert!(!built.sql.contains("IN ()"));
    assert!(built.params.is_empty());
}

#[test]
fn test_in_list_gets_one_placeholder_per_value() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "status",
        FilterOperator::In,
        Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())]),
    ));

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains("\"orders\".\"status\" IN ($1, $2)"));
    assert_eq!(built.params.len(), 2);
}

#[test]
fn test_in_or_null() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "status",
        FilterOperator::InOrNull,
        Value::Array(vec![Value::Str("a".into())]),
    ));

    let built = build(&query, None).unwrap();
    assert!(built
        .sql
        .contains("(\"orders\".\"status\" IN ($1) OR \"orders\".\"status\" IS NULL)"));
}

#[test]
fn test_like_wraps_pattern() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "status",
        FilterOperator::Like,
        Value::Str("pend".into()),
    ));

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains("\"orders\".\"status\" LIKE $1"));
    assert_eq!(built.params, vec![Value::Str("%pend%".into())]);
}

#[test]
fn test_between() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "total_amount",
        FilterOperator::Between,
        Value::Array(vec![Value::Int(10), Value::Int(100)]),
    ));

    let built = build(&query, None).unwrap();
    assert!(built
        .sql
        .contains("\"orders\".\"total_amount\" BETWEEN $1 AND $2"));
    assert_eq!(built.params, vec![Value::Int(10), Value::Int(100)]);
}

#[test]
fn test_join_rendering() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.tables.push(QueryTable::new("customers", "customers"));
    query.joins.push(Join {
        from_table_id: "orders".to_string(),
        from_column: "customer_id".to_string(),
        to_table_id: "customers".to_string(),
        to_column: "id".to_string(),
        join_type: JoinType::Left,
    });
    query.columns.push(ColumnSelection::new("customers", "name"));

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains(
        "FROM \"orders\" LEFT JOIN \"customers\" \
         ON \"orders\".\"customer_id\" = \"customers\".\"id\""
    ));
}

#[test]
fn test_aliased_table_reference() {
    let mut query = QueryDefinition::for_table("o1", "orders");
    query.columns.push(ColumnSelection::new("o1", "id"));

    let built = build(&query, None).unwrap();
    assert_eq!(
        built.sql,
        "SELECT \"o1\".\"id\" FROM \"orders\" AS \"o1\""
    );
}

#[test]
fn test_self_join_through_aliases() {
    let mut query = QueryDefinition::for_table("emp", "employees");
    query.tables.push(QueryTable::new("mgr", "employees"));
    query.joins.push(Join {
        from_table_id: "emp".to_string(),
        from_column: "manager_id".to_string(),
        to_table_id: "mgr".to_string(),
        to_column: "id".to_string(),
        join_type: JoinType::Inner,
    });

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains(
        "FROM \"employees\" AS \"emp\" INNER JOIN \"employees\" AS \"mgr\" \
         ON \"emp\".\"manager_id\" = \"mgr\".\"id\""
    ));
}

#[test]
fn test_target_schema_qualifies_tables() {
    let built = build(&revenue_query(), Some("tenant_7")).unwrap();
    assert!(built.sql.contains("FROM \"tenant_7\".\"orders\""));
}

#[test]
fn test_date_trunc_and_order_by_mirror() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.columns.push(
        ColumnSelection::new("orders", "created_at")
            .with_date_trunc("month")
            .with_alias("month"),
    );
    query.columns.push(
        ColumnSelection::new("orders", "total_amount").with_aggregation(Aggregation::Sum),
    );
    query.group_by.push(GroupBy {
        table_id: "orders".to_string(),
        column: "month".to_string(),
    });
    query.sort_by.push(Sort {
        table_id: "orders".to_string(),
        column: "month".to_string(),
        direction: SortDirection::Desc,
    });

    let built = build(&query, None).unwrap();
    assert!(built
        .sql
        .contains("DATE_TRUNC('month', \"orders\".\"created_at\") AS \"month\""));
    assert!(built
        .sql
        .contains("GROUP BY DATE_TRUNC('month', \"orders\".\"created_at\")"));
    assert!(built
        .sql
        .contains("ORDER BY DATE_TRUNC('month', \"orders\".\"created_at\") DESC"));
}

#[test]
fn test_group_by_omitted_for_pure_aggregates() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.columns.push(
        ColumnSelection::new("orders", "total_amount").with_aggregation(Aggregation::Sum),
    );

    let built = build(&query, None).unwrap();
    assert!(!built.sql.contains("GROUP BY"));
}

#[test]
fn test_group_by_skips_aggregated_entries() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.columns.push(ColumnSelection::new("orders", "status"));
    query.columns.push(
        ColumnSelection::new("orders", "total_amount")
            .with_aggregation(Aggregation::Sum)
            .with_alias("revenue"),
    );
    query.group_by.push(GroupBy {
        table_id: "orders".to_string(),
        column: "status".to_string(),
    });
    query.group_by.push(GroupBy {
        table_id: "orders".to_string(),
        column: "revenue".to_string(),
    });

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains("GROUP BY \"orders\".\"status\""));
    assert!(!built.sql.contains("GROUP BY \"orders\".\"status\", "));
}

#[test]
fn test_limit_and_offset_are_literals() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.limit = Some(50);
    query.offset = Some(100);

    let built = build(&query, None).unwrap();
    assert!(built.sql.ends_with("LIMIT 50 OFFSET 100"));
}

#[test]
fn test_count_distinct() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.columns.push(
        ColumnSelection::new("orders", "customer_id")
            .with_aggregation(Aggregation::CountDistinct),
    );

    let built = build(&query, None).unwrap();
    assert!(built
        .sql
        .contains("COUNT(DISTINCT \"orders\".\"customer_id\")"));
}

#[test]
fn test_in_subquery_shares_parameter_numbering() {
    let mut inner = QueryDefinition::for_table("customers", "customers");
    inner.columns.push(ColumnSelection::new("customers", "id"));
    inner.filters.push(Filter::new(
        "customers",
        "email",
        FilterOperator::Like,
        Value::Str("example.com".into()),
    ));

    let mut query = QueryDefinition::for_table("orders", "orders");
    query.filters.push(Filter::new(
        "orders",
        "status",
        FilterOperator::Eq,
        Value::Str("completed".into()),
    ));
    let mut sub = Filter::new(
        "orders",
        "customer_id",
        FilterOperator::InSubquery,
        Value::Null,
    );
    sub.subquery = Some(Box::new(inner));
    query.filters.push(sub);

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains(
        "\"orders\".\"customer_id\" IN (SELECT \"customers\".\"id\" FROM \"customers\" \
         WHERE \"customers\".\"email\" LIKE $2)"
    ));
    assert_eq!(
        built.params,
        vec![
            Value::Str("completed".into()),
            Value::Str("%example.com%".into())
        ]
    );
}

#[test]
fn test_time_series_contributes_bucket_grouping_and_order() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query.columns.push(
        ColumnSelection::new("orders", "total_amount").with_aggregation(Aggregation::Sum),
    );
    query.time_series = Some(TimeSeriesConfig {
        table_id: "orders".to_string(),
        date_column: "created_at".to_string(),
        interval: "day".to_string(),
        fill_missing: false,
    });

    let built = build(&query, None).unwrap();
    assert!(built.sql.starts_with(
        "SELECT DATE_TRUNC('day', \"orders\".\"created_at\") AS \"time_bucket\""
    ));
    assert!(built
        .sql
        .contains("GROUP BY DATE_TRUNC('day', \"orders\".\"created_at\")"));
    assert!(built
        .sql
        .contains("ORDER BY DATE_TRUNC('day', \"orders\".\"created_at\") ASC"));
}

#[test]
fn test_explain_wraps_and_inlines() {
    let built = build(&revenue_query(), None).unwrap();
    let explain = explain_sql(&built);

    assert!(explain.starts_with("EXPLAIN (ANALYZE, FORMAT JSON) SELECT"));
    assert!(explain.contains("= 'completed'"));
    assert!(!explain.contains("$1"));
}

#[test]
fn test_quote_characters_in_identifiers_cannot_escape() {
    let mut query = QueryDefinition::for_table("orders", "orders");
    query
        .columns
        .push(ColumnSelection::new("orders", "evil\"col"));

    let built = build(&query, None).unwrap();
    assert!(built.sql.contains("\"evil\"\"col\""));
}
