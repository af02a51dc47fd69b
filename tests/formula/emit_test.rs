use quarry::formula::{resolve, ParseError, TOTAL_CLOSE, TOTAL_OPEN};

fn sql(expression: &str) -> String {
    resolve(expression, "orders").unwrap().sql
}

#[test]
fn test_field_references() {
    assert_eq!(sql("[total]"), "\"orders\".\"total\"");
    assert_eq!(sql("[Customers.name]"), "\"Customers\".\"name\"");
}

#[test]
fn test_operator_rendering() {
    assert_eq!(
        sql("[a] == [b]"),
        "\"orders\".\"a\" = \"orders\".\"b\""
    );
    assert_eq!(
        sql("[a] != [b]"),
        "\"orders\".\"a\" <> \"orders\".\"b\""
    );
    assert_eq!(
        sql("[a] * ([b] + [c])"),
        "\"orders\".\"a\" * (\"orders\".\"b\" + \"orders\".\"c\")"
    );
}

#[test]
fn test_unary_negation() {
    assert_eq!(sql("-[balance]"), "-\"orders\".\"balance\"");
}

#[test]
fn test_if_and_aggregates() {
    assert_eq!(
        sql("if([qty] > 10, \"bulk\", \"single\")"),
        "CASE WHEN \"orders\".\"qty\" > 10 THEN 'bulk' ELSE 'single' END"
    );
    assert_eq!(sql("avg([total])"), "AVG(\"orders\".\"total\")");
    assert_eq!(sql("count()"), "COUNT(*)");
    assert_eq!(sql("count([id])"), "COUNT(\"orders\".\"id\")");
}

#[test]
fn test_date_functions() {
    assert_eq!(sql("date(2024, 1, 31)"), "MAKE_DATE(2024, 1, 31)");
    assert_eq!(
        sql("date(2024, 1, 31, 12, 30, 0)"),
        "MAKE_TIMESTAMP(2024, 1, 31, 12, 30, 0)"
    );
    assert_eq!(
        sql("year([created_at])"),
        "EXTRACT(YEAR FROM \"orders\".\"created_at\")"
    );
    assert_eq!(
        sql("month([created_at])"),
        "EXTRACT(MONTH FROM \"orders\".\"created_at\")"
    );
    assert_eq!(sql("today()"), "CURRENT_DATE");
}

#[test]
fn test_datediff_units_and_aliases() {
    let day = sql("datediff([a], [b], \"day\")");
    let day_alias = sql("datediff([a], [b], \"d\")");
    assert_eq!(day, day_alias);
    assert!(day.contains("DATE_PART('day'"));

    assert!(sql("datediff([a], [b], \"y\")").contains("DATE_PART('year'"));
    assert!(sql("datediff([a], [b], \"m\")").contains("* 12"));
    assert!(sql("datediff([a], [b], \"h\")").contains("/ 3600"));
    assert!(sql("datediff([a], [b], \"mi\")").contains("/ 60"));
    assert!(sql("datediff([a], [b], \"s\")").contains("DATE_PART('epoch'"));
}

#[test]
fn test_datediff_rejects_unknown_unit() {
    assert!(matches!(
        resolve("datediff([a], [b], \"fortnight\")", "orders"),
        Err(ParseError::UnknownUnit { .. })
    ));
}

#[test]
fn test_percent_of_whole_emits_placeholder() {
    let formula = resolve("sum([completed]) / count()", "orders").unwrap();
    assert!(formula.has_aggregation);
    assert!(formula.sql.contains(TOTAL_OPEN));
    assert!(formula.sql.contains(TOTAL_CLOSE));
    assert!(formula.sql.contains("NULLIF("));
}

#[test]
fn test_ratio_of_nonaggregates_is_untouched() {
    let formula = resolve("[completed] / [total]", "orders").unwrap();
    assert_eq!(
        formula.sql,
        "\"orders\".\"completed\" / \"orders\".\"total\""
    );
    assert!(!formula.has_aggregation);
}

#[test]
fn test_nested_aggregate_gets_empty_window() {
    let formula = resolve("sum(sum([x]) - [y])", "orders").unwrap();
    assert!(formula.sql.ends_with("OVER ()"));
}

#[test]
fn test_identifier_quote_escaping() {
    // A field name containing a double quote cannot break out of quoting.
    let formula = resolve("[bad\"name]", "orders").unwrap();
    assert_eq!(formula.sql, "\"orders\".\"bad\"\"name\"");
}
