use quarry::rawsql::{validate_raw_sql, SqlValidationError};
use quarry::schema::{Column, Schema, Table};

fn table(name: &str, columns: &[&str]) -> Table {
    Table {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|c| Column {
                name: c.to_string(),
                data_type: "text".to_string(),
                nullable: true,
                is_primary_key: false,
            })
            .collect(),
    }
}

fn schema() -> Schema {
    Schema::new(vec![
        table("orders", &["id", "status", "total_amount"]),
        table("customers", &["id", "email"]),
    ])
}

#[test]
fn test_exposed_tables_pass_and_are_reported() {
    let result = validate_raw_sql(
        "SELECT o.id, c.email FROM orders o JOIN customers c ON o.id = c.id",
        &schema(),
    )
    .unwrap();

    assert_eq!(result.tables, vec!["orders", "customers"]);
}

#[test]
fn test_unexposed_table_is_a_hard_failure() {
    let err = validate_raw_sql("SELECT * FROM secrets", &schema()).unwrap_err();
    match err {
        SqlValidationError::TablesNotAllowed { ref tables } => assert_eq!(tables, &vec!["secrets"]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains("secrets"));
}

#[test]
fn test_every_offender_is_named_once() {
    let sql = "SELECT * FROM a, b, a";
    let err = validate_raw_sql(sql, &schema()).unwrap_err();
    match err {
        SqlValidationError::TablesNotAllowed { tables } => {
            assert_eq!(tables, vec!["a", "b"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_write_statements_rejected() {
    for sql in [
        "INSERT INTO orders (id) VALUES (1)",
        "UPDATE orders SET status = 'x'",
        "DELETE FROM orders",
        "DROP TABLE orders",
    ] {
        let err = validate_raw_sql(sql, &schema()).unwrap_err();
        assert!(
            matches!(err, SqlValidationError::NotReadOnly { .. }),
            "{} should be rejected, got {:?}",
            sql,
            err
        );
    }
}

#[test]
fn test_multiple_statements_rejected() {
    let err = validate_raw_sql("SELECT 1; DROP TABLE orders", &schema()).unwrap_err();
    assert!(matches!(err, SqlValidationError::MultipleStatements { .. }));
}

#[test]
fn test_select_into_rejected_even_in_union() {
    let sql = "SELECT id FROM orders UNION SELECT id INTO stolen FROM customers";
    let err = validate_raw_sql(sql, &schema()).unwrap_err();
    assert_eq!(err, SqlValidationError::SelectInto);
}

#[test]
fn test_subqueries_are_allow_listed_too() {
    let sql = "SELECT * FROM orders WHERE id IN (SELECT id FROM audit_log)";
    let err = validate_raw_sql(sql, &schema()).unwrap_err();
    match err {
        SqlValidationError::TablesNotAllowed { tables } => {
            assert_eq!(tables, vec!["audit_log"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_derived_tables_are_checked() {
    let sql = "SELECT * FROM (SELECT * FROM hidden) AS h";
    assert!(matches!(
        validate_raw_sql(sql, &schema()),
        Err(SqlValidationError::TablesNotAllowed { .. })
    ));
}

#[test]
fn test_cte_references_do_not_count_as_tables() {
    let sql = "WITH top_orders AS (SELECT * FROM orders LIMIT 10) \
               SELECT * FROM top_orders";
    let result = validate_raw_sql(sql, &schema()).unwrap();
    assert_eq!(result.tables, vec!["orders"]);
}

#[test]
fn test_canonical_form_is_executed_not_original_text() {
    let result = validate_raw_sql("select  id \n from  orders", &schema()).unwrap();
    assert_eq!(result.sql, "SELECT id FROM orders");
}

#[test]
fn test_table_names_match_case_insensitively() {
    let result = validate_raw_sql("SELECT * FROM ORDERS", &schema()).unwrap();
    assert_eq!(result.tables, vec!["ORDERS"]);
}
