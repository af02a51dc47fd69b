use std::env;
use std::io::Write;
use std::time::Duration;

use quarry::config::{ExecutorOptions, Settings};

#[test]
fn test_settings_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[connection]
connection_string = "host=localhost dbname=analytics user=quarry"

[executor]
max_rows = 250
timeout_seconds = 10
"#
    )
    .unwrap();

    let settings = Settings::from_file(file.path()).unwrap();
    let options = settings.executor_options();

    assert_eq!(options.max_rows, 250);
    assert_eq!(options.timeout, Duration::from_secs(10));
    assert_eq!(options.target_schema, None);

    let connection = settings.connection.unwrap();
    assert_eq!(
        connection.resolved_connection_string().unwrap(),
        "host=localhost dbname=analytics user=quarry"
    );
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Settings::from_file("/nonexistent/quarry.toml").is_err());
}

#[test]
fn test_connection_string_env_expansion() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[connection]
connection_string = "host=localhost password=${{QUARRY_TEST_DB_PASSWORD}}"
"#
    )
    .unwrap();

    env::set_var("QUARRY_TEST_DB_PASSWORD", "hunter2");
    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(
        settings
            .connection
            .unwrap()
            .resolved_connection_string()
            .unwrap(),
        "host=localhost password=hunter2"
    );
    env::remove_var("QUARRY_TEST_DB_PASSWORD");
}

// One test owns the QUARRY_* variables so parallel test threads never race
// on process-wide environment state.
#[test]
fn test_executor_options_from_env() {
    env::set_var("QUARRY_MAX_ROWS", "123");
    env::set_var("QUARRY_TIMEOUT_SECONDS", "7");
    env::set_var("QUARRY_TARGET_SCHEMA", "tenant_9");

    let options = ExecutorOptions::from_env().unwrap();
    assert_eq!(options.max_rows, 123);
    assert_eq!(options.timeout, Duration::from_secs(7));
    assert_eq!(options.target_schema.as_deref(), Some("tenant_9"));

    env::set_var("QUARRY_MAX_ROWS", "lots");
    assert!(ExecutorOptions::from_env().is_err());

    env::remove_var("QUARRY_MAX_ROWS");
    env::remove_var("QUARRY_TIMEOUT_SECONDS");
    env::remove_var("QUARRY_TARGET_SCHEMA");
}

#[test]
fn test_defaults() {
    let options = ExecutorOptions::default();
    assert_eq!(options.max_rows, 10_000);
    assert_eq!(options.timeout, Duration::from_secs(30));
}
