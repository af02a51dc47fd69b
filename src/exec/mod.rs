//! Query execution.
//!
//! The executor is the only component that touches a shared resource. Each
//! call validates, builds, applies the effective row cap, runs the statement
//! under both a per-connection statement timeout and a wall-clock budget,
//! restores the timeout regardless of outcome, and normalizes the result.
//! Compilation-time problems come back as structured values; execution-time
//! problems are distinct error kinds so callers can choose retry policies.

pub mod connection;
pub mod normalize;
pub mod params;

pub use connection::{ConnectionError, PgConnection, QueryConnection, ResultColumn, ResultSet};

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ExecutorOptions;
use crate::query::{QueryDefinition, Value};
use crate::rawsql::{validate_raw_sql, SqlValidationError};
use crate::schema::Schema;
use crate::sql::{build, explain_sql, preprocess_calculated_fields, BuildError, BuiltQuery};
use crate::validate::{validate_detailed, Diagnostic, ValidationOutcome};

/// Errors from query execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The definition failed validation; nothing reached the datastore.
    #[error("query failed validation with {} error(s)", .0.len())]
    Validation(Vec<Diagnostic>),

    /// Raw SQL failed the safety validator; nothing reached the datastore.
    #[error(transparent)]
    RawSql(#[from] SqlValidationError),

    /// The builder rejected the definition (unvalidated input).
    #[error("failed to build SQL: {0}")]
    Build(#[from] BuildError),

    /// The wall-clock budget elapsed. Often retryable with a narrower query.
    #[error("query exceeded the {seconds}s execution budget")]
    Timeout { seconds: u64 },

    /// The datastore rejected or failed the statement.
    #[error("query execution failed: {message}")]
    Execution { message: String, sql: String },

    /// A named parameter was referenced in raw SQL but never supplied.
    #[error("named parameter '{0}' was referenced but not supplied")]
    MissingParameter(String),
}

/// Uniform tabular result.
///
/// Invariants: `columns`, `column_types`, and every row have equal length;
/// missing values are explicit nulls, never omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub column_types: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

/// Orchestrates validation, SQL building, and execution against one
/// connection. Pure compilation is reusable without a connection through
/// [`QueryExecutor::compile`] and the free functions in [`crate::validate`]
/// and [`crate::sql`].
pub struct QueryExecutor<C> {
    connection: C,
    schema: Schema,
    options: ExecutorOptions,
}

impl<C: QueryConnection> QueryExecutor<C> {
    pub fn new(connection: C, schema: Schema, options: ExecutorOptions) -> Self {
        Self {
            connection,
            schema,
            options,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Legacy validation: error messages only.
    pub fn validate(&self, query: &QueryDefinition) -> Vec<String> {
        crate::validate::validate(query, &self.schema)
    }

    /// Structured validation.
    pub fn validate_detailed(&self, query: &QueryDefinition) -> ValidationOutcome {
        validate_detailed(query, &self.schema)
    }

    /// Validate, preprocess, and build a definition without executing it.
    pub fn compile(&self, query: &QueryDefinition) -> Result<BuiltQuery, ExecuteError> {
        let outcome = validate_detailed(query, &self.schema);
        if !outcome.valid {
            return Err(ExecuteError::Validation(outcome.errors));
        }

        let base_table = query
            .tables
            .first()
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let processed = preprocess_calculated_fields(query, &base_table);

        Ok(build(&processed, self.options.target_schema.as_deref())?)
    }

    /// Execute a definition under the configured row cap and timeout.
    pub async fn execute(&self, query: &QueryDefinition) -> Result<QueryResult, ExecuteError> {
        self.execute_capped(query, self.options.max_rows).await
    }

    /// Execute with a tighter row cap, for inexpensive previews.
    pub async fn preview(
        &self,
        query: &QueryDefinition,
        limit: u64,
    ) -> Result<QueryResult, ExecuteError> {
        self.execute_capped(query, limit.min(self.options.max_rows))
            .await
    }

    /// Validate and execute caller-supplied SQL.
    ///
    /// The sanitized statement is wrapped in a row-limiting CTE; `:name`
    /// parameters are rewritten to the positional form first.
    pub async fn execute_raw_sql(
        &self,
        sql: &str,
        named_params: Option<&BTreeMap<String, Value>>,
    ) -> Result<QueryResult, ExecuteError> {
        let empty = BTreeMap::new();
        let (positional, values) =
            params::bind_named_params(sql, named_params.unwrap_or(&empty))?;

        let sanitized = validate_raw_sql(&positional, &self.schema)?;
        info!(tables = ?sanitized.tables, "raw SQL validated");

        let cap = self.options.max_rows;
        let wrapped = format!(
            "WITH \"raw_source\" AS ({}) SELECT * FROM \"raw_source\" LIMIT {}",
            sanitized.sql,
            cap + 1
        );

        self.run(&wrapped, &values, cap, true).await
    }

    /// Execute the datastore's plan facility over the built SQL and return
    /// the plan document.
    pub async fn explain(&self, query: &QueryDefinition) -> Result<Value, ExecuteError> {
        let built = self.compile(query)?;
        let sql = explain_sql(&built);
        let result_set = self.fetch_guarded(&sql, &[]).await?;

        Ok(result_set
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(Value::Null))
    }

    async fn execute_capped(
        &self,
        query: &QueryDefinition,
        cap: u64,
    ) -> Result<QueryResult, ExecuteError> {
        // Run with one spare row past the cap so "exactly cap rows exist"
        // and "results were truncated" are distinguishable.
        let (definition, capped) = match query.limit {
            Some(limit) if limit <= cap => (query.clone(), false),
            _ => (query.with_limit(cap + 1), true),
        };

        let built = self.compile(&definition)?;
        self.run(&built.sql, &built.params, cap, capped).await
    }

    async fn run(
        &self,
        sql: &str,
        params: &[Value],
        cap: u64,
        capped: bool,
    ) -> Result<QueryResult, ExecuteError> {
        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%execution_id, "executing statement");

        let result_set = self.fetch_guarded(sql, params).await?;

        let mut rows = result_set.rows;
        let mut truncated = false;
        if capped && rows.len() as u64 > cap {
            rows.truncate(cap as usize);
            truncated = true;
        }

        let elapsed = started.elapsed().as_millis() as u64;
        info!(
            %execution_id,
            rows = rows.len(),
            truncated,
            elapsed_ms = elapsed,
            "statement finished"
        );

        Ok(QueryResult {
            columns: result_set.columns.iter().map(|c| c.name.clone()).collect(),
            column_types: result_set
                .columns
                .iter()
                .map(|c| c.data_type.clone())
                .collect(),
            row_count: rows.len(),
            rows,
            truncated,
            execution_time_ms: elapsed,
        })
    }

    /// Fetch under the statement timeout and wall-clock budget; the timeout
    /// setting is restored whether or not the fetch succeeded.
    async fn fetch_guarded(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<ResultSet, ExecuteError> {
        self.connection
            .set_statement_timeout(self.options.timeout)
            .await
            .map_err(|err| ExecuteError::Execution {
                message: err.to_string(),
                sql: sql.to_string(),
            })?;

        let outcome =
            tokio::time::timeout(self.options.timeout, self.connection.fetch(sql, params)).await;

        if let Err(err) = self.connection.reset_statement_timeout().await {
            warn!(error = %err, "failed to restore statement timeout");
        }

        match outcome {
            Err(_) => {
                warn!(seconds = self.options.timeout.as_secs(), "statement timed out");
                Err(ExecuteError::Timeout {
                    seconds: self.options.timeout.as_secs(),
                })
            }
            Ok(Err(err)) => Err(ExecuteError::Execution {
                message: err.to_string(),
                sql: sql.to_string(),
            }),
            Ok(Ok(result_set)) => Ok(result_set),
        }
    }
}
