//! # Quarry
//!
//! An embeddable analytics query engine: applications describe a relational
//! query as structured data and Quarry compiles it to parameterized
//! PostgreSQL, executes it under row and time budgets, and returns a uniform
//! tabular result.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            QueryDefinition (structured data)             │
//! │   (tables, joins, columns, filters, calculated fields)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validate]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Diagnostics (codes, paths, suggestions)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │ valid
//!                          ▼ [formula + sql]
//! ┌─────────────────────────────────────────────────────────┐
//! │          Parameterized SQL ($n placeholders)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [exec]
//! ┌─────────────────────────────────────────────────────────┐
//! │     QueryResult (normalized rows, truncation flag)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Raw SQL takes a parallel path: [`rawsql`] allow-lists it against the same
//! schema, then [`exec`] wraps it in a row-limiting CTE and runs it.
//!
//! The compilation stages ([`validate`], [`formula`], [`sql`]) are pure
//! functions of `(QueryDefinition, Schema)`: no shared mutable state, safe
//! to call concurrently against one schema from any number of callers. Only
//! the executor holds a connection.

pub mod config;
pub mod exec;
pub mod formula;
pub mod query;
pub mod rawsql;
pub mod schema;
pub mod sql;
pub mod validate;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{ExecutorOptions, Settings};
    pub use crate::exec::{
        ExecuteError, PgConnection, QueryConnection, QueryExecutor, QueryResult,
    };
    pub use crate::query::{
        Aggregation, CalculatedField, ColumnSelection, Filter, FilterOperator, GroupBy, Join,
        JoinType, QueryDefinition, QueryTable, Sort, SortDirection, TimeSeriesConfig, Value,
    };
    pub use crate::rawsql::{validate_raw_sql, SanitizedSql, SqlValidationError};
    pub use crate::schema::{Column, Relationship, Schema, Table};
    pub use crate::sql::{build, preprocess_calculated_fields, BuiltQuery};
    pub use crate::validate::{
        validate, validate_detailed, Diagnostic, ErrorCode, ValidationOutcome,
    };
}

// Also export the workhorse types at the crate root.
pub use config::ExecutorOptions;
pub use exec::{ExecuteError, QueryExecutor, QueryResult};
pub use query::{QueryDefinition, Value};
pub use schema::Schema;
pub use validate::{validate, validate_detailed, ValidationOutcome};
