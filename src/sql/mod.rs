//! SQL generation.
//!
//! - [`quote`] - identifier and literal quoting for the target dialect
//! - [`preprocess`] - calculated-field splicing and window-conflict rewrite
//! - [`builder`] - the query-definition-to-SQL transform

pub mod builder;
pub mod preprocess;
pub mod quote;

pub use builder::{build, explain_sql, BuildError, BuiltQuery};
pub use preprocess::preprocess_calculated_fields;
