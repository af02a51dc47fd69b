//! Exposed-schema model.
//!
//! A [`Schema`] is the immutable description of the tables an embedding
//! application chooses to expose: table and column names, introspected data
//! types, nullability, primary keys, and foreign-key relationships. It is
//! produced by external introspection and consumed read-only by the
//! validator, the SQL builder, and the raw-SQL allow-list.

use serde::{Deserialize, Serialize};

/// Broad type family of a column, derived from its introspected type name.
///
/// The validator reasons in families rather than concrete database types:
/// aggregation legality and filter-literal compatibility only need to know
/// whether a column is numeric, textual, temporal, or boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Numeric,
    Text,
    Temporal,
    Boolean,
    Other,
}

/// Classify a database type name into a [`TypeFamily`].
///
/// Matches on lower-cased substrings so both `information_schema` names
/// (`character varying`, `timestamp without time zone`) and short names
/// (`varchar`, `timestamptz`) classify the same way.
pub fn type_family(data_type: &str) -> TypeFamily {
    let ty = data_type.to_ascii_lowercase();

    if ty.contains("bool") {
        return TypeFamily::Boolean;
    }
    // Temporal before numeric: "interval" would otherwise match "int".
    if ty.contains("date") || ty.contains("time") || ty.contains("interval") {
        return TypeFamily::Temporal;
    }
    if ty.contains("int")
        || ty.contains("serial")
        || ty.contains("numeric")
        || ty.contains("decimal")
        || ty.contains("float")
        || ty.contains("double")
        || ty.contains("real")
        || ty.contains("money")
    {
        return TypeFamily::Numeric;
    }
    if ty.contains("char") || ty.contains("text") || ty.contains("uuid") || ty.contains("citext") {
        return TypeFamily::Text;
    }

    TypeFamily::Other
}

/// A column of an exposed table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as introspected.
    pub name: String,

    /// Database-specific type name (e.g. `integer`, `character varying`).
    pub data_type: String,

    /// Whether NULL values are allowed.
    #[serde(default)]
    pub nullable: bool,

    /// Whether this column is part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
}

impl Column {
    /// Type family of this column.
    pub fn family(&self) -> TypeFamily {
        type_family(&self.data_type)
    }

    /// Whether the column can be summed/averaged.
    pub fn is_numeric(&self) -> bool {
        self.family() == TypeFamily::Numeric
    }
}

/// An exposed table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name as introspected.
    pub name: String,

    /// Columns in declaration order.
    pub columns: Vec<Column>,
}

impl Table {
    /// Look up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Whether the table has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// All column names, in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A foreign-key relationship between two exposed tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// The set of exposed tables and their relationships.
///
/// Invariants (enforced by the producing introspection, relied upon here):
/// table names are unique within a schema, column names are unique within a
/// table, and relationships reference only tables present in the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Schema {
    /// Build a schema from tables, with no relationships.
    pub fn new(tables: Vec<Table>) -> Self {
        Self {
            tables,
            relationships: Vec::new(),
        }
    }

    /// Look up a table by name, case-insensitively.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Whether a table with this name is exposed.
    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// All exposed table names, in declaration order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Relationships that start from the given table.
    pub fn relationships_from(&self, table: &str) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| r.from_table.eq_ignore_ascii_case(table))
            .collect()
    }
}
