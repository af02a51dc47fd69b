//! Query definition AST.
//!
//! A [`QueryDefinition`] is the structured description of an analytics query
//! an embedding application hands to the engine: table references, joins,
//! column selections, filters, grouping and ordering, calculated fields, and
//! row-window settings. Definitions are immutable once built; everything that
//! "changes" one (limit rewriting, filter injection) produces a new value.

mod value;

pub use value::Value;

use serde::{Deserialize, Serialize};

/// A table participating in a query.
///
/// `id` is a caller-chosen handle, unique within one definition, used to
/// disambiguate repeated or aliased use of the same schema table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTable {
    pub id: String,
    pub name: String,
}

impl QueryTable {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether this reference renders with an alias (`... AS "id"`).
    pub fn is_aliased(&self) -> bool {
        !self.id.eq_ignore_ascii_case(&self.name)
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

/// A join between two declared query tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub from_table_id: String,
    pub from_column: String,
    pub to_table_id: String,
    pub to_column: String,
    pub join_type: JoinType,
}

/// Aggregation applied to a column selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    None,
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
}

impl Aggregation {
    /// SQL function name, or `None` for no aggregation.
    pub fn sql_name(&self) -> Option<&'static str> {
        match self {
            Aggregation::None => None,
            Aggregation::Sum => Some("SUM"),
            Aggregation::Avg => Some("AVG"),
            Aggregation::Count | Aggregation::CountDistinct => Some("COUNT"),
            Aggregation::Min => Some("MIN"),
            Aggregation::Max => Some("MAX"),
        }
    }

    /// Whether this aggregation requires a numeric input column.
    ///
    /// COUNT and COUNT DISTINCT accept any type; MIN/MAX are restricted to
    /// numerics here because mixed-type extrema are not portable across
    /// result consumers.
    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            Aggregation::Sum | Aggregation::Avg | Aggregation::Min | Aggregation::Max
        )
    }
}

/// One projected column.
///
/// Exactly one of `column` (a schema column or `*`) or a resolved
/// `calculated_expression` drives the emitted SQL. `calculated_expression`
/// and `has_aggregation` are filled in by calculated-field preprocessing,
/// not by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub table_id: String,
    pub column: String,

    #[serde(default)]
    pub aggregation: Aggregation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// DATE_TRUNC unit (`minute`, `hour`, `day`, `week`, `month`,
    /// `quarter`, `year`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_trunc: Option<String>,

    /// Resolved calculated-field SQL, spliced in by preprocessing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_expression: Option<String>,

    /// Whether the resolved expression already aggregates.
    #[serde(default)]
    pub has_aggregation: bool,
}

impl ColumnSelection {
    pub fn new(table_id: &str, column: &str) -> Self {
        Self {
            table_id: table_id.to_string(),
            column: column.to_string(),
            aggregation: Aggregation::None,
            alias: None,
            date_trunc: None,
            calculated_expression: None,
            has_aggregation: false,
        }
    }

    #[must_use]
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    #[must_use]
    pub fn with_date_trunc(mut self, unit: &str) -> Self {
        self.date_trunc = Some(unit.to_string());
        self
    }

    /// Whether this selection aggregates, either through an explicit
    /// aggregation or a resolved expression that aggregates internally.
    pub fn aggregates(&self) -> bool {
        self.aggregation != Aggregation::None || self.has_aggregation
    }
}

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    InOrNull,
    InSubquery,
    Like,
    NotLike,
    Between,
}

impl FilterOperator {
    /// Whether the operator compares against a list of values.
    pub fn takes_sequence(&self) -> bool {
        matches!(
            self,
            FilterOperator::In | FilterOperator::InOrNull | FilterOperator::Between
        )
    }
}

/// A WHERE predicate on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub table_id: String,
    pub column: String,
    pub operator: FilterOperator,

    #[serde(default = "default_null")]
    pub value: Value,

    /// Nested definition for `in_subquery`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subquery: Option<Box<QueryDefinition>>,

    /// Resolved calculated-field SQL, spliced in by preprocessing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_expression: Option<String>,
}

fn default_null() -> Value {
    Value::Null
}

impl Filter {
    pub fn new(table_id: &str, column: &str, operator: FilterOperator, value: Value) -> Self {
        Self {
            table_id: table_id.to_string(),
            column: column.to_string(),
            operator,
            value,
            subquery: None,
            calculated_expression: None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// A GROUP BY entry: a literal column or a calculated-field alias already
/// present in the selection list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    pub table_id: String,
    pub column: String,
}

/// An ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub table_id: String,
    pub column: String,

    #[serde(default)]
    pub direction: SortDirection,
}

/// A named calculated field in the formula language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedField {
    pub name: String,
    pub expression: String,
}

impl CalculatedField {
    pub fn new(name: &str, expression: &str) -> Self {
        Self {
            name: name.to_string(),
            expression: expression.to_string(),
        }
    }
}

/// Time-bucketing configuration.
///
/// Contributes a `DATE_TRUNC` bucket column plus grouping/ordering at the
/// builder layer. `fill_missing` is carried for post-processing consumers;
/// gap filling is not a SQL-layer concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    pub table_id: String,
    pub date_column: String,
    pub interval: String,

    #[serde(default)]
    pub fill_missing: bool,
}

/// The complete query definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    #[serde(default)]
    pub tables: Vec<QueryTable>,

    #[serde(default)]
    pub joins: Vec<Join>,

    #[serde(default)]
    pub columns: Vec<ColumnSelection>,

    #[serde(default)]
    pub filters: Vec<Filter>,

    #[serde(default)]
    pub group_by: Vec<GroupBy>,

    #[serde(default)]
    pub sort_by: Vec<Sort>,

    #[serde(default)]
    pub calculated_fields: Vec<CalculatedField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<TimeSeriesConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl QueryDefinition {
    /// A definition selecting from a single table.
    pub fn for_table(id: &str, name: &str) -> Self {
        Self {
            tables: vec![QueryTable::new(id, name)],
            ..Self::default()
        }
    }

    /// Resolve a table id to its declaration.
    pub fn table_by_id(&self, id: &str) -> Option<&QueryTable> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// A copy of this definition with the given limit.
    #[must_use]
    pub fn with_limit(&self, limit: u64) -> Self {
        let mut query = self.clone();
        query.limit = Some(limit);
        query
    }

    /// Look up a calculated field by name.
    pub fn calculated_field(&self, name: &str) -> Option<&CalculatedField> {
        self.calculated_fields.iter().find(|f| f.name == name)
    }
}
