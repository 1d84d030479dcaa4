//! SQL dialect definitions: the capability interface each backend
//! implements.
//!
//! Every method is a pure string-to-string function; no I/O, no connection
//! state. The pipeline IR is dialect-agnostic, and the generator calls
//! through this trait for everything engine-specific:
//!
//! - Identifier quoting: `"` (Postgres/DuckDB), `` ` `` (BigQuery)
//! - Group-set table generation and per-group-set conditional aggregation
//! - Struct/array construction for nested turtle output
//! - Collision-resistant dedup keys for fan-out-safe aggregation
//! - Date/timestamp truncation, extraction, and interval arithmetic
//! - Safe casts with a per-dialect type-name translation table
//! - Time literal rendering
//!
//! A capability an engine cannot express must return
//! `UnsupportedCapability`; silent incorrect SQL is a defect, not an
//! acceptable degradation.

mod bigquery;
mod duckdb;
pub mod helpers;
mod postgres;

pub use bigquery::BigQuery;
pub use duckdb::DuckDb;
pub use postgres::Postgres;

use std::fmt;

use crate::model::types::{ExtractUnit, Timeframe, ValueType};

/// Result type for dialect capabilities.
pub type DialectResult<T> = Result<T, UnsupportedCapability>;

/// A capability the target engine cannot express.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedCapability {
    pub dialect: &'static str,
    pub capability: &'static str,
}

impl fmt::Display for UnsupportedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dialect '{}' does not support {}",
            self.dialect, self.capability
        )
    }
}

impl std::error::Error for UnsupportedCapability {}

/// One field of a turtle struct: the inner SQL expression and the output
/// name it should carry inside the array elements.
#[derive(Debug, Clone)]
pub struct DialectField {
    pub sql_expression: String,
    pub sql_output_name: String,
    pub value_type: ValueType,
}

/// SQL dialect trait: one method per capability, checked at compile time
/// of the implementation.
pub trait SqlDialect: fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Quoting and literals
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    /// Render a date or timestamp literal.
    fn sql_literal_time(&self, value: &str, timestamp: bool) -> String;

    // =========================================================================
    // Group sets
    // =========================================================================

    /// The clause that replicates each source row once per group set,
    /// introducing the `group_set` discriminator column. `max_group_set`
    /// is the largest id (ids run 0..=max_group_set).
    fn sql_group_set_table(&self, max_group_set: usize) -> String;

    /// Pick the single non-null value of `expr` within a group (used to
    /// carry scope-0 aggregates through the final grouping).
    fn sql_any_value(&self, expr: &str) -> String {
        format!("MAX({})", expr)
    }

    /// Whether the engine supports the SQL:2003 FILTER clause.
    fn supports_aggregate_filter(&self) -> bool {
        true
    }

    /// An aggregate restricted to one group set.
    fn sql_conditional_aggregate(
        &self,
        func: &str,
        distinct: bool,
        inner: Option<&str>,
        group_set: usize,
    ) -> String {
        helpers::conditional_aggregate_filter(func, distinct, inner, group_set)
    }

    // =========================================================================
    // Nested output
    // =========================================================================

    /// Collapse one group set's rows into an ordered array of structs:
    /// the physical encoding of a nested turtle column.
    fn sql_aggregate_turtle(
        &self,
        group_set: usize,
        fields: &[DialectField],
        order_by: Option<&str>,
        limit: Option<u64>,
    ) -> DialectResult<String>;

    // =========================================================================
    // Deduplication
    // =========================================================================

    /// A collision-resistant numeric key over `key_sql`, used for
    /// fan-out-safe SUM/AVG (`SUM(DISTINCT key + x) - SUM(DISTINCT key)`).
    /// The hashing scheme is per-backend, not a portable contract.
    fn sql_sum_distinct_hashed_key(&self, key_sql: &str) -> DialectResult<String>;

    /// Generate a UUID, for synthesizing distinct keys where no primary
    /// key exists.
    fn sql_generate_uuid(&self) -> DialectResult<String>;

    // =========================================================================
    // Time
    // =========================================================================

    /// Truncate a date/timestamp expression to a timeframe.
    fn sql_trunc(&self, expr: &str, unit: Timeframe) -> String;

    /// Extract a component from a date/timestamp expression.
    fn sql_extract(&self, expr: &str, unit: ExtractUnit) -> String {
        format!("EXTRACT({} FROM {})", unit.as_str(), expr)
    }

    /// Interval arithmetic on a date/timestamp expression.
    fn sql_time_add(&self, expr: &str, negative: bool, amount: &str, unit: Timeframe) -> String;

    // =========================================================================
    // Casts
    // =========================================================================

    /// The engine's type name for a value type.
    fn cast_type_name(&self, ty: &ValueType) -> DialectResult<&'static str>;

    /// A cast, optionally safe (NULL on conversion failure).
    fn sql_cast(&self, expr: &str, ty: &ValueType, safe: bool) -> DialectResult<String>;

    // =========================================================================
    // Comparison
    // =========================================================================

    /// A regex match predicate. `pattern_sql` is an already-quoted string.
    fn sql_regexp_match(&self, expr: &str, pattern_sql: &str) -> DialectResult<String>;

    /// Null-safe equality, for joining nested CTEs back by grouping key.
    fn sql_null_safe_eq(&self, left: &str, right: &str) -> String {
        helpers::null_safe_eq_distinct(left, right)
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
    BigQuery,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::BigQuery => &BigQuery,
        }
    }

    /// Parse a dialect name as supplied by a caller. The error carries
    /// the unrecognized name.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name {
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "bigquery" => Ok(Dialect::BigQuery),
            other => Err(other.to_string()),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::parse(s)
    }
}

// Delegate the trait to the concrete implementations so a `Dialect` value
// can be used anywhere a `&dyn SqlDialect` is expected.
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn sql_literal_time(&self, value: &str, timestamp: bool) -> String {
        self.dialect().sql_literal_time(value, timestamp)
    }

    fn sql_group_set_table(&self, max_group_set: usize) -> String {
        self.dialect().sql_group_set_table(max_group_set)
    }

    fn sql_any_value(&self, expr: &str) -> String {
        self.dialect().sql_any_value(expr)
    }

    fn supports_aggregate_filter(&self) -> bool {
        self.dialect().supports_aggregate_filter()
    }

    fn sql_conditional_aggregate(
        &self,
        func: &str,
        distinct: bool,
        inner: Option<&str>,
        group_set: usize,
    ) -> String {
        self.dialect()
            .sql_conditional_aggregate(func, distinct, inner, group_set)
    }

    fn sql_aggregate_turtle(
        &self,
        group_set: usize,
        fields: &[DialectField],
        order_by: Option<&str>,
        limit: Option<u64>,
    ) -> DialectResult<String> {
        self.dialect()
            .sql_aggregate_turtle(group_set, fields, order_by, limit)
    }

    fn sql_sum_distinct_hashed_key(&self, key_sql: &str) -> DialectResult<String> {
        self.dialect().sql_sum_distinct_hashed_key(key_sql)
    }

    fn sql_generate_uuid(&self) -> DialectResult<String> {
        self.dialect().sql_generate_uuid()
    }

    fn sql_trunc(&self, expr: &str, unit: Timeframe) -> String {
        self.dialect().sql_trunc(expr, unit)
    }

    fn sql_extract(&self, expr: &str, unit: ExtractUnit) -> String {
        self.dialect().sql_extract(expr, unit)
    }

    fn sql_time_add(&self, expr: &str, negative: bool, amount: &str, unit: Timeframe) -> String {
        self.dialect().sql_time_add(expr, negative, amount, unit)
    }

    fn cast_type_name(&self, ty: &ValueType) -> DialectResult<&'static str> {
        self.dialect().cast_type_name(ty)
    }

    fn sql_cast(&self, expr: &str, ty: &ValueType, safe: bool) -> DialectResult<String> {
        self.dialect().sql_cast(expr, ty, safe)
    }

    fn sql_regexp_match(&self, expr: &str, pattern_sql: &str) -> DialectResult<String> {
        self.dialect().sql_regexp_match(expr, pattern_sql)
    }

    fn sql_null_safe_eq(&self, left: &str, right: &str) -> String {
        self.dialect().sql_null_safe_eq(left, right)
    }
}
