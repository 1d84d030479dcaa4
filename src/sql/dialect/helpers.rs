//! Shared helper functions for SQL dialect implementations.
//!
//! Reusable building blocks the dialects compose to implement `SqlDialect`
//! with minimal duplication.

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: BigQuery
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

// =============================================================================
// Conditional Aggregation
// =============================================================================

/// The aggregate call itself, before any group-set conditioning:
/// `SUM(x)`, `COUNT(*)`, `COUNT(DISTINCT x)`.
pub fn plain_aggregate(func: &str, distinct: bool, inner: Option<&str>) -> String {
    match inner {
        Some(inner) if distinct => format!("{}(DISTINCT {})", func, inner),
        Some(inner) => format!("{}({})", func, inner),
        None => format!("{}(*)", func),
    }
}

/// Conditional aggregation via the SQL:2003 FILTER clause.
/// Used by: Postgres, DuckDB
pub fn conditional_aggregate_filter(
    func: &str,
    distinct: bool,
    inner: Option<&str>,
    group_set: usize,
) -> String {
    format!(
        "{} FILTER (WHERE group_set={})",
        plain_aggregate(func, distinct, inner),
        group_set
    )
}

/// Conditional aggregation via a CASE rewrite of the aggregated
/// expression, for engines without FILTER.
/// Used by: BigQuery
pub fn conditional_aggregate_case(
    func: &str,
    distinct: bool,
    inner: Option<&str>,
    group_set: usize,
) -> String {
    match inner {
        Some(inner) => plain_aggregate(
            func,
            distinct,
            Some(&format!("CASE WHEN group_set={} THEN {} END", group_set, inner)),
        ),
        // COUNT(*) has no expression to rewrite; count matching rows
        None => format!("COUNTIF(group_set={})", group_set),
    }
}

/// Null-safe equality via IS NOT DISTINCT FROM.
/// Used by: Postgres, DuckDB
pub fn null_safe_eq_distinct(left: &str, right: &str) -> String {
    format!("{} IS NOT DISTINCT FROM {}", left, right)
}
