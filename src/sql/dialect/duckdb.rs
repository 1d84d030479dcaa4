//! DuckDB SQL dialect, the reference backend.
//!
//! DuckDB is Postgres-compatible with extensions that make nested output
//! cheap: LIST/STRUCT_PACK aggregation with array slicing for limits,
//! FILTER on aggregates, TRY_CAST for safe casting, and a native HASH
//! function for dedup keys.

use crate::model::types::{Timeframe, ValueType};

use super::helpers;
use super::{DialectField, DialectResult, SqlDialect};

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn sql_literal_time(&self, value: &str, timestamp: bool) -> String {
        if timestamp {
            format!("TIMESTAMP '{}'", value)
        } else {
            format!("DATE '{}'", value)
        }
    }

    fn sql_group_set_table(&self, max_group_set: usize) -> String {
        format!(
            "CROSS JOIN GENERATE_SERIES(0,{},1) AS group_set(group_set)",
            max_group_set
        )
    }

    // Uses default sql_conditional_aggregate (FILTER clause)

    fn sql_aggregate_turtle(
        &self,
        group_set: usize,
        fields: &[DialectField],
        order_by: Option<&str>,
        limit: Option<u64>,
    ) -> DialectResult<String> {
        let packed = fields
            .iter()
            .map(|f| format!("{} := {}", self.quote_identifier(&f.sql_output_name), f.sql_expression))
            .collect::<Vec<_>>()
            .join(", ");
        let order = order_by.map(|o| format!(" {}", o)).unwrap_or_default();
        let tail = limit.map(|l| format!("[1:{}]", l)).unwrap_or_default();
        Ok(format!(
            "(LIST(STRUCT_PACK({}){} ) FILTER (WHERE group_set={})){}",
            packed, order, group_set, tail
        ))
    }

    fn sql_sum_distinct_hashed_key(&self, key_sql: &str) -> DialectResult<String> {
        Ok(format!("HASH({})::HUGEINT", key_sql))
    }

    fn sql_generate_uuid(&self) -> DialectResult<String> {
        Ok("GEN_RANDOM_UUID()".to_string())
    }

    fn sql_trunc(&self, expr: &str, unit: Timeframe) -> String {
        format!("DATE_TRUNC('{}', {})", unit.as_str(), expr)
    }

    fn sql_time_add(&self, expr: &str, negative: bool, amount: &str, unit: Timeframe) -> String {
        let op = if negative { "-" } else { "+" };
        format!(
            "({}) {} ({} * INTERVAL '1 {}')",
            expr,
            op,
            amount,
            unit.as_str()
        )
    }

    fn cast_type_name(&self, ty: &ValueType) -> DialectResult<&'static str> {
        Ok(match ty {
            ValueType::String => "VARCHAR",
            ValueType::Number => "DOUBLE",
            ValueType::Bool => "BOOLEAN",
            ValueType::Date => "DATE",
            ValueType::Timestamp => "TIMESTAMP",
            _ => {
                return Err(super::UnsupportedCapability {
                    dialect: self.name(),
                    capability: "casting to a non-scalar type",
                })
            }
        })
    }

    fn sql_cast(&self, expr: &str, ty: &ValueType, safe: bool) -> DialectResult<String> {
        let type_name = self.cast_type_name(ty)?;
        Ok(if safe {
            format!("TRY_CAST({} AS {})", expr, type_name)
        } else {
            format!("CAST({} AS {})", expr, type_name)
        })
    }

    fn sql_regexp_match(&self, expr: &str, pattern_sql: &str) -> DialectResult<String> {
        Ok(format!("REGEXP_MATCHES({}, {})", expr, pattern_sql))
    }
}
