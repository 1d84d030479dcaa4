//! PostgreSQL SQL dialect.
//!
//! Nested output is encoded as JSONB: ARRAY_AGG of JSONB_BUILD_OBJECT,
//! sliced for limits, then TO_JSONB for the final array value. The dedup
//! key splits an MD5 digest into two 64-bit lanes recombined as a
//! DECIMAL(65,0), collision-resistant and summable.

use crate::model::types::{Timeframe, ValueType};

use super::helpers;
use super::{DialectField, DialectResult, SqlDialect, UnsupportedCapability};

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
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
        format!("CROSS JOIN GENERATE_SERIES(0,{},1) AS group_set", max_group_set)
    }

    // Uses default sql_conditional_aggregate (FILTER clause)

    fn sql_aggregate_turtle(
        &self,
        group_set: usize,
        fields: &[DialectField],
        order_by: Option<&str>,
        limit: Option<u64>,
    ) -> DialectResult<String> {
        let pairs = fields
            .iter()
            .map(|f| {
                format!(
                    "{}, {}",
                    helpers::quote_string_single(&f.sql_output_name),
                    f.sql_expression
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let order = order_by.map(|o| format!(" {}", o)).unwrap_or_default();
        let slice = limit.map(|l| format!("[1:{}]", l)).unwrap_or_default();
        Ok(format!(
            "TO_JSONB((ARRAY_AGG(JSONB_BUILD_OBJECT({}){} ) FILTER (WHERE group_set={})){})",
            pairs, order, group_set, slice
        ))
    }

    fn sql_sum_distinct_hashed_key(&self, key_sql: &str) -> DialectResult<String> {
        Ok(format!(
            "('x' || MD5({key}::varchar))::bit(64)::bigint::DECIMAL(65,0) \
             * 18446744073709551616 + \
             ('x' || SUBSTR(MD5({key}::varchar), 17))::bit(64)::bigint::DECIMAL(65,0)",
            key = key_sql
        ))
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
            ValueType::Number => "DOUBLE PRECISION",
            ValueType::Bool => "BOOLEAN",
            ValueType::Date => "DATE",
            ValueType::Timestamp => "TIMESTAMP",
            _ => {
                return Err(UnsupportedCapability {
                    dialect: self.name(),
                    capability: "casting to a non-scalar type",
                })
            }
        })
    }

    fn sql_cast(&self, expr: &str, ty: &ValueType, safe: bool) -> DialectResult<String> {
        if safe {
            // No TRY_CAST before PG 16's error-safe casts; refuse rather
            // than emit a cast with different failure semantics.
            return Err(UnsupportedCapability {
                dialect: self.name(),
                capability: "safe_cast",
            });
        }
        let type_name = self.cast_type_name(ty)?;
        Ok(format!("CAST({} AS {})", expr, type_name))
    }

    fn sql_regexp_match(&self, expr: &str, pattern_sql: &str) -> DialectResult<String> {
        Ok(format!("{} ~ {}", expr, pattern_sql))
    }
}
