//! BigQuery (Standard SQL) dialect.
//!
//! No FILTER clause, so conditional aggregation rewrites the aggregated
//! expression with CASE (COUNTIF for bare counts). Nested output uses
//! native ARRAY_AGG of STRUCTs with IGNORE NULLS; dedup keys use
//! FARM_FINGERPRINT.

use crate::model::types::{Timeframe, ValueType};

use super::helpers;
use super::{DialectField, DialectResult, SqlDialect, UnsupportedCapability};

/// BigQuery SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn sql_literal_time(&self, value: &str, timestamp: bool) -> String {
        if timestamp {
            format!("TIMESTAMP('{}')", value)
        } else {
            format!("DATE('{}')", value)
        }
    }

    fn sql_group_set_table(&self, max_group_set: usize) -> String {
        format!(
            "CROSS JOIN UNNEST(GENERATE_ARRAY(0,{})) AS group_set",
            max_group_set
        )
    }

    fn sql_any_value(&self, expr: &str) -> String {
        format!("MAX({})", expr)
    }

    fn supports_aggregate_filter(&self) -> bool {
        false
    }

    fn sql_conditional_aggregate(
        &self,
        func: &str,
        distinct: bool,
        inner: Option<&str>,
        group_set: usize,
    ) -> String {
        helpers::conditional_aggregate_case(func, distinct, inner, group_set)
    }

    fn sql_aggregate_turtle(
        &self,
        group_set: usize,
        fields: &[DialectField],
        order_by: Option<&str>,
        limit: Option<u64>,
    ) -> DialectResult<String> {
        let struct_fields = fields
            .iter()
            .map(|f| {
                format!(
                    "{} AS {}",
                    f.sql_expression,
                    self.quote_identifier(&f.sql_output_name)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let order = order_by.map(|o| format!(" {}", o)).unwrap_or_default();
        let tail = limit.map(|l| format!(" LIMIT {}", l)).unwrap_or_default();
        Ok(format!(
            "ARRAY_AGG(CASE WHEN group_set={} THEN STRUCT({}) END IGNORE NULLS{}{})",
            group_set, struct_fields, order, tail
        ))
    }

    fn sql_sum_distinct_hashed_key(&self, key_sql: &str) -> DialectResult<String> {
        Ok(format!("FARM_FINGERPRINT(CAST({} AS STRING))", key_sql))
    }

    fn sql_generate_uuid(&self) -> DialectResult<String> {
        Ok("GENERATE_UUID()".to_string())
    }

    fn sql_trunc(&self, expr: &str, unit: Timeframe) -> String {
        // Sub-day truncation implies a timestamp operand
        if unit.requires_timestamp() {
            format!("TIMESTAMP_TRUNC({}, {})", expr, unit.as_str().to_uppercase())
        } else {
            format!("DATE_TRUNC({}, {})", expr, unit.as_str().to_uppercase())
        }
    }

    fn sql_time_add(&self, expr: &str, negative: bool, amount: &str, unit: Timeframe) -> String {
        let func = match (negative, unit.requires_timestamp()) {
            (false, false) => "DATE_ADD",
            (true, false) => "DATE_SUB",
            (false, true) => "TIMESTAMP_ADD",
            (true, true) => "TIMESTAMP_SUB",
        };
        format!(
            "{}({}, INTERVAL {} {})",
            func,
            expr,
            amount,
            unit.as_str().to_uppercase()
        )
    }

    fn cast_type_name(&self, ty: &ValueType) -> DialectResult<&'static str> {
        Ok(match ty {
            ValueType::String => "STRING",
            ValueType::Number => "FLOAT64",
            ValueType::Bool => "BOOL",
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
        let type_name = self.cast_type_name(ty)?;
        Ok(if safe {
            format!("SAFE_CAST({} AS {})", expr, type_name)
        } else {
            format!("CAST({} AS {})", expr, type_name)
        })
    }

    fn sql_regexp_match(&self, expr: &str, pattern_sql: &str) -> DialectResult<String> {
        Ok(format!("REGEXP_CONTAINS({}, {})", expr, pattern_sql))
    }

    fn sql_null_safe_eq(&self, left: &str, right: &str) -> String {
        format!(
            "({l} = {r} OR ({l} IS NULL AND {r} IS NULL))",
            l = left,
            r = right
        )
    }
}
