//! Dialect capability coverage: each backend produces valid fragments or
//! an explicit UnsupportedCapability, never silent wrong SQL.

use strata::model::types::{ExtractUnit, Timeframe, ValueType};
use strata::sql::{BigQuery, Dialect, DuckDb, Postgres, SqlDialect};

#[test]
fn test_identifier_quoting() {
    assert_eq!(DuckDb.quote_identifier("status"), "\"status\"");
    assert_eq!(Postgres.quote_identifier("status"), "\"status\"");
    assert_eq!(BigQuery.quote_identifier("status"), "`status`");
    assert_eq!(Postgres.quote_identifier("we\"ird"), "\"we\"\"ird\"");
}

#[test]
fn test_string_quoting() {
    assert_eq!(DuckDb.quote_string("it's"), "'it''s'");
    assert_eq!(BigQuery.quote_string("plain"), "'plain'");
}

#[test]
fn test_group_set_table() {
    assert_eq!(
        DuckDb.sql_group_set_table(2),
        "CROSS JOIN GENERATE_SERIES(0,2,1) AS group_set(group_set)"
    );
    assert_eq!(
        Postgres.sql_group_set_table(1),
        "CROSS JOIN GENERATE_SERIES(0,1,1) AS group_set"
    );
    assert_eq!(
        BigQuery.sql_group_set_table(3),
        "CROSS JOIN UNNEST(GENERATE_ARRAY(0,3)) AS group_set"
    );
}

#[test]
fn test_conditional_aggregation() {
    // FILTER where supported
    assert!(DuckDb.supports_aggregate_filter());
    assert_eq!(
        DuckDb.sql_conditional_aggregate("SUM", false, Some("x"), 1),
        "SUM(x) FILTER (WHERE group_set=1)"
    );
    assert_eq!(
        Postgres.sql_conditional_aggregate("COUNT", true, Some("k"), 0),
        "COUNT(DISTINCT k) FILTER (WHERE group_set=0)"
    );

    // CASE rewrite where not
    assert!(!BigQuery.supports_aggregate_filter());
    assert_eq!(
        BigQuery.sql_conditional_aggregate("SUM", false, Some("x"), 1),
        "SUM(CASE WHEN group_set=1 THEN x END)"
    );
    assert_eq!(
        BigQuery.sql_conditional_aggregate("COUNT", false, None, 2),
        "COUNTIF(group_set=2)"
    );
}

#[test]
fn test_sum_distinct_hashed_key_schemes() {
    // Per-backend schemes; no algorithm is part of the portable contract
    let duckdb = DuckDb.sql_sum_distinct_hashed_key("base.\"id\"").unwrap();
    assert!(duckdb.contains("HASH("));
    assert!(duckdb.contains("HUGEINT"));

    let postgres = Postgres.sql_sum_distinct_hashed_key("base.\"id\"").unwrap();
    assert!(postgres.contains("MD5("));
    assert!(postgres.contains("DECIMAL(65,0)"));

    let bigquery = BigQuery.sql_sum_distinct_hashed_key("base.`id`").unwrap();
    assert!(bigquery.contains("FARM_FINGERPRINT"));
}

#[test]
fn test_uuid_generation() {
    assert_eq!(DuckDb.sql_generate_uuid().unwrap(), "GEN_RANDOM_UUID()");
    assert_eq!(Postgres.sql_generate_uuid().unwrap(), "GEN_RANDOM_UUID()");
    assert_eq!(BigQuery.sql_generate_uuid().unwrap(), "GENERATE_UUID()");
}

#[test]
fn test_truncation() {
    assert_eq!(
        DuckDb.sql_trunc("x", Timeframe::Month),
        "DATE_TRUNC('month', x)"
    );
    assert_eq!(
        Postgres.sql_trunc("x", Timeframe::Year),
        "DATE_TRUNC('year', x)"
    );
    assert_eq!(
        BigQuery.sql_trunc("x", Timeframe::Month),
        "DATE_TRUNC(x, MONTH)"
    );
    // Sub-day truncation implies a timestamp operand
    assert_eq!(
        BigQuery.sql_trunc("x", Timeframe::Hour),
        "TIMESTAMP_TRUNC(x, HOUR)"
    );
}

#[test]
fn test_extraction() {
    assert_eq!(
        DuckDb.sql_extract("x", ExtractUnit::DayOfWeek),
        "EXTRACT(DAYOFWEEK FROM x)"
    );
    assert_eq!(
        BigQuery.sql_extract("x", ExtractUnit::Year),
        "EXTRACT(YEAR FROM x)"
    );
}

#[test]
fn test_time_arithmetic() {
    assert_eq!(
        DuckDb.sql_time_add("d", false, "3", Timeframe::Day),
        "(d) + (3 * INTERVAL '1 day')"
    );
    assert_eq!(
        Postgres.sql_time_add("d", true, "1", Timeframe::Month),
        "(d) - (1 * INTERVAL '1 month')"
    );
    assert_eq!(
        BigQuery.sql_time_add("d", false, "3", Timeframe::Day),
        "DATE_ADD(d, INTERVAL 3 DAY)"
    );
    assert_eq!(
        BigQuery.sql_time_add("d", true, "3", Timeframe::Day),
        "DATE_SUB(d, INTERVAL 3 DAY)"
    );
}

#[test]
fn test_cast_type_translation() {
    assert_eq!(
        DuckDb.sql_cast("x", &ValueType::Number, false).unwrap(),
        "CAST(x AS DOUBLE)"
    );
    assert_eq!(
        Postgres.sql_cast("x", &ValueType::Number, false).unwrap(),
        "CAST(x AS DOUBLE PRECISION)"
    );
    assert_eq!(
        BigQuery.sql_cast("x", &ValueType::Number, false).unwrap(),
        "CAST(x AS FLOAT64)"
    );
}

#[test]
fn test_safe_cast_support() {
    assert_eq!(
        DuckDb.sql_cast("x", &ValueType::Number, true).unwrap(),
        "TRY_CAST(x AS DOUBLE)"
    );
    assert_eq!(
        BigQuery.sql_cast("x", &ValueType::String, true).unwrap(),
        "SAFE_CAST(x AS STRING)"
    );

    // Postgres refuses rather than emitting a cast that throws
    let err = Postgres.sql_cast("x", &ValueType::Number, true).unwrap_err();
    assert_eq!(err.dialect, "postgres");
    assert_eq!(err.capability, "safe_cast");
    assert!(err.to_string().contains("safe_cast"));
}

#[test]
fn test_time_literals() {
    assert_eq!(
        DuckDb.sql_literal_time("2023-01-05", false),
        "DATE '2023-01-05'"
    );
    assert_eq!(
        Postgres.sql_literal_time("2023-01-05 10:30:00", true),
        "TIMESTAMP '2023-01-05 10:30:00'"
    );
    assert_eq!(
        BigQuery.sql_literal_time("2023-01-05", false),
        "DATE('2023-01-05')"
    );
}

#[test]
fn test_regex_match() {
    assert_eq!(
        DuckDb.sql_regexp_match("x", "'^a'").unwrap(),
        "REGEXP_MATCHES(x, '^a')"
    );
    assert_eq!(Postgres.sql_regexp_match("x", "'^a'").unwrap(), "x ~ '^a'");
    assert_eq!(
        BigQuery.sql_regexp_match("x", "'^a'").unwrap(),
        "REGEXP_CONTAINS(x, '^a')"
    );
}

#[test]
fn test_null_safe_equality() {
    assert_eq!(
        DuckDb.sql_null_safe_eq("a", "b"),
        "a IS NOT DISTINCT FROM b"
    );
    assert_eq!(
        BigQuery.sql_null_safe_eq("a", "b"),
        "(a = b OR (a IS NULL AND b IS NULL))"
    );
}

#[test]
fn test_dialect_selection() {
    assert_eq!(Dialect::parse("duckdb").unwrap(), Dialect::DuckDb);
    assert_eq!(Dialect::parse("postgres").unwrap(), Dialect::Postgres);
    assert_eq!(Dialect::parse("postgresql").unwrap(), Dialect::Postgres);
    assert_eq!(Dialect::parse("bigquery").unwrap(), Dialect::BigQuery);
    assert_eq!(Dialect::parse("oracle").unwrap_err(), "oracle");
    assert_eq!(Dialect::default(), Dialect::DuckDb);
}

#[test]
fn test_turtle_construction_per_dialect() {
    use strata::sql::DialectField;

    let fields = vec![
        DialectField {
            sql_expression: "__stage0.\"name__1\"".to_string(),
            sql_output_name: "name".to_string(),
            value_type: ValueType::String,
        },
        DialectField {
            sql_expression: "__stage0.\"n__1\"".to_string(),
            sql_output_name: "n".to_string(),
            value_type: ValueType::Number,
        },
    ];

    let duckdb = DuckDb
        .sql_aggregate_turtle(1, &fields, Some("ORDER BY __stage0.\"n__1\" DESC"), Some(5))
        .unwrap();
    assert!(duckdb.contains("LIST(STRUCT_PACK("));
    assert!(duckdb.contains("FILTER (WHERE group_set=1)"));
    assert!(duckdb.ends_with("[1:5]"));

    let postgres = Postgres
        .sql_aggregate_turtle(1, &fields, None, None)
        .unwrap();
    assert!(postgres.contains("JSONB_BUILD_OBJECT("));
    assert!(postgres.contains("FILTER (WHERE group_set=1)"));
    assert!(postgres.starts_with("TO_JSONB("));

    let bigquery = BigQuery
        .sql_aggregate_turtle(2, &fields, None, Some(3))
        .unwrap();
    assert!(bigquery.contains("ARRAY_AGG(CASE WHEN group_set=2 THEN STRUCT("));
    assert!(bigquery.contains("IGNORE NULLS"));
    assert!(bigquery.contains("LIMIT 3"));
}
