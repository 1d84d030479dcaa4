//! End-to-end SQL generation: statement shapes per dialect, group-set
//! machinery, and determinism.

use strata::compile::{compile_query, CompileOptions, NoImports};
use strata::{CompileError, Dialect};

const FIXTURE: &str = r#"
    explore order_items {
        from "order_items";
        primary_key item_id;
        dimensions {
            item_id number;
            order_id number;
            name string;
            price number;
        }
    }

    explore orders {
        from "orders";
        primary_key id;
        dimensions {
            id number;
            status string;
            created_at timestamp;
            revenue number;
        }
        measures {
            order_count = count();
            total_revenue = sum(@revenue);
        }
        joins { items many order_items on order_id; }
        queries {
            by_item {
                group { items.name; }
                aggregate { item_count = items.count(); }
            }
        }
    }
"#;

fn sql_for(query: &str, dialect: Dialect) -> String {
    let source = format!("{}\n{}", FIXTURE, query);
    let options = CompileOptions::default().with_dialect(dialect);
    compile_query(&source, "q", options, &NoImports)
        .unwrap()
        .sql
}

#[test]
fn test_flat_group_shape() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
        }
        "#,
        Dialect::DuckDb,
    );

    assert!(sql.starts_with("SELECT"));
    assert!(sql.contains("base.\"status\" AS \"status\""));
    assert!(sql.contains("COUNT(*) AS \"order_count\""));
    assert!(sql.contains("FROM \"orders\" AS base"));
    assert!(sql.contains("GROUP BY 1"));
    assert!(sql.contains("ORDER BY 2 DESC"));
    // No group-set machinery without turtles
    assert!(!sql.contains("group_set"));
}

#[test]
fn test_compilation_is_idempotent() {
    let query = r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; total_revenue; }
            nest { by_item; }
            limit 10;
        }
    "#;
    let first = sql_for(query, Dialect::Postgres);
    let second = sql_for(query, Dialect::Postgres);
    assert_eq!(first, second);
}

#[test]
fn test_joined_dimension_uses_left_join() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { items.name; }
            aggregate { order_count; }
        }
        "#,
        Dialect::DuckDb,
    );

    assert!(sql.contains("LEFT JOIN \"order_items\" AS items"));
    assert!(sql.contains("items.\"order_id\" = base.\"id\""));
}

#[test]
fn test_turtle_group_set_shape_duckdb() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
            nest { by_item; }
        }
        "#,
        Dialect::DuckDb,
    );

    assert!(sql.starts_with("WITH __stage0 AS ("));
    assert!(sql.contains("CROSS JOIN GENERATE_SERIES(0,1,1)"));
    assert!(sql.contains("CASE WHEN group_set=1"));
    assert!(sql.contains("FILTER (WHERE group_set=1)"));
    assert!(sql.contains("LIST(STRUCT_PACK("));
    // The outer aggregate deduplicates: the many join fans out root rows
    assert!(sql.contains("COUNT(DISTINCT base.\"id\") FILTER (WHERE group_set=0)"));
}

#[test]
fn test_turtle_group_set_shape_postgres() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
            nest { by_item; }
        }
        "#,
        Dialect::Postgres,
    );

    assert!(sql.contains("CROSS JOIN GENERATE_SERIES(0,1,1) AS group_set"));
    assert!(sql.contains("JSONB_BUILD_OBJECT("));
    assert!(sql.contains("FILTER (WHERE group_set=1)"));
}

#[test]
fn test_turtle_group_set_shape_bigquery() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
            nest { by_item; }
        }
        "#,
        Dialect::BigQuery,
    );

    assert!(sql.contains("CROSS JOIN UNNEST(GENERATE_ARRAY(0,1)) AS group_set"));
    assert!(sql.contains("ARRAY_AGG(CASE WHEN group_set=1 THEN STRUCT("));
    // No FILTER clause on BigQuery; conditions move inside the aggregate
    assert!(!sql.contains("FILTER (WHERE"));
}

#[test]
fn test_symmetric_sum_across_fanout() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate {
                total_revenue;
                item_count = items.count();
            }
        }
        "#,
        Dialect::Postgres,
    );

    // sum over duplicated rows: hashed-key symmetric aggregate
    assert!(sql.contains("MD5("));
    assert!(sql.contains("SUM(DISTINCT"));
    // count of the many side stays plain
    assert!(sql.contains("COUNT(*) AS \"item_count\""));
}

#[test]
fn test_regex_filter_rendering() {
    let query = r#"
        query q {
            from orders;
            group { status; }
            where { status = r'^comp'; }
        }
    "#;
    let duckdb = sql_for(query, Dialect::DuckDb);
    assert!(duckdb.contains("REGEXP_MATCHES(base.\"status\", '^comp')"));

    let postgres = sql_for(query, Dialect::Postgres);
    assert!(postgres.contains("base.\"status\" ~ '^comp'"));

    let bigquery = sql_for(query, Dialect::BigQuery);
    assert!(bigquery.contains("REGEXP_CONTAINS(base.`status`, '^comp')"));
}

#[test]
fn test_turtle_filters_scope_to_their_group_set() {
    let source = r#"
        explore order_items {
            from "order_items";
            primary_key item_id;
            dimensions { item_id number; order_id number; name string; price number; }
        }

        explore orders {
            from "orders";
            primary_key id;
            dimensions { id number; status string; }
            joins { items many order_items on order_id; }
            queries {
                cheap_items {
                    group { items.name; }
                    aggregate { n = items.count(); }
                    where { items.price < 10; }
                }
            }
        }

        query q {
            from orders;
            group { status; }
            nest { cheap_items; }
        }
    "#;
    let sql = compile_query(source, "q", CompileOptions::default(), &NoImports)
        .unwrap()
        .sql;

    // The turtle's filter constrains only its own set's rows
    assert!(sql.contains("(group_set <> 1 OR ((items.\"price\" < 10)))"));
}

#[test]
fn test_null_comparison_rendering() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            where { revenue != null; }
        }
        "#,
        Dialect::DuckDb,
    );
    assert!(sql.contains("(base.\"revenue\" IS NOT NULL)"));
}

#[test]
fn test_time_literal_filter() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            where { created_at > @2023-01-05; }
        }
        "#,
        Dialect::DuckDb,
    );
    assert!(sql.contains("DATE '2023-01-05'"));
}

#[test]
fn test_multi_stage_chains_as_ctes() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
        } -> {
            project { status; }
            limit 3;
        }
        "#,
        Dialect::DuckDb,
    );

    assert!(sql.starts_with("WITH __stage0 AS ("));
    assert!(sql.contains("FROM __stage0"));
    assert!(sql.trim_end().ends_with("LIMIT 3"));
}

#[test]
fn test_index_stage_union_shape() {
    let sql = sql_for(
        r#"
        query q {
            from orders;
            index { status; items.name; }
        }
        "#,
        Dialect::DuckDb,
    );

    assert!(sql.contains("UNION ALL"));
    assert!(sql.contains("'status' AS \"field_name\""));
    assert!(sql.contains("'items.name' AS \"field_name\""));
    assert!(sql.contains("COUNT(*) AS \"weight\""));
    assert!(sql.contains("GROUP BY 1, 2"));
}

#[test]
fn test_safe_cast_unsupported_on_postgres() {
    let source = format!(
        "{}\n{}",
        FIXTURE,
        r#"
        query q {
            from orders;
            project { revenue_text; }
        }
        "#
    );
    // Add the derived dimension to a separate explore to keep the shared
    // fixture intact
    let source = source.replace(
        "measures {",
        "dimensions { revenue_text = safe_cast(@revenue, 'string'); }\n        measures {",
    );

    let options = CompileOptions::default().with_dialect(Dialect::Postgres);
    let err = compile_query(&source, "q", options, &NoImports).unwrap_err();
    match err {
        CompileError::Unsupported(u) => {
            assert_eq!(u.capability, "safe_cast");
            assert_eq!(u.dialect, "postgres");
        }
        other => panic!("expected unsupported capability, got {}", other),
    }

    // The same query is fine on DuckDB
    let options = CompileOptions::default().with_dialect(Dialect::DuckDb);
    let sql = compile_query(&source, "q", options, &NoImports).unwrap().sql;
    assert!(sql.contains("TRY_CAST("));
}

#[test]
fn test_source_filters_always_apply() {
    let source = r#"
        explore orders {
            from "orders";
            dimensions { status string; }
            where { status != 'cancelled'; }
        }
        query q {
            from orders;
            group { status; }
        }
    "#;
    let sql = compile_query(source, "q", CompileOptions::default(), &NoImports)
        .unwrap()
        .sql;
    assert!(sql.contains("WHERE (base.\"status\" <> 'cancelled')"));
}
