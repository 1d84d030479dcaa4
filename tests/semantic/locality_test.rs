//! Aggregate-locality resolution: which join-tree node each aggregate is
//! computed with respect to, and when a distinct-key hint is required.

use strata::compile::{compile_model, NoImports};
use strata::planner;
use strata::planner::ir::{ColumnKind, StageIR};
use strata::semantic::error::SemanticErrorKind;

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
            revenue number;
        }
        joins { items many order_items on order_id; }
    }
"#;

fn compile_stage(query: &str) -> StageIR {
    let source = format!("{}\n{}", FIXTURE, query);
    let model = compile_model(&source, &NoImports).unwrap();
    let q = model.queries.values().next().unwrap();
    planner::compile(q).unwrap().stages.into_iter().next().unwrap()
}

fn aggregate_column<'s>(stage: &'s StageIR, name: &str) -> &'s strata::planner::ir::AggregateColumn {
    stage
        .columns
        .iter()
        .find(|c| c.name == name)
        .and_then(|c| match &c.kind {
            ColumnKind::Aggregate(agg) => Some(agg),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no aggregate column named '{}'", name))
}

#[test]
fn test_sum_above_many_join_carries_distinct_key() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate {
                total = sum(@revenue);
                item_count = items.count();
            }
        }
        "#,
    );

    // `sum(revenue)` at the root while the many join is in the row-set:
    // the root's rows duplicate, so the sum needs the root's primary key
    let total = aggregate_column(&stage, "total");
    let key = total.aggs[0]
        .distinct_key
        .as_ref()
        .expect("sum above a many join needs a distinct key");
    assert_eq!(key.sql_alias, "base");
    assert_eq!(key.column, "id");
}

#[test]
fn test_many_side_count_needs_no_dedup() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { item_count = items.count(); }
        }
        "#,
    );

    // items.count() is computed at the many side itself
    let item_count = aggregate_column(&stage, "item_count");
    assert!(item_count.aggs[0].distinct_key.is_none());
}

#[test]
fn test_min_max_skip_distinct_key_across_many_join() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate {
                low = min(@revenue);
                high = max(@revenue);
                item_count = items.count();
            }
        }
        "#,
    );

    // Fan-out is present (items is joined), but extrema are immune
    assert!(aggregate_column(&stage, "low").aggs[0].distinct_key.is_none());
    assert!(aggregate_column(&stage, "high").aggs[0].distinct_key.is_none());
}

#[test]
fn test_no_fanout_no_dedup() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { total = sum(@revenue); }
        }
        "#,
    );

    // The many join is unused, so nothing duplicates the root's rows
    assert!(aggregate_column(&stage, "total").aggs[0].distinct_key.is_none());
}

#[test]
fn test_path_form_aggregate_over_joined_field() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { total_price = items.price.sum(); }
        }
        "#,
    );

    // Locality is the field's owning node (items): no dedup needed
    assert!(aggregate_column(&stage, "total_price").aggs[0]
        .distinct_key
        .is_none());
}

#[test]
fn test_cross_join_locality_is_unresolvable() {
    let source = r#"
        explore promotions {
            from "promotions";
            primary_key promo_id;
            dimensions { promo_id number; label string; }
        }

        explore orders {
            from "orders";
            primary_key id;
            dimensions { id number; status string; }
            joins { promos cross promotions; }
        }

        query q {
            from orders;
            group { status; }
            aggregate { promo_count = promos.count(); }
        }
    "#;
    let model = compile_model(source, &NoImports).unwrap();
    let q = model.queries.values().next().unwrap();
    let err = planner::compile(q).unwrap_err();
    assert!(matches!(
        err.kind,
        SemanticErrorKind::UnresolvableLocality { .. }
    ));
}

#[test]
fn test_dedup_requires_primary_key() {
    let source = r#"
        explore order_items {
            from "order_items";
            primary_key item_id;
            dimensions { item_id number; order_id number; }
        }

        // No primary key declared: many joins need one on the source side
        explore orders {
            from "orders";
            dimensions { id number; status string; revenue number; }
            joins { items many order_items on order_id; }
        }

        query q {
            from orders;
            group { status; }
            aggregate { total = sum(@revenue); item_count = items.count(); }
        }
    "#;
    let err = compile_model(source, &NoImports).unwrap_err();
    // The join itself already demands the source primary key
    match err {
        strata::CompileError::Semantic(e) => assert!(matches!(
            e.kind,
            SemanticErrorKind::MissingPrimaryKey { .. }
        )),
        other => panic!("expected semantic error, got {}", other),
    }
}
