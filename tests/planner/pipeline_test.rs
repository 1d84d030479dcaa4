//! Pipeline compilation: group-set flattening, stage sequencing, and the
//! pipeline-level failure modes.

use strata::compile::{compile_model, compile_query, CompileOptions, NoImports};
use strata::planner;
use strata::planner::ir::{ColumnKind, CompiledPipeline, StageKind};
use strata::semantic::error::SemanticErrorKind;
use strata::CompileError;

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
            by_price {
                group { items.price; }
                aggregate { item_count = items.count(); }
            }
        }
    }
"#;

fn compile_fixture_query(query: &str) -> Result<CompiledPipeline, CompileError> {
    let source = format!("{}\n{}", FIXTURE, query);
    let model = compile_model(&source, &NoImports)?;
    let q = model.queries.values().next().expect("query parsed");
    Ok(planner::compile(q)?)
}

fn semantic_kind(err: CompileError) -> SemanticErrorKind {
    match err {
        CompileError::Semantic(e) => e.kind,
        other => panic!("expected semantic error, got {}", other),
    }
}

#[test]
fn test_no_turtles_means_no_group_sets() {
    let compiled = compile_fixture_query(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
        }
        "#,
    )
    .unwrap();

    assert_eq!(compiled.stages.len(), 1);
    let stage = &compiled.stages[0];
    assert_eq!(stage.group_set_count, 1);
    assert!(stage.turtles.is_empty());
}

#[test]
fn test_one_turtle_two_group_sets() {
    let compiled = compile_fixture_query(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
            nest { by_item; }
        }
        "#,
    )
    .unwrap();

    let stage = &compiled.stages[0];
    assert_eq!(stage.group_set_count, 2);
    assert_eq!(stage.turtles.len(), 1);
    assert_eq!(stage.turtles[0].group_set, 1);
    assert_eq!(stage.turtles[0].name, "by_item");
}

#[test]
fn test_two_turtles_three_group_sets() {
    let compiled = compile_fixture_query(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
            nest { by_item; by_price; }
        }
        "#,
    )
    .unwrap();

    let stage = &compiled.stages[0];
    assert_eq!(stage.group_set_count, 3);
    assert_eq!(stage.turtles[0].group_set, 1);
    assert_eq!(stage.turtles[1].group_set, 2);
}

#[test]
fn test_project_stage_rejects_measures() {
    let err = compile_fixture_query(
        r#"
        query q {
            from orders;
            project { total_revenue; }
        }
        "#,
    )
    .unwrap_err();

    assert_eq!(
        semantic_kind(err),
        SemanticErrorKind::ProjectMeasure {
            field: "total_revenue".to_string()
        }
    );
}

#[test]
fn test_empty_pipeline_is_rejected() {
    let err = compile_fixture_query(
        r#"
        query q {
            from orders;
        }
        "#,
    )
    .unwrap_err();

    assert_eq!(
        semantic_kind(err),
        SemanticErrorKind::EmptyPipeline {
            query: "q".to_string()
        }
    );
}

#[test]
fn test_circular_query_reference_is_detected() {
    let source = r#"
        explore t {
            from "t";
            primary_key id;
            dimensions { id number; status string; }
            measures { n = count(); }
            queries {
                loop_q {
                    group { status; }
                    aggregate { n; }
                    nest { loop_q; }
                }
            }
        }

        query q {
            from t;
            group { status; }
            nest { loop_q; }
        }
    "#;
    let model = compile_model(source, &NoImports).unwrap();
    let q = model.queries.values().next().unwrap();
    let err = planner::compile(q).unwrap_err();
    assert_eq!(
        err.kind,
        SemanticErrorKind::CircularQueryReference {
            name: "loop_q".to_string()
        }
    );
}

#[test]
fn test_measures_become_dimensions_downstream() {
    // total_revenue is a measure in stage 1 and a plain dimension in
    // stage 2: projecting it is legal there
    let compiled = compile_fixture_query(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { total_revenue; }
        } -> {
            project { total_revenue; }
            limit 3;
        }
        "#,
    )
    .unwrap();

    assert_eq!(compiled.stages.len(), 2);
    assert_eq!(compiled.stages[1].kind, StageKind::Project);
    assert!(matches!(
        compiled.stages[1].columns[0].kind,
        ColumnKind::Dimension { .. }
    ));
}

#[test]
fn test_spec_scenario_orders_items_count() {
    // group by id, count the many side: locality is `items`, no dedup
    let compiled = compile_fixture_query(
        r#"
        query q {
            from orders;
            group { id; }
            aggregate { item_count is items.count(); }
        }
        "#,
    )
    .unwrap();

    let stage = &compiled.stages[0];
    assert_eq!(stage.group_set_count, 1);
    let agg = stage
        .columns
        .iter()
        .find_map(|c| match &c.kind {
            ColumnKind::Aggregate(a) if c.name == "item_count" => Some(a),
            _ => None,
        })
        .expect("item_count column");
    assert!(agg.aggs[0].distinct_key.is_none());
}

#[test]
fn test_result_shape_nests_turtle_columns() {
    let compiled = compile_fixture_query(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { order_count; }
            nest { by_item; }
        }
        "#,
    )
    .unwrap();

    let shape = &compiled.result_shape;
    assert_eq!(shape.columns.len(), 3);
    assert_eq!(shape.columns[0].name, "status");
    assert!(shape.columns[0].nested.is_none());
    assert_eq!(shape.columns[2].name, "by_item");
    let nested = shape.columns[2].nested.as_ref().expect("turtle shape");
    let nested_names: Vec<&str> = nested.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(nested_names, vec!["name", "item_count"]);
}

#[test]
fn test_unknown_query_name_at_compile() {
    let err = compile_query(
        FIXTURE,
        "missing_query",
        CompileOptions::default(),
        &NoImports,
    )
    .unwrap_err();
    assert_eq!(
        semantic_kind(err),
        SemanticErrorKind::UnknownQuery {
            name: "missing_query".to_string()
        }
    );
}

#[test]
fn test_index_stage_shape() {
    let compiled = compile_fixture_query(
        r#"
        query q {
            from orders;
            index { status; items.name; }
        }
        "#,
    )
    .unwrap();

    let stage = &compiled.stages[0];
    assert_eq!(stage.kind, StageKind::Index);
    assert_eq!(stage.index_fields.len(), 2);
    assert_eq!(stage.index_fields[1].name, "items.name");
    let names: Vec<&str> = compiled
        .result_shape
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["field_name", "field_value", "weight"]);
}
