//! Default ordering policy: newest first, then largest first, then
//! definition order; explicit sort always wins.

use strata::compile::{compile_model, NoImports};
use strata::model::query::OrderDir;
use strata::planner;
use strata::planner::ir::{OrderTarget, StageIR};

const FIXTURE: &str = r#"
    explore orders {
        from "orders";
        primary_key id;
        dimensions {
            id number;
            status string;
            created_at timestamp;
            revenue number;
        }
        measures { total_revenue = sum(@revenue); }
    }
"#;

fn compile_stage(query: &str) -> StageIR {
    let source = format!("{}\n{}", FIXTURE, query);
    let model = compile_model(&source, &NoImports).unwrap();
    let q = model.queries.values().next().unwrap();
    planner::compile(q).unwrap().stages.into_iter().next().unwrap()
}

#[test]
fn test_temporal_dimension_beats_measure() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; created_at; }
            aggregate { total_revenue; }
        }
        "#,
    );

    // Rule 1 over rule 2: the date dimension wins even though a measure
    // is present
    assert_eq!(stage.order_by.len(), 1);
    assert_eq!(stage.order_by[0].target, OrderTarget::Ordinal(2));
    assert_eq!(stage.order_by[0].dir, OrderDir::Desc);
}

#[test]
fn test_first_measure_descending() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { total_revenue; }
        }
        "#,
    );

    assert_eq!(stage.order_by.len(), 1);
    assert_eq!(stage.order_by[0].target, OrderTarget::Ordinal(2));
    assert_eq!(stage.order_by[0].dir, OrderDir::Desc);
}

#[test]
fn test_definition_order_ascending() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; revenue; }
        }
        "#,
    );

    assert_eq!(stage.order_by.len(), 2);
    assert_eq!(stage.order_by[0].target, OrderTarget::Ordinal(1));
    assert_eq!(stage.order_by[0].dir, OrderDir::Asc);
    assert_eq!(stage.order_by[1].target, OrderTarget::Ordinal(2));
}

#[test]
fn test_explicit_sort_overrides_defaults() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; created_at; }
            aggregate { total_revenue; }
            sort { status; }
        }
        "#,
    );

    // Explicit sort defaults to ascending and silences both rules
    assert_eq!(stage.order_by.len(), 1);
    assert_eq!(stage.order_by[0].target, OrderTarget::Ordinal(1));
    assert_eq!(stage.order_by[0].dir, OrderDir::Asc);
}

#[test]
fn test_explicit_descending_sort() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { status; }
            aggregate { total_revenue; }
            sort { total_revenue desc; status; }
        }
        "#,
    );

    assert_eq!(stage.order_by.len(), 2);
    assert_eq!(stage.order_by[0].target, OrderTarget::Ordinal(2));
    assert_eq!(stage.order_by[0].dir, OrderDir::Desc);
    assert_eq!(stage.order_by[1].target, OrderTarget::Ordinal(1));
    assert_eq!(stage.order_by[1].dir, OrderDir::Asc);
}

#[test]
fn test_date_dimension_only_newest_first() {
    let stage = compile_stage(
        r#"
        query q {
            from orders;
            group { created_at; }
        }
        "#,
    );

    assert_eq!(stage.order_by.len(), 1);
    assert_eq!(stage.order_by[0].target, OrderTarget::Ordinal(1));
    assert_eq!(stage.order_by[0].dir, OrderDir::Desc);
}
