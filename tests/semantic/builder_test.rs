//! Model building: field typing, aggregate-shape invariants, regex
//! validation, and join wiring.

use strata::compile::{compile_model, NoImports};
use strata::model::{AggregateFunc, FieldDef, JoinKind, ValueType};
use strata::semantic::error::SemanticErrorKind;
use strata::CompileError;

fn semantic_kind(err: CompileError) -> SemanticErrorKind {
    match err {
        CompileError::Semantic(e) => e.kind,
        other => panic!("expected semantic error, got {}", other),
    }
}

#[test]
fn test_measure_records_aggregate_kind_and_type() {
    let source = r#"
        explore t {
            from "t";
            dimensions { revenue number; created_at timestamp; }
            measures {
                total = sum(@revenue);
                latest = max(@created_at);
                n = count();
            }
        }
    "#;
    let model = compile_model(source, &NoImports).unwrap();
    let t = model.explore("t").unwrap();

    match t.space.lookup("total").unwrap().definition() {
        FieldDef::Measure(m) => {
            assert_eq!(m.agg, AggregateFunc::Sum);
            assert_eq!(m.value_type, ValueType::Number);
        }
        other => panic!("expected measure, got {:?}", other),
    }
    match t.space.lookup("latest").unwrap().definition() {
        FieldDef::Measure(m) => {
            assert_eq!(m.agg, AggregateFunc::Max);
            assert_eq!(m.value_type, ValueType::Timestamp);
        }
        other => panic!("expected measure, got {:?}", other),
    }
    match t.space.lookup("n").unwrap().definition() {
        FieldDef::Measure(m) => assert_eq!(m.agg, AggregateFunc::Count),
        other => panic!("expected measure, got {:?}", other),
    }
}

#[test]
fn test_derived_measure_inherits_kind_from_reference() {
    let source = r#"
        explore t {
            from "t";
            dimensions { revenue number; cost number; }
            measures {
                total = sum(@revenue);
                total_cost = sum(@cost);
                margin = total - total_cost;
            }
        }
    "#;
    let model = compile_model(source, &NoImports).unwrap();
    let t = model.explore("t").unwrap();
    match t.space.lookup("margin").unwrap().definition() {
        FieldDef::Measure(m) => assert_eq!(m.agg, AggregateFunc::Sum),
        other => panic!("expected measure, got {:?}", other),
    }
}

#[test]
fn test_dimension_with_aggregate_is_rejected() {
    let source = r#"
        explore t {
            from "t";
            dimensions {
                revenue number;
                bad = sum(@revenue);
            }
        }
    "#;
    assert_eq!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::AggregateInDimension {
            field: "bad".to_string()
        }
    );
}

#[test]
fn test_measure_without_aggregate_is_rejected() {
    let source = r#"
        explore t {
            from "t";
            dimensions { revenue number; }
            measures { bad = @revenue + 1; }
        }
    "#;
    assert_eq!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::MeasureWithoutAggregate {
            field: "bad".to_string()
        }
    );
}

#[test]
fn test_invalid_regex_is_rejected_at_build_time() {
    let source = r#"
        explore t {
            from "t";
            dimensions { name string; }
            where { name = r'[unclosed'; }
        }
    "#;
    assert!(matches!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::InvalidRegex { .. }
    ));
}

#[test]
fn test_regex_compared_to_number_is_rejected() {
    let source = r#"
        explore t {
            from "t";
            dimensions {
                revenue number;
                bad = @revenue = r'abc';
            }
        }
    "#;
    assert!(matches!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::RegexComparison { .. }
    ));
}

#[test]
fn test_unknown_function_is_rejected() {
    let source = r#"
        explore t {
            from "t";
            dimensions {
                name string;
                bad = sounds_like(@name);
            }
        }
    "#;
    assert_eq!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::UnknownFunction {
            name: "sounds_like".to_string()
        }
    );
}

#[test]
fn test_registry_functions_type_check() {
    let source = r#"
        explore t {
            from "t";
            dimensions {
                name string;
                loud = upper(@name);
                len = length(@name);
            }
        }
    "#;
    let model = compile_model(source, &NoImports).unwrap();
    let t = model.explore("t").unwrap();
    assert_eq!(
        t.space.lookup("loud").unwrap().value_type(),
        Some(&ValueType::String)
    );
    assert_eq!(
        t.space.lookup("len").unwrap().value_type(),
        Some(&ValueType::Number)
    );
}

#[test]
fn test_arithmetic_on_strings_is_rejected() {
    let source = r#"
        explore t {
            from "t";
            dimensions {
                name string;
                bad = @name + 1;
            }
        }
    "#;
    assert!(matches!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::TypeMismatch { .. }
    ));
}

#[test]
fn test_unknown_explore_in_query() {
    let source = r#"
        query q {
            from nowhere;
            group { x; }
        }
    "#;
    assert_eq!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::UnknownExplore {
            name: "nowhere".to_string()
        }
    );
}

#[test]
fn test_join_kinds_and_predicates() {
    let source = r#"
        explore customers {
            from "customers";
            primary_key customer_id;
            dimensions { customer_id number; name string; }
        }
        explore order_items {
            from "order_items";
            primary_key item_id;
            dimensions { item_id number; order_id number; }
        }
        explore orders {
            from "orders";
            primary_key id;
            dimensions { id number; customer_id number; }
            joins {
                customer one customers on customer_id;
                items many order_items on order_id;
            }
        }
    "#;
    let model = compile_model(source, &NoImports).unwrap();
    let orders = model.explore("orders").unwrap();

    let customer = orders.join("customer").unwrap();
    assert_eq!(customer.kind, JoinKind::One);
    let items = orders.join("items").unwrap();
    assert_eq!(items.kind, JoinKind::Many);
    assert!(!JoinKind::One.fans_out());
    assert!(JoinKind::Many.fans_out());
    assert!(JoinKind::Cross.fans_out());
}

#[test]
fn test_extends_inherits_fields_joins_and_primary_key() {
    let source = r#"
        explore order_items {
            from "order_items";
            primary_key item_id;
            dimensions { item_id number; order_id number; price number; }
        }
        explore orders {
            from "orders";
            primary_key id;
            dimensions { id number; status string; }
            joins { items many order_items on order_id; }
        }
        explore big_orders {
            from orders;
            measures { item_value = items.price.sum(); }
            where { status != 'cancelled'; }
        }
    "#;
    let model = compile_model(source, &NoImports).unwrap();
    let big = model.explore("big_orders").unwrap();

    assert_eq!(big.primary_key.as_deref(), Some("id"));
    assert_eq!(big.base_table(), Some("orders"));
    assert!(big.join("items").is_some());
    assert!(big.space.lookup("status").is_some());
    assert!(big.space.lookup("item_value").is_some());
    assert_eq!(big.all_filters().len(), 1);
}

#[test]
fn test_mixed_stage_blocks_rejected() {
    let source = r#"
        explore t {
            from "t";
            dimensions { a string; }
        }
        query q {
            from t;
            group { a; }
            project { a; }
        }
    "#;
    assert!(matches!(
        semantic_kind(compile_model(source, &NoImports).unwrap_err()),
        SemanticErrorKind::MixedStageBlocks { .. }
    ));
}
