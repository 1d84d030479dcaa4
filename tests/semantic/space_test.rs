//! Field space behavior through the public API: definition, dotted
//! resolution across join aliases, renames, and restriction views.

use strata::compile::{compile_model, NoImports};
use strata::model::FieldDef;
use strata::semantic::error::SemanticErrorKind;
use strata::semantic::{FieldSpace, RestrictMode};
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
            revenue number;
        }
        measures { order_count = count(); }
        joins { items many order_items on order_id; }
    }
"#;

fn semantic_kind(err: CompileError) -> SemanticErrorKind {
    match err {
        CompileError::Semantic(e) => e.kind,
        other => panic!("expected semantic error, got {}", other),
    }
}

#[test]
fn test_resolve_walks_join_aliases() {
    let model = compile_model(FIXTURE, &NoImports).unwrap();
    let orders = model.explore("orders").unwrap();

    let price = orders
        .space
        .resolve(&["items".to_string(), "price".to_string()])
        .unwrap();
    assert_eq!(price.name(), "price");
    assert!(matches!(price.definition(), FieldDef::Dimension(_)));
}

#[test]
fn test_resolve_names_exact_unresolved_segment() {
    let model = compile_model(FIXTURE, &NoImports).unwrap();
    let orders = model.explore("orders").unwrap();

    let err = orders
        .space
        .resolve(&["items".to_string(), "missing".to_string()])
        .unwrap_err();
    assert_eq!(
        err.kind,
        SemanticErrorKind::UnknownField {
            segment: "missing".to_string(),
            path: "items.missing".to_string(),
        }
    );

    let err = orders
        .space
        .resolve(&["nonesuch".to_string(), "price".to_string()])
        .unwrap_err();
    assert_eq!(
        err.kind,
        SemanticErrorKind::UnknownField {
            segment: "nonesuch".to_string(),
            path: "nonesuch.price".to_string(),
        }
    );
}

#[test]
fn test_duplicate_dimension_name_fails() {
    let source = r#"
        explore t {
            from "t";
            dimensions {
                a string;
                a number;
            }
        }
    "#;
    let err = compile_model(source, &NoImports).unwrap_err();
    assert_eq!(
        semantic_kind(err),
        SemanticErrorKind::DuplicateName {
            name: "a".to_string()
        }
    );
}

#[test]
fn test_join_alias_conflicts_with_field_name() {
    let source = r#"
        explore other {
            from "other";
            primary_key id;
            dimensions { id number; }
        }
        explore t {
            from "t";
            primary_key id;
            dimensions { id number; other string; }
            joins { other one other on other_id; }
        }
    "#;
    let err = compile_model(source, &NoImports).unwrap_err();
    assert_eq!(
        semantic_kind(err),
        SemanticErrorKind::DuplicateName {
            name: "other".to_string()
        }
    );
}

#[test]
fn test_rename_round_trip_preserves_definition() {
    let model = compile_model(FIXTURE, &NoImports).unwrap();
    let orders = model.explore("orders").unwrap();

    let renamed_space = orders.space.rename("revenue", "gross").unwrap();
    let original = orders.space.lookup("revenue").unwrap();
    let renamed = renamed_space.lookup("gross").unwrap();

    // Identical except for the reported name
    assert_eq!(renamed.name(), "gross");
    assert_eq!(renamed.definition(), original.as_ref());
    assert_eq!(renamed.value_type(), original.value_type());

    // The original namespace is untouched
    assert!(orders.space.lookup("gross").is_none());
    assert!(orders.space.lookup("revenue").is_some());
}

#[test]
fn test_rename_through_extends() {
    let source = format!(
        "{}\n{}",
        FIXTURE,
        r#"
        explore slim {
            from orders;
            rename { state is status; }
        }
        "#
    );
    let model = compile_model(&source, &NoImports).unwrap();
    let slim = model.explore("slim").unwrap();

    let state = slim.space.lookup("state").unwrap();
    assert_eq!(state.name(), "state");
    assert_eq!(state.definition().name(), "status");
    assert!(slim.space.lookup("status").is_none());

    // The parent explore still resolves the original
    let orders = model.explore("orders").unwrap();
    assert!(orders.space.lookup("status").is_some());
}

#[test]
fn test_restrict_modes() {
    let mut space = FieldSpace::new();
    for name in ["a", "b", "c"] {
        space
            .define(FieldDef::Dimension(strata::model::DimensionDef {
                name: name.to_string(),
                value_type: strata::model::ValueType::String,
                expr: strata::model::Expr::column(name),
            }))
            .unwrap();
    }

    let accepted = space.restrict(RestrictMode::Accept, vec!["a".to_string()]);
    assert!(accepted.lookup("a").is_some());
    assert!(accepted.lookup("b").is_none());

    let excepted = space.restrict(RestrictMode::Except, vec!["a".to_string()]);
    assert!(excepted.lookup("a").is_none());
    assert!(excepted.lookup("b").is_some());
}

#[test]
fn test_except_via_source() {
    let source = format!(
        "{}\n{}",
        FIXTURE,
        r#"
        explore no_revenue {
            from orders;
            except { revenue; }
        }
        "#
    );
    let model = compile_model(&source, &NoImports).unwrap();
    let slim = model.explore("no_revenue").unwrap();
    assert!(slim.space.lookup("revenue").is_none());
    assert!(slim.space.lookup("status").is_some());
}

#[test]
fn test_conflicting_restriction() {
    let source = format!(
        "{}\n{}",
        FIXTURE,
        r#"
        explore broken {
            from orders;
            accept { status; }
            except { revenue; }
        }
        "#
    );
    let err = compile_model(&source, &NoImports).unwrap_err();
    assert_eq!(
        semantic_kind(err),
        SemanticErrorKind::ConflictingRestriction
    );
}

#[test]
fn test_field_order_is_insertion_order() {
    let model = compile_model(FIXTURE, &NoImports).unwrap();
    let orders = model.explore("orders").unwrap();
    let names: Vec<&str> = orders.space.fields().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["id", "status", "revenue", "order_count"]);
}
