//! Field definitions: dimensions, measures, and named queries.
//!
//! A `FieldDef` is immutable once created. Renaming wraps the original in a
//! new value that reports a different name; nothing is mutated in place, so
//! fields can be shared freely between explores and namespace views.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::expr::{AggregateFunc, Expr};
use super::query::QueryPipeline;
use super::types::ValueType;

/// A named, typed field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldDef {
    Dimension(DimensionDef),
    Measure(MeasureDef),
    Query(TurtleDef),
    /// A renamed view of another field. Resolution walks through to the
    /// wrapped definition; only the reported name differs.
    Rename {
        name: String,
        inner: Arc<FieldDef>,
    },
}

/// A dimension: a scalar expression with no aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDef {
    pub name: String,
    pub value_type: ValueType,
    /// The defining expression. For a physical column this is a plain
    /// `Expr::Column` with the field's own name.
    pub expr: Expr,
}

/// A measure: an expression containing exactly the aggregation implied by
/// its aggregate kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureDef {
    pub name: String,
    pub value_type: ValueType,
    /// The aggregate kind of the outermost aggregation.
    pub agg: AggregateFunc,
    pub expr: Expr,
}

/// A named query (turtle) usable as a nested field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurtleDef {
    pub name: String,
    pub pipeline: QueryPipeline,
}

/// The three field kinds, for error messages and shape metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Dimension,
    Measure,
    Query,
}

impl FieldDef {
    /// The name this field answers to in its namespace.
    pub fn name(&self) -> &str {
        match self {
            FieldDef::Dimension(d) => &d.name,
            FieldDef::Measure(m) => &m.name,
            FieldDef::Query(q) => &q.name,
            FieldDef::Rename { name, .. } => name,
        }
    }

    /// The field kind, looking through renames.
    pub fn kind(&self) -> FieldKind {
        match self.definition() {
            FieldDef::Dimension(_) => FieldKind::Dimension,
            FieldDef::Measure(_) => FieldKind::Measure,
            FieldDef::Query(_) => FieldKind::Query,
            FieldDef::Rename { .. } => unreachable!("definition() strips renames"),
        }
    }

    /// The underlying definition, with any rename wrappers stripped.
    pub fn definition(&self) -> &FieldDef {
        let mut def = self;
        while let FieldDef::Rename { inner, .. } = def {
            def = inner;
        }
        def
    }

    /// The value type of this field, looking through renames.
    ///
    /// Query fields have no scalar type; they report `None`.
    pub fn value_type(&self) -> Option<&ValueType> {
        match self.definition() {
            FieldDef::Dimension(d) => Some(&d.value_type),
            FieldDef::Measure(m) => Some(&m.value_type),
            FieldDef::Query(_) => None,
            FieldDef::Rename { .. } => unreachable!("definition() strips renames"),
        }
    }

    /// The defining expression, looking through renames. `None` for queries.
    pub fn expr(&self) -> Option<&Expr> {
        match self.definition() {
            FieldDef::Dimension(d) => Some(&d.expr),
            FieldDef::Measure(m) => Some(&m.expr),
            FieldDef::Query(_) => None,
            FieldDef::Rename { .. } => unreachable!("definition() strips renames"),
        }
    }

    /// Wrap this field in a rename. The original is untouched.
    pub fn renamed(self: &Arc<Self>, new_name: impl Into<String>) -> FieldDef {
        FieldDef::Rename {
            name: new_name.into(),
            inner: Arc::clone(self),
        }
    }
}
