//! The compiled intermediate representation.
//!
//! One `StageIR` per pipeline stage, dialect-agnostic, produced by the
//! pipeline compiler and consumed exactly once by a dialect backend. Never
//! mutated after creation.

use serde::{Deserialize, Serialize};

use crate::model::explore::JoinKind;
use crate::model::expr::{AggregateFunc, Expr};
use crate::model::query::OrderDir;
use crate::model::types::ValueType;
use crate::semantic::locality::DistinctKey;

/// A fully compiled pipeline: stages in execution order plus the shape of
/// the final result.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPipeline {
    pub stages: Vec<StageIR>,
    pub result_shape: ResultShape,
}

/// The SQL shape of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageIR {
    pub kind: StageKind,
    pub from: FromIR,
    /// One per distinct aggregation/nesting scope merged into this
    /// statement. 1 means no group-set machinery is emitted at all.
    pub group_set_count: usize,
    /// Output columns of the outer scope, in output order.
    pub columns: Vec<OutputColumn>,
    /// Row filters (pre-aggregation), fully resolved.
    pub filters: Vec<Expr>,
    pub order_by: Vec<OrderBySpec>,
    pub limit: Option<u64>,
    /// Nested turtle scopes, one per group-set id 1..N.
    pub turtles: Vec<TurtleIR>,
    /// Per-field entries of an index stage; empty otherwise.
    pub index_fields: Vec<IndexFieldIR>,
}

/// Stage kinds at the IR level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Group,
    Project,
    Index,
}

/// Where a stage's rows come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FromIR {
    /// A physical table plus its join tree (first stage of a pipeline).
    Table {
        table: String,
        joins: Vec<JoinIR>,
    },
    /// A compiled sub-pipeline (explore sourced from a named query); its
    /// stages are emitted as leading CTEs.
    Pipeline {
        pipeline: Box<CompiledPipeline>,
        joins: Vec<JoinIR>,
    },
    /// The previous stage's output.
    Prior,
}

/// One join edge to emit, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinIR {
    pub sql_alias: String,
    pub table: String,
    pub kind: JoinKind,
    /// The resolved predicate; `None` for cross joins.
    pub on: Option<Expr>,
}

/// An output column of a stage or turtle scope.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub value_type: ValueType,
    pub kind: ColumnKind,
}

/// What populates an output column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// A grouped scalar.
    Dimension { expr: Expr },
    /// An aggregate (possibly composite) expression.
    Aggregate(AggregateColumn),
    /// A nested sub-table; index into the stage's `turtles`.
    Turtle { index: usize },
}

/// A resolved aggregate output.
///
/// `expr` is the full expression with every `Expr::Aggregate` node's input
/// resolved; `aggs` carries the per-aggregate locality results in
/// depth-first traversal order, which is also the order SQL generation
/// encounters them.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateColumn {
    pub expr: Expr,
    pub aggs: Vec<ResolvedAggIR>,
}

/// Locality resolution result for one aggregate node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAggIR {
    pub func: AggregateFunc,
    /// The deduplication requirement, when fan-out would otherwise change
    /// the result.
    pub distinct_key: Option<DistinctKey>,
}

/// One nested turtle scope within a group stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TurtleIR {
    pub name: String,
    /// The group-set id of this scope (1-based; 0 is the outer scope).
    pub group_set: usize,
    /// The turtle's own output columns (dimensions and aggregates).
    pub columns: Vec<OutputColumn>,
    /// Filters scoped to this group set only; rows of other sets are
    /// unaffected.
    pub filters: Vec<Expr>,
    pub order_by: Vec<OrderBySpec>,
    pub limit: Option<u64>,
    /// Deeper nests, compiled as separate CTEs joined back by key.
    pub nested: Vec<NestedCteIR>,
    pub shape: ResultShape,
}

/// A deeper nest (turtle within a turtle) compiled as its own CTE.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedCteIR {
    pub cte_name: String,
    /// A single-stage pipeline grouped by the parent keys plus the
    /// enclosing turtle's dimensions.
    pub pipeline: Box<CompiledPipeline>,
    /// Output column names to join on (parent dims then turtle dims).
    pub join_keys: Vec<String>,
    /// The array columns the CTE contributes to the enclosing turtle.
    pub columns: Vec<String>,
}

/// One indexed field of an index stage.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFieldIR {
    /// The dotted name as written, emitted as the `field_name` value.
    pub name: String,
    pub expr: Expr,
    pub value_type: ValueType,
}

/// An ordering instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBySpec {
    pub target: OrderTarget,
    pub dir: OrderDir,
}

/// What an ordering instruction refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    /// A 1-based output ordinal (stage-level ORDER BY).
    Ordinal(usize),
    /// An internal column name (turtle ordering inside array
    /// construction).
    Column(String),
}

/// The structural metadata describing a compiled query's result: the
/// contract with the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultShape {
    pub columns: Vec<ShapeColumn>,
}

/// One output column's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeColumn {
    pub name: String,
    /// The scalar type; `None` for nested columns.
    pub value_type: Option<ValueType>,
    /// The nested shape, for turtle columns.
    pub nested: Option<ResultShape>,
}

impl ResultShape {
    /// Build a shape from output columns and turtle scopes.
    pub fn from_columns(columns: &[OutputColumn], turtles: &[TurtleIR]) -> Self {
        let shape_columns = columns
            .iter()
            .map(|col| match &col.kind {
                ColumnKind::Turtle { index } => ShapeColumn {
                    name: col.name.clone(),
                    value_type: None,
                    nested: Some(turtles[*index].shape.clone()),
                },
                _ => ShapeColumn {
                    name: col.name.clone(),
                    value_type: Some(col.value_type.clone()),
                    nested: None,
                },
            })
            .collect();
        ResultShape {
            columns: shape_columns,
        }
    }
}
