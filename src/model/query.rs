//! Query pipelines: ordered sequences of stages over an explore.
//!
//! These are the model-level shapes produced from the AST by the model
//! builder. Field references are still dotted paths; the pipeline compiler
//! resolves them and produces the IR.

use serde::{Deserialize, Serialize};

use super::expr::Expr;

/// An ordered sequence of stages. Each stage's input is the previous
/// stage's output shape (or the explore, for the first stage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPipeline {
    pub stages: Vec<Stage>,
}

impl QueryPipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    Group(GroupStage),
    Project(ProjectStage),
    Index(IndexStage),
}

impl Stage {
    /// Shared access to the stage's filters.
    pub fn filters(&self) -> &[Expr] {
        match self {
            Stage::Group(s) => &s.filters,
            Stage::Project(s) => &s.filters,
            Stage::Index(_) => &[],
        }
    }
}

/// A group/aggregate stage: GROUP BY dimensions, compute aggregates, and
/// optionally embed nested queries (turtles).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupStage {
    /// Grouping dimensions, as dotted paths.
    pub group: Vec<Vec<String>>,
    /// Aggregate outputs.
    pub aggregates: Vec<AggregateItem>,
    /// Nested query references.
    pub nests: Vec<NestRef>,
    pub filters: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

/// A projection stage: scalar field outputs only, no measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectStage {
    /// Projected fields, as dotted paths.
    pub fields: Vec<Vec<String>>,
    pub filters: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

/// An index stage: inverts the listed fields into (field_name, field_value,
/// weight) rows for search-style access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IndexStage {
    pub fields: Vec<Vec<String>>,
}

/// One aggregate output of a group stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateItem {
    /// The output column name.
    pub name: String,
    /// The aggregate expression (contains at least one `Expr::Aggregate`).
    pub expr: Expr,
}

/// A reference to a named query embedded as a nested sub-table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestRef {
    /// The turtle field name; also the output column name.
    pub name: String,
}

/// An explicit ordering item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The output field name (or dotted path for joined dimensions).
    pub field: Vec<String>,
    pub dir: OrderDir,
}

/// Ordering direction. Explicit `sort` defaults to ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    pub fn sql(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}
