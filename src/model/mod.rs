//! Semantic model types: value types, expressions, fields, explores, and
//! query pipelines.

pub mod explore;
pub mod expr;
pub mod field;
pub mod query;
pub mod types;

pub use explore::{Explore, ExploreSource, Join, JoinKind, JoinOn};
pub use expr::{AggregateExpr, AggregateFunc, BinaryOp, Expr, Literal, LocalityHint, UnaryOp};
pub use field::{DimensionDef, FieldDef, FieldKind, MeasureDef, TurtleDef};
pub use query::{
    AggregateItem, GroupStage, IndexStage, NestRef, OrderDir, OrderItem, ProjectStage,
    QueryPipeline, Stage,
};
pub use types::{ExtractUnit, Timeframe, ValueType};

use std::collections::BTreeMap;
use std::sync::Arc;

/// A fully built model: explores plus standalone queries, ready for the
/// pipeline compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Explores by name, in a stable order.
    pub explores: BTreeMap<String, Arc<Explore>>,
    /// Standalone queries by name.
    pub queries: BTreeMap<String, ModelQuery>,
}

/// A standalone query: a pipeline anchored to an explore.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelQuery {
    pub name: String,
    pub explore: Arc<Explore>,
    pub pipeline: QueryPipeline,
}

impl Model {
    /// Look up an explore by name.
    pub fn explore(&self, name: &str) -> Option<&Arc<Explore>> {
        self.explores.get(name)
    }

    /// Look up a standalone query by name.
    pub fn query(&self, name: &str) -> Option<&ModelQuery> {
        self.queries.get(name)
    }
}
