//! # Strata
//!
//! A modeling language compiler that emits multi-dialect SQL with nested
//! results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Source (explores, queries, imports)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [dsl]
//! ┌─────────────────────────────────────────────────────────┐
//! │                         AST                              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [semantic::builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │       Model (field spaces, join graphs, pipelines)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │        StageIR (columns, group sets, turtles)            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql::gen + sql::dialect]
//! ┌─────────────────────────────────────────────────────────┐
//! │              SQL text + result shape metadata            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The pipeline compiler merges a stage's aggregation scopes (its own
//! aggregates plus one scope per nested query) into a single statement by
//! tagging rows with an integer group-set id and aggregating conditionally
//! per scope, so one round trip yields scalar aggregates and nested
//! sub-tables together.

pub mod compile;
pub mod dsl;
pub mod functions;
pub mod model;
pub mod planner;
pub mod semantic;
pub mod sql;

pub use compile::{compile_model, compile_query, CompileError, CompileOptions, CompiledQuery};
pub use sql::Dialect;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{
        compile_model, compile_model_query, compile_query, CompileError, CompileOptions,
        CompiledQuery, ImportResolver, MapResolver, NoImports,
    };
    pub use crate::model::{
        AggregateFunc, Explore, Expr, FieldDef, JoinKind, Model, QueryPipeline, Stage, ValueType,
    };
    pub use crate::planner::ir::{ResultShape, ShapeColumn};
    pub use crate::sql::{Dialect, SqlDialect, SqlGenerator};
}
