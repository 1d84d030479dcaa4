//! The semantic layer: field spaces, join graphs, locality resolution, and
//! model building.

pub mod builder;
pub mod error;
pub mod join_graph;
pub mod locality;
pub mod space;

pub use builder::build_model;
pub use error::{SemanticError, SemanticErrorKind, SemanticResult};
pub use join_graph::{JoinEdge, JoinGraph, JoinNode};
pub use locality::{DistinctKey, LocalityResolver, ResolvedLocality};
pub use space::{FieldSpace, RestrictMode};
