//! Explore definitions: named data sources with fields and joins.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::semantic::space::FieldSpace;

use super::expr::Expr;
use super::query::QueryPipeline;

/// A named data source: a table, an extension of another explore, or a
/// query result, plus fields, joins, an optional primary key, and
/// source-level filters.
///
/// Explores are immutable once built and may be shared (read-only) across
/// concurrent compilations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explore {
    pub name: String,
    pub source: ExploreSource,
    /// The primary key field name, if declared. Required for explores on
    /// the one side of a fan-out when aggregates need deduplication.
    pub primary_key: Option<String>,
    /// The explore's own field namespace, including join sub-namespaces.
    pub space: FieldSpace,
    /// Join edges owned by this explore.
    pub joins: Vec<Join>,
    /// Filters applied to every query over this explore.
    pub filters: Vec<Expr>,
}

/// What an explore reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExploreSource {
    /// A physical table reference.
    Table(String),
    /// An extension of another explore (inherits its fields and source).
    Extends(Arc<Explore>),
    /// The result of a named query on another explore.
    Query {
        base: Arc<Explore>,
        pipeline: QueryPipeline,
    },
}

impl Explore {
    /// The physical table underlying this explore, walking extension
    /// chains. `None` when the explore reads from a query.
    pub fn base_table(&self) -> Option<&str> {
        match &self.source {
            ExploreSource::Table(t) => Some(t),
            ExploreSource::Extends(parent) => parent.base_table(),
            ExploreSource::Query { .. } => None,
        }
    }

    /// Look up a join edge by alias.
    pub fn join(&self, alias: &str) -> Option<&Join> {
        self.joins.iter().find(|j| j.alias == alias)
    }

    /// Source-level filters, including those inherited from extended
    /// explores.
    pub fn all_filters(&self) -> Vec<Expr> {
        let mut filters = match &self.source {
            ExploreSource::Extends(parent) => parent.all_filters(),
            _ => Vec::new(),
        };
        filters.extend(self.filters.iter().cloned());
        filters
    }
}

/// A directed join edge from the owning explore to a target explore.
///
/// Joins default to outer semantics: rows of the source survive even when
/// the target has no match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    /// The alias under which the target's namespace is addressable.
    pub alias: String,
    pub kind: JoinKind,
    /// The joined explore. May be shared by multiple joins.
    pub target: Arc<Explore>,
    /// The join predicate; `None` only for cross joins.
    pub on: Option<JoinOn>,
}

/// Join cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// At most one target row per source row.
    One,
    /// Any number of target rows per source row; introduces fan-out.
    Many,
    /// Cartesian product.
    Cross,
}

impl JoinKind {
    /// Whether this join can duplicate source rows.
    pub fn fans_out(&self) -> bool {
        matches!(self, JoinKind::Many | JoinKind::Cross)
    }
}

/// The join predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinOn {
    /// Foreign key in the source equals the target's primary key.
    ForeignKey {
        /// Field name in the owning explore.
        foreign_key: String,
        /// Field name in the target explore (its primary key).
        primary_key: String,
    },
    /// An explicit predicate expression. Paths in the expression are
    /// resolved against the owning explore.
    Expr(Expr),
}
