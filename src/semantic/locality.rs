//! Aggregate-locality resolution.
//!
//! Every aggregate is computed "with respect to" one join-tree node: its
//! locality. `items.price.sum()` has locality `items`; `sum(items.price)`
//! written on the root has locality at the root. When the joined row-set
//! duplicates the locality's rows (a fan-out join elsewhere in the tree),
//! the aggregate must deduplicate by the locality's primary key; the
//! resolver emits that requirement as a distinct-key hint in the IR rather
//! than performing it.

use petgraph::graph::NodeIndex;

use crate::model::explore::JoinKind;
use crate::model::expr::{AggregateFunc, LocalityHint};
use crate::model::field::FieldDef;
use crate::model::Expr;

use super::error::{SemanticErrorKind, SemanticResult};
use super::join_graph::JoinGraph;

/// The resolved locality of one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocality {
    /// The join-tree node the aggregate is computed with respect to.
    pub node: NodeIndex,
    /// Deduplication requirement, when join fan-out would otherwise
    /// change the result. `min`/`max`/`count_distinct` never carry one.
    pub distinct_key: Option<DistinctKey>,
}

/// The key rows must be deduplicated by before aggregating.
#[derive(Debug, Clone, PartialEq)]
pub struct DistinctKey {
    /// SQL alias of the locality node.
    pub sql_alias: String,
    /// Primary key column of the locality's explore.
    pub column: String,
}

/// Resolves aggregate localities against a join graph.
pub struct LocalityResolver<'a> {
    graph: &'a JoinGraph,
}

impl<'a> LocalityResolver<'a> {
    pub fn new(graph: &'a JoinGraph) -> Self {
        Self { graph }
    }

    /// Resolve the locality of an aggregate.
    ///
    /// `context` is the alias path of the node the expression is written
    /// on (empty for the query root). `used` is the set of join-tree nodes
    /// participating in the stage's row-set.
    ///
    /// The two aggregate syntaxes resolve through the same rule: the
    /// function form (`sum(items.price)`) aggregates at the calling
    /// context, the path form (`items.price.sum()`) at the node named by
    /// the path. When the calling context already owns the field the two
    /// coincide.
    pub fn resolve(
        &self,
        func: AggregateFunc,
        hint: &LocalityHint,
        context: &[String],
        used: &[NodeIndex],
    ) -> SemanticResult<ResolvedLocality> {
        let locality_path: Vec<String> = match hint {
            LocalityHint::CallingContext => context.to_vec(),
            LocalityHint::Path(p) => {
                let mut full = context.to_vec();
                full.extend(p.iter().cloned());
                full
            }
        };

        let node = self.graph.node_at_path(&locality_path).ok_or_else(|| {
            SemanticErrorKind::UnknownField {
                segment: locality_path
                    .last()
                    .cloned()
                    .unwrap_or_default(),
                path: locality_path.join("."),
            }
        })?;

        // Locality is undefined across a Cartesian product: there is no
        // key relating the duplicated rows back to a grouping scope.
        if self
            .graph
            .edge_kinds_from_root(node)
            .contains(&JoinKind::Cross)
        {
            return Err(SemanticErrorKind::UnresolvableLocality {
                path: locality_path.join("."),
            }
            .into());
        }

        let distinct_key = if func.fanout_sensitive()
            && self.graph.fans_out_relative_to(node, used)
        {
            Some(self.distinct_key_for(node)?)
        } else {
            None
        };

        Ok(ResolvedLocality { node, distinct_key })
    }

    fn distinct_key_for(&self, node: NodeIndex) -> SemanticResult<DistinctKey> {
        let join_node = self.graph.node(node);
        let pk = join_node.explore.primary_key.clone().ok_or_else(|| {
            SemanticErrorKind::MissingPrimaryKey {
                explore: join_node.explore.name.clone(),
            }
        })?;

        // The key column is the primary-key dimension's physical column
        // when it is a plain column, the field name otherwise.
        let column = match join_node.explore.space.lookup(&pk).as_deref() {
            Some(FieldDef::Dimension(d)) => match &d.expr {
                Expr::Column { column, .. } => column.clone(),
                _ => pk.clone(),
            },
            _ => pk.clone(),
        };

        Ok(DistinctKey {
            sql_alias: join_node.sql_alias.clone(),
            column,
        })
    }
}
