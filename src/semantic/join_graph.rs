//! The join graph: the structural model of an explore and its joins.
//!
//! The graph retains parent/child relationships between joined explores
//! rather than flattening them. Each node is one join-tree position (the
//! root explore or a join alias path); each edge carries the join kind and
//! predicate. The locality resolver and the SQL emitter both walk this
//! structure.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::model::explore::{Explore, JoinKind, JoinOn};

/// One position in the join tree.
#[derive(Debug, Clone)]
pub struct JoinNode {
    /// The alias path from the root; empty for the root itself.
    pub alias_path: Vec<String>,
    /// The explore at this position.
    pub explore: Arc<Explore>,
    /// The alias used for this node in generated SQL.
    pub sql_alias: String,
}

/// An edge between join-tree positions.
#[derive(Debug, Clone)]
pub struct JoinEdge {
    pub kind: JoinKind,
    /// The join alias (last segment of the target's alias path).
    pub alias: String,
    /// The predicate; `None` for cross joins.
    pub on: Option<JoinOn>,
}

/// The join tree of one query, rooted at its explore.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    graph: DiGraph<JoinNode, JoinEdge>,
    root: NodeIndex,
    /// Nodes in definition order (parents before children), for
    /// deterministic SQL emission.
    order: Vec<NodeIndex>,
    by_path: HashMap<Vec<String>, NodeIndex>,
}

impl JoinGraph {
    /// Build the join tree for a root explore, expanding joins
    /// transitively. Self-recursive join definitions are kept as nodes but
    /// not expanded further.
    pub fn build(root: Arc<Explore>) -> Self {
        let mut graph = DiGraph::new();
        let mut order = Vec::new();
        let mut by_path = HashMap::new();

        let root_idx = graph.add_node(JoinNode {
            alias_path: Vec::new(),
            explore: Arc::clone(&root),
            sql_alias: "base".to_string(),
        });
        order.push(root_idx);
        by_path.insert(Vec::new(), root_idx);

        let mut ancestry: Vec<*const Explore> = vec![Arc::as_ptr(&root)];
        Self::expand(
            &mut graph,
            &mut order,
            &mut by_path,
            root_idx,
            &root,
            &mut ancestry,
        );

        Self {
            graph,
            root: root_idx,
            order,
            by_path,
        }
    }

    fn expand(
        graph: &mut DiGraph<JoinNode, JoinEdge>,
        order: &mut Vec<NodeIndex>,
        by_path: &mut HashMap<Vec<String>, NodeIndex>,
        parent_idx: NodeIndex,
        parent: &Arc<Explore>,
        ancestry: &mut Vec<*const Explore>,
    ) {
        for join in &parent.joins {
            let mut alias_path = graph[parent_idx].alias_path.clone();
            alias_path.push(join.alias.clone());
            let sql_alias = alias_path.join("_");

            let idx = graph.add_node(JoinNode {
                alias_path: alias_path.clone(),
                explore: Arc::clone(&join.target),
                sql_alias,
            });
            graph.add_edge(
                parent_idx,
                idx,
                JoinEdge {
                    kind: join.kind,
                    alias: join.alias.clone(),
                    on: join.on.clone(),
                },
            );
            order.push(idx);
            by_path.insert(alias_path, idx);

            let target_ptr = Arc::as_ptr(&join.target);
            if !ancestry.contains(&target_ptr) {
                ancestry.push(target_ptr);
                Self::expand(graph, order, by_path, idx, &join.target, ancestry);
                ancestry.pop();
            }
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Node data by index.
    pub fn node(&self, idx: NodeIndex) -> &JoinNode {
        &self.graph[idx]
    }

    /// Find the node at an alias path; `&[]` is the root.
    pub fn node_at_path(&self, path: &[String]) -> Option<NodeIndex> {
        self.by_path.get(path).copied()
    }

    /// The incoming edge of a node (its join into the tree), with the
    /// parent index. `None` for the root.
    pub fn parent_edge(&self, idx: NodeIndex) -> Option<(NodeIndex, &JoinEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .next()
            .map(|e| (e.source(), e.weight()))
    }

    /// Nodes from the root down to `idx`, inclusive.
    pub fn path_from_root(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![idx];
        let mut cur = idx;
        while let Some((parent, _)) = self.parent_edge(cur) {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// The join kinds of the edges from the root down to `idx`.
    pub fn edge_kinds_from_root(&self, idx: NodeIndex) -> Vec<JoinKind> {
        self.path_from_root(idx)
            .into_iter()
            .skip(1)
            .filter_map(|n| self.parent_edge(n).map(|(_, e)| e.kind))
            .collect()
    }

    /// All nodes in definition order (root first, parents before
    /// children).
    pub fn nodes_in_order(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.order.iter().copied()
    }

    /// Whether `maybe_ancestor` lies on the root path of `node`
    /// (inclusive).
    pub fn is_ancestor_or_self(&self, maybe_ancestor: NodeIndex, node: NodeIndex) -> bool {
        self.path_from_root(node).contains(&maybe_ancestor)
    }

    /// Whether any join edge among `used` nodes (excluding edges on the
    /// root path of `locality`) can duplicate the locality's rows.
    ///
    /// An edge on the path from the root *to* the locality does not
    /// duplicate locality rows: the locality is on the many side of it.
    /// Every other fan-out edge in the joined row-set does.
    pub fn fans_out_relative_to(&self, locality: NodeIndex, used: &[NodeIndex]) -> bool {
        let on_path = self.path_from_root(locality);
        for &n in used {
            if let Some((_, edge)) = self.parent_edge(n) {
                if edge.kind.fans_out() && !on_path.contains(&n) {
                    return true;
                }
            }
        }
        false
    }
}
