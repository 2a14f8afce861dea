//! The reconciled scene forest.
//!
//! A [`Forest`] is the node map plus the ordered root ids. It is produced by
//! [`crate::reconcile::ForestReconciler`] and read by [`crate::prune::HierarchyPruner`]; once
//! built, its edges are not mutated again.
//!
//! On disk the forest uses the layout of the scene exporter's `bim.json`: a single object whose
//! keys are node ids, next to a `"rootNodes"` array.

use petgraph::{graphmap::DiGraphMap, visit::Dfs};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    io::Write,
};

use crate::{
    error::HierarchyError,
    properties::{DbId, NodeRecord},
};

/// Child-edge view of a node map. Edges to ids that are not in the map are left out.
pub type ChildGraph = DiGraphMap<DbId, ()>;

pub fn child_graph(nodes: &BTreeMap<DbId, NodeRecord>) -> ChildGraph {
    let mut graph = ChildGraph::with_capacity(nodes.len(), nodes.len());
    for id in nodes.keys() {
        graph.add_node(*id);
    }
    for (id, node) in nodes {
        for child in node.children.iter().filter(|c| nodes.contains_key(c)) {
            graph.add_edge(*id, *child, ());
        }
    }
    graph
}

/// Ids reachable from any of `starts` along child edges, starts included.
pub fn reachable_from_all<I>(graph: &ChildGraph, starts: I) -> HashSet<DbId>
where
    I: IntoIterator<Item = DbId>,
{
    let mut reached = HashSet::new();
    // one walker for all starts so its discovered map is shared
    let mut dfs: Dfs<DbId, HashSet<DbId>> = Dfs::empty(graph);
    for start in starts {
        if !graph.contains_node(start) {
            continue;
        }
        dfs.move_to(start);
        while let Some(id) = dfs.next(graph) {
            reached.insert(id);
        }
    }
    reached
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    #[serde(flatten)]
    nodes: BTreeMap<DbId, NodeRecord>,
    #[serde(rename = "rootNodes", default)]
    root_ids: Vec<DbId>,
}

impl Forest {
    /// Assemble a forest from already reconciled parts. No validation is performed.
    pub fn new(nodes: BTreeMap<DbId, NodeRecord>, root_ids: Vec<DbId>) -> Self {
        Forest { nodes, root_ids }
    }

    pub fn root_ids(&self) -> &[DbId] {
        &self.root_ids
    }

    pub fn nodes(&self) -> &BTreeMap<DbId, NodeRecord> {
        &self.nodes
    }

    pub fn get(&self, id: DbId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: DbId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn child_graph(&self) -> ChildGraph {
        child_graph(&self.nodes)
    }

    /// `id` and every id below it, cycle safe.
    pub fn descendants(&self, id: DbId) -> BTreeSet<DbId> {
        let graph = self.child_graph();
        let mut found = BTreeSet::new();
        if graph.contains_node(id) {
            let mut dfs = Dfs::new(&graph, id);
            while let Some(next) = dfs.next(&graph) {
                found.insert(next);
            }
        }
        found
    }

    /// Every id reachable from some root.
    pub fn reachable(&self) -> HashSet<DbId> {
        reachable_from_all(&self.child_graph(), self.root_ids.iter().copied())
    }

    /// The roots whose subtree contains `id`.
    pub fn roots_reaching(&self, id: DbId) -> Vec<DbId> {
        let graph = self.child_graph();
        self.root_ids
            .iter()
            .copied()
            .filter(|root| reachable_from_all(&graph, [*root]).contains(&id))
            .collect()
    }

    pub fn from_json_str(json: &str) -> Result<Self, HierarchyError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_writer<W: Write>(&self, writer: W, pretty: bool) -> Result<(), HierarchyError> {
        if pretty {
            serde_json::to_writer_pretty(writer, self)?;
        } else {
            serde_json::to_writer(writer, self)?;
        }
        Ok(())
    }
}
