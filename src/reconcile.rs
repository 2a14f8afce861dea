//! Forest reconciliation.
//!
//! Scene exports rarely describe a clean tree. Root markers go missing, nodes list several
//! parents, parents forget to list their children, and whole islands of the graph hang off
//! ancestors that no root reaches. [`ForestReconciler`] turns the ingested node map into a
//! [`Forest`] whose root set is deduplicated and overlap free and whose adjacency is
//! bidirectional. Parent entries naming the root sentinel are the one exception: they mark an
//! explicit root and never gain a forward edge. The steps run in a fixed order so the result is
//! deterministic:
//!
//! 1. Normalize edge lists (dedupe, drop edges to unknown ids).
//! 2. Seed roots: parentless ids plus explicit root candidates, in superset order.
//! 3. Sweep child edges from the seeds; every unvisited id is an orphan.
//! 4. Walk upward from each orphan, repairing missing `parent -> child` edges and collecting
//!    parentless ancestors as new roots.
//! 5. Complete the remaining `parent -> child` edges of already reachable ids.
//! 6. Merge the new roots, then promote any id still unreachable (rootless cyclic islands).
//! 7. One overlap elimination pass over a snapshot of the root set.
//! 8. Complete the `child -> parent` back edges.
//!
//! Every walk uses an explicit stack and a visited set; cyclic parent chains terminate and are
//! reported once per walk.

use petgraph::visit::Dfs;
use std::collections::{BTreeMap, HashSet};

use crate::{
    diagnostic::GraphDiagnostic,
    forest::{child_graph, reachable_from_all, Forest},
    ingest::IngestedGraph,
    properties::{dedup_in_order, DbId, NodeRecord},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub seed_roots: usize,
    pub orphans: usize,
    pub repaired_edges: usize,
    pub forward_edges: usize,
    pub new_roots: usize,
    pub promoted_roots: usize,
    pub overlapping_roots: usize,
    pub back_edges: usize,
    pub cycles: usize,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub forest: Forest,
    pub diagnostics: Vec<GraphDiagnostic>,
    pub stats: ReconcileStats,
}

pub struct ForestReconciler {
    nodes: BTreeMap<DbId, NodeRecord>,
    explicit_roots: HashSet<DbId>,
    root_sentinel: Option<DbId>,
    superset: Vec<DbId>,
    diagnostics: Vec<GraphDiagnostic>,
    stats: ReconcileStats,
}

impl ForestReconciler {
    pub fn new(graph: IngestedGraph) -> Self {
        let sentinel = graph.root_sentinel;
        let reconciler = Self::from_parts(graph.nodes, graph.explicit_roots, graph.visited);
        match sentinel {
            Some(sentinel) => reconciler.with_root_sentinel(sentinel),
            None => reconciler,
        }
    }

    /// `superset` is the visitation order of every ingested id. Ids of the node map missing
    /// from it are appended in id order.
    pub fn from_parts(
        nodes: BTreeMap<DbId, NodeRecord>,
        explicit_roots: Vec<DbId>,
        superset: Vec<DbId>,
    ) -> Self {
        let mut seen = HashSet::with_capacity(nodes.len());
        let mut ordered = Vec::with_capacity(nodes.len());
        for id in superset.into_iter().chain(nodes.keys().copied()) {
            if nodes.contains_key(&id) && seen.insert(id) {
                ordered.push(id);
            }
        }
        ForestReconciler {
            nodes,
            explicit_roots: explicit_roots.into_iter().collect(),
            root_sentinel: None,
            superset: ordered,
            diagnostics: Vec::new(),
            stats: ReconcileStats::default(),
        }
    }

    /// Parent entries naming `sentinel` are left without a forward edge.
    pub fn with_root_sentinel(mut self, sentinel: DbId) -> Self {
        self.root_sentinel = Some(sentinel);
        self
    }

    pub fn reconcile(mut self) -> Reconciled {
        self.normalize();

        let mut roots = self.seed_roots();
        self.stats.seed_roots = roots.len();

        let reachable = reachable_from_all(&child_graph(&self.nodes), roots.iter().copied());
        let orphans: Vec<DbId> = self
            .superset
            .iter()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect();
        self.stats.orphans = orphans.len();
        for orphan in orphans.iter() {
            self.report(GraphDiagnostic::Orphan(*orphan));
        }

        let new_roots = self.resolve_orphans(&orphans);
        self.complete_forward_edges();
        for id in new_roots {
            if !roots.contains(&id) {
                roots.push(id);
                self.stats.new_roots += 1;
            }
        }
        self.promote_unreachable(&mut roots);

        let roots = self.eliminate_overlaps(roots);
        self.complete_back_edges();

        tracing::info!(
            "Reconciled {} nodes into {} roots ({} orphans, {} repaired edges)",
            self.nodes.len(),
            roots.len(),
            self.stats.orphans,
            self.stats.repaired_edges
        );

        Reconciled {
            forest: Forest::new(self.nodes, roots),
            diagnostics: self.diagnostics,
            stats: self.stats,
        }
    }

    fn normalize(&mut self) {
        let known: HashSet<DbId> = self.nodes.keys().copied().collect();
        let mut dangling = Vec::new();
        for (id, node) in self.nodes.iter_mut() {
            dedup_in_order(&mut node.children);
            dedup_in_order(&mut node.parents);
            for list in [&mut node.children, &mut node.parents] {
                list.retain(|other| {
                    let keep = known.contains(other);
                    if !keep {
                        dangling.push((*id, *other));
                    }
                    keep
                });
            }
        }
        for (from, to) in dangling {
            self.report(GraphDiagnostic::DanglingReference { from, to });
        }

        let multi_parent: Vec<(DbId, Vec<DbId>)> = self
            .superset
            .iter()
            .filter_map(|id| {
                let node = &self.nodes[id];
                (node.parents.len() > 1).then(|| (*id, node.parents.clone()))
            })
            .collect();
        for (id, parents) in multi_parent {
            self.report(GraphDiagnostic::MultiParent { id, parents });
        }
    }

    fn seed_roots(&self) -> Vec<DbId> {
        self.superset
            .iter()
            .copied()
            .filter(|id| self.explicit_roots.contains(id) || self.nodes[id].parents.is_empty())
            .collect()
    }

    /// Walk upward from every orphan, repairing forward edges on the way. Returns the
    /// parentless ancestors found, in discovery order.
    fn resolve_orphans(&mut self, orphans: &[DbId]) -> Vec<DbId> {
        let mut new_roots: Vec<DbId> = Vec::new();
        let mut walked: HashSet<DbId> = HashSet::new();

        for orphan in orphans.iter().copied() {
            if !walked.insert(orphan) {
                continue;
            }
            let mut cycle_reported = false;
            let mut on_path: HashSet<DbId> = HashSet::from([orphan]);
            // (id, index of the next parent to visit)
            let mut stack: Vec<(DbId, usize)> = vec![(orphan, 0)];

            while let Some(frame) = stack.last_mut() {
                let (id, cursor) = *frame;
                let parents = &self.nodes[&id].parents;
                let Some(parent) = parents.get(cursor).copied() else {
                    if parents.is_empty() && !new_roots.contains(&id) {
                        tracing::debug!("Orphan walk reached parentless id {}", id);
                        new_roots.push(id);
                    }
                    on_path.remove(&id);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    if parent_node.add_child(id) {
                        tracing::debug!("Repaired missing edge {} -> {}", parent, id);
                        self.stats.repaired_edges += 1;
                    }
                }

                if on_path.contains(&parent) {
                    if !cycle_reported {
                        cycle_reported = true;
                        self.stats.cycles += 1;
                        self.report(GraphDiagnostic::CycleDetected { at: parent });
                    }
                } else if walked.insert(parent) {
                    on_path.insert(parent);
                    stack.push((parent, 0));
                }
            }
        }
        new_roots
    }

    /// An island whose parent chains only loop back on themselves has no parentless ancestor.
    /// Promote its first unreachable id (superset order) and sweep again until every id is
    /// covered.
    fn promote_unreachable(&mut self, roots: &mut Vec<DbId>) {
        let graph = child_graph(&self.nodes);
        let mut covered = reachable_from_all(&graph, roots.iter().copied());
        for id in self.superset.iter().copied() {
            if covered.contains(&id) {
                continue;
            }
            tracing::debug!("Promoting unreachable id {} to root", id);
            roots.push(id);
            self.stats.promoted_roots += 1;
            covered.extend(reachable_from_all(&graph, [id]));
        }
    }

    /// Drop every root that sits inside another root's subtree. Membership is checked once
    /// against the incoming root list. Two roots that reach each other keep the earlier one.
    fn eliminate_overlaps(&mut self, snapshot: Vec<DbId>) -> Vec<DbId> {
        let graph = child_graph(&self.nodes);
        let reach: Vec<HashSet<DbId>> = snapshot
            .iter()
            .map(|root| {
                let mut below = HashSet::new();
                let mut dfs = Dfs::new(&graph, *root);
                while let Some(id) = dfs.next(&graph) {
                    below.insert(id);
                }
                below
            })
            .collect();

        let mut kept = Vec::with_capacity(snapshot.len());
        for (i, root) in snapshot.iter().enumerate() {
            let covering = snapshot.iter().enumerate().find(|(j, other)| {
                *j != i && reach[*j].contains(root) && (*j < i || !reach[i].contains(*other))
            });
            match covering {
                Some((_, other)) => {
                    tracing::debug!("Removing root {} (inside the subtree of {})", root, other);
                    self.stats.overlapping_roots += 1;
                }
                None => kept.push(*root),
            }
        }
        kept
    }

    fn complete_forward_edges(&mut self) {
        let sentinel = self.root_sentinel;
        let edges: Vec<(DbId, DbId)> = self
            .nodes
            .iter()
            .flat_map(|(id, node)| node.parents.iter().map(move |parent| (*parent, *id)))
            .filter(|(parent, _)| Some(*parent) != sentinel)
            .collect();
        for (parent, child) in edges {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                if parent_node.add_child(child) {
                    tracing::debug!("Completed forward edge {} -> {}", parent, child);
                    self.stats.forward_edges += 1;
                }
            }
        }
    }

    fn complete_back_edges(&mut self) {
        let edges: Vec<(DbId, DbId)> = self
            .nodes
            .iter()
            .flat_map(|(id, node)| node.children.iter().map(move |child| (*id, *child)))
            .collect();
        for (parent, child) in edges {
            if let Some(child_node) = self.nodes.get_mut(&child) {
                if child_node.add_parent(parent) {
                    self.stats.back_edges += 1;
                }
            }
        }
        if self.stats.back_edges > 0 {
            tracing::debug!("Completed {} child -> parent back edges", self.stats.back_edges);
        }
    }

    fn report(&mut self, diagnostic: GraphDiagnostic) {
        diagnostic.trace();
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{forest_nodes, init_logging};

    fn reconcile(nodes: BTreeMap<DbId, NodeRecord>, explicit: &[i64]) -> Reconciled {
        init_logging();
        ForestReconciler::from_parts(
            nodes,
            explicit.iter().copied().map(DbId).collect(),
            Vec::new(),
        )
        .reconcile()
    }

    #[test]
    fn test_clean_tree_is_untouched() {
        let nodes = forest_nodes(&[
            (1, "root", &[2, 3], &[]),
            (2, "n2", &[], &[1]),
            (3, "n3", &[4], &[1]),
            (4, "n4", &[], &[3]),
        ]);
        let result = reconcile(nodes.clone(), &[]);

        assert_eq!(result.forest.root_ids(), &[DbId(1)]);
        assert_eq!(result.forest.nodes(), &nodes);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.stats.orphans, 0);
    }

    #[test]
    fn test_orphan_edge_is_repaired() {
        let nodes = forest_nodes(&[
            (1, "root", &[2], &[]),
            (2, "n2", &[], &[1]),
            (5, "n5", &[], &[2]),
        ]);
        let result = reconcile(nodes, &[]);
        let forest = &result.forest;

        assert_eq!(forest.get(DbId(2)).unwrap().children, vec![DbId(5)]);
        assert_eq!(forest.roots_reaching(DbId(5)), forest.roots_reaching(DbId(2)));
        assert_eq!(forest.root_ids(), &[DbId(1)]);
        assert_eq!(result.stats.orphans, 1);
        assert_eq!(result.stats.repaired_edges, 1);
        assert_eq!(result.diagnostics, vec![GraphDiagnostic::Orphan(DbId(5))]);
    }

    #[test]
    fn test_orphan_island_brings_new_root() {
        // 10 <- 11 <- 12 only through parent markers; nothing lists its children
        let nodes = forest_nodes(&[
            (1, "root", &[], &[]),
            (10, "island", &[], &[]),
            (11, "mid", &[], &[10]),
            (12, "leaf", &[], &[11]),
        ]);
        let result = reconcile(nodes, &[]);

        assert_eq!(result.forest.root_ids(), &[DbId(1), DbId(10)]);
        assert_eq!(result.forest.get(DbId(10)).unwrap().children, vec![DbId(11)]);
        assert_eq!(result.forest.get(DbId(11)).unwrap().children, vec![DbId(12)]);
        assert_eq!(result.stats.orphans, 2);
    }

    #[test]
    fn test_explicit_root_inside_other_root_is_removed() {
        // 2 names the sentinel as its parent but the sentinel also lists it as a child.
        let nodes = forest_nodes(&[(1, "scene", &[2], &[]), (2, "model", &[], &[1])]);
        let result = reconcile(nodes, &[2]);

        assert_eq!(result.forest.root_ids(), &[DbId(1)]);
        assert_eq!(result.stats.seed_roots, 2);
        assert_eq!(result.stats.overlapping_roots, 1);
    }

    #[test]
    fn test_transitively_nested_root_is_removed() {
        // 3 has no parent marker, yet 2 lists it as a child and 1 reaches 2.
        let nodes = forest_nodes(&[
            (1, "root", &[2], &[]),
            (2, "n2", &[3], &[1]),
            (3, "n3", &[], &[]),
        ]);
        let result = reconcile(nodes, &[]);

        assert_eq!(result.forest.root_ids(), &[DbId(1)]);
        // back edge completed
        assert_eq!(result.forest.get(DbId(3)).unwrap().parents, vec![DbId(2)]);
        assert_eq!(result.stats.back_edges, 1);
    }

    #[test]
    fn test_duplicate_edges_are_deduped() {
        let nodes = forest_nodes(&[
            (1, "root", &[2, 2], &[]),
            (2, "n2", &[], &[1, 1]),
        ]);
        let result = reconcile(nodes, &[]);

        let n2 = result.forest.get(DbId(2)).unwrap();
        assert_eq!(n2.parents, vec![DbId(1)]);
        assert_eq!(result.forest.get(DbId(1)).unwrap().children, vec![DbId(2)]);
        assert!(!result
            .diagnostics
            .iter()
            .any(|d| matches!(d, GraphDiagnostic::MultiParent { .. })));
    }

    #[test]
    fn test_multi_parent_gains_every_forward_edge() {
        let nodes = forest_nodes(&[
            (1, "root", &[2, 3], &[]),
            (2, "a", &[4], &[1]),
            (3, "b", &[], &[1]),
            (4, "shared", &[], &[2, 3]),
        ]);
        let result = reconcile(nodes, &[]);

        // 4 is reachable through 2, so only the forward completion adds it under 3
        assert_eq!(result.forest.get(DbId(3)).unwrap().children, vec![DbId(4)]);
        assert_eq!(result.stats.forward_edges, 1);
        assert_eq!(result.stats.orphans, 0);
        assert_eq!(result.forest.roots_reaching(DbId(4)), vec![DbId(1)]);
        assert!(result.diagnostics.contains(&GraphDiagnostic::MultiParent {
            id: DbId(4),
            parents: vec![DbId(2), DbId(3)]
        }));
        assert_eq!(result.forest.root_ids(), &[DbId(1)]);
    }

    #[test]
    fn test_cyclic_parent_chain_terminates() {
        // 20 and 21 name each other as parents; 22 hangs below 21.
        let nodes = forest_nodes(&[
            (1, "root", &[], &[]),
            (20, "a", &[], &[21]),
            (21, "b", &[], &[20]),
            (22, "c", &[], &[21]),
        ]);
        let result = reconcile(nodes, &[]);
        let forest = &result.forest;

        assert!(result.diagnostics.iter().any(GraphDiagnostic::is_cycle));
        assert_eq!(result.stats.cycles, 1);
        // every id is covered by exactly one root
        for id in [1, 20, 21, 22] {
            assert_eq!(forest.roots_reaching(DbId(id)).len(), 1, "id {id}");
        }
        assert_eq!(forest.root_ids(), &[DbId(1), DbId(20)]);
        assert_eq!(result.stats.promoted_roots, 1);
    }

    #[test]
    fn test_dangling_edges_are_dropped() {
        let nodes = forest_nodes(&[(1, "root", &[2, 7], &[]), (2, "n2", &[], &[1, 8])]);
        let result = reconcile(nodes, &[]);

        assert_eq!(result.forest.get(DbId(1)).unwrap().children, vec![DbId(2)]);
        assert_eq!(result.forest.get(DbId(2)).unwrap().parents, vec![DbId(1)]);
        assert!(result.diagnostics.contains(&GraphDiagnostic::DanglingReference {
            from: DbId(1),
            to: DbId(7)
        }));
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let nodes = forest_nodes(&[
            (1, "root", &[], &[]),
            (30, "x", &[], &[31]),
            (31, "y", &[], &[]),
            (40, "z", &[], &[41]),
            (41, "w", &[], &[]),
        ]);
        let first = reconcile(nodes.clone(), &[]);
        let second = reconcile(nodes, &[]);
        assert_eq!(first.forest, second.forest);
        assert_eq!(first.forest.root_ids(), &[DbId(1), DbId(31), DbId(41)]);
    }

    #[test]
    fn test_sentinel_parent_gets_no_forward_edge() {
        // 2 and 3 name the sentinel; 3 also names 2, which never lists it
        let nodes = forest_nodes(&[
            (1, "sentinel", &[], &[]),
            (2, "model", &[], &[1]),
            (3, "grid", &[], &[1, 2]),
        ]);
        let result = ForestReconciler::from_parts(nodes, vec![DbId(2), DbId(3)], Vec::new())
            .with_root_sentinel(DbId(1))
            .reconcile();
        let forest = &result.forest;

        assert!(forest.get(DbId(1)).unwrap().children.is_empty());
        assert_eq!(forest.get(DbId(2)).unwrap().children, vec![DbId(3)]);
        // 3 now sits below 2 and stops being a root
        assert_eq!(forest.root_ids(), &[DbId(1), DbId(2)]);
    }

    /// Two roots sharing a descendant both stay: neither is inside the other, and dropping
    /// either would leave it unreachable. The shared id is reachable from both.
    #[test]
    fn test_shared_descendant_keeps_both_roots() {
        let nodes = forest_nodes(&[
            (10, "a", &[30], &[]),
            (20, "b", &[30], &[]),
            (30, "shared", &[], &[10, 20]),
        ]);
        let result = reconcile(nodes, &[]);
        let forest = &result.forest;

        assert_eq!(forest.root_ids(), &[DbId(10), DbId(20)]);
        assert_eq!(forest.roots_reaching(DbId(30)), vec![DbId(10), DbId(20)]);
        assert_eq!(forest.roots_reaching(DbId(10)), vec![DbId(10)]);
        assert!(result.diagnostics.contains(&GraphDiagnostic::MultiParent {
            id: DbId(30),
            parents: vec![DbId(10), DbId(20)]
        }));
    }
}
