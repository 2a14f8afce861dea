//! Hierarchy pruning.
//!
//! [`HierarchyPruner`] walks a reconciled [`Forest`] depth first from each root and emits the
//! nested, renamed [`PrunedHierarchy`]. Exclusion is decided per path: a node is dropped when it
//! or an ancestor on the path being walked is in the [`ExclusionSet`]. Every id visited while
//! excluded lands in the excluded id set, which downstream filters use to strip geometry.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    error::HierarchyError,
    forest::Forest,
    properties::{composite_key, DbId, NodeRecord},
};

/// Every id visited while excluded, ordered so repeated runs serialize identically.
pub type ExcludedIdSet = BTreeSet<DbId>;

/// Composite key (`"[DBID: <id>] <name>"`) to subtree.
pub type PrunedHierarchy = BTreeMap<String, HierarchyNode>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "childrenNodes",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub children_nodes: PrunedHierarchy,
}

// Dropping the nested maps would recurse once per level; unlink them onto a stack instead.
impl Drop for HierarchyNode {
    fn drop(&mut self) {
        let mut pending: Vec<HierarchyNode> = std::mem::take(&mut self.children_nodes)
            .into_values()
            .collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(std::mem::take(&mut node.children_nodes).into_values());
        }
    }
}

/// Ids the caller asked to exclude.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    ids: BTreeSet<DbId>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated id list such as `"12, 40,41"`. Blank entries are ignored.
    pub fn parse_list(list: &str) -> Result<Self, HierarchyError> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry.parse::<DbId>().map_err(|_| {
                    HierarchyError::InvalidId(format!("{entry:?} in exclusion list"))
                })
            })
            .collect()
    }

    /// Read a JSON array of ids, as written by [`crate::artifact::write_excluded`].
    pub fn from_json_str(json: &str) -> Result<Self, HierarchyError> {
        let ids: Vec<DbId> = serde_json::from_str(json)?;
        Ok(ids.into_iter().collect())
    }

    pub fn insert(&mut self, id: DbId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: DbId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DbId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<DbId> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = DbId>>(iter: I) -> Self {
        ExclusionSet {
            ids: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Nodes written to the hierarchy, collisions included.
    pub emitted: usize,
    /// Entries that replaced an earlier sibling with the same composite key.
    pub collisions: usize,
    /// Child edges skipped because the child was already on the current path.
    pub cycles: usize,
    /// Root or child ids absent from the node map.
    pub missing: usize,
}

impl PruneStats {
    fn absorb(&mut self, other: PruneStats) {
        self.emitted += other.emitted;
        self.collisions += other.collisions;
        self.cycles += other.cycles;
        self.missing += other.missing;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneOutcome {
    pub hierarchy: PrunedHierarchy,
    pub excluded: ExcludedIdSet,
    pub stats: PruneStats,
}

/// Result of walking a single root.
#[derive(Default)]
struct RootWalk {
    entry: Option<(String, HierarchyNode)>,
    excluded: ExcludedIdSet,
    stats: PruneStats,
}

struct Frame<'f> {
    id: DbId,
    node: &'f NodeRecord,
    excluded: bool,
    cursor: usize,
    children: PrunedHierarchy,
}

pub struct HierarchyPruner<'a> {
    forest: &'a Forest,
    exclusions: &'a ExclusionSet,
    workers: usize,
}

impl<'a> HierarchyPruner<'a> {
    pub fn new(forest: &'a Forest, exclusions: &'a ExclusionSet) -> Self {
        HierarchyPruner {
            forest,
            exclusions,
            workers: 0,
        }
    }

    pub fn prune(&self) -> PruneOutcome {
        let cycle_logged = AtomicBool::new(false);
        let mut outcome = PruneOutcome::default();
        for root in self.forest.root_ids() {
            let walk = self.prune_root(*root, &cycle_logged);
            outcome.excluded.extend(walk.excluded.iter().copied());
            Self::merge(&mut outcome, walk);
        }
        self.finish(outcome)
    }

    /// Number of threads [`HierarchyPruner::prune_concurrent`] may use. Zero, the default,
    /// means the available parallelism of the host.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n,
        }
    }

    /// Same result as [`HierarchyPruner::prune`]. The roots are split into contiguous batches,
    /// one scoped thread per batch, and top-level entries are merged in root order once every
    /// walk has finished.
    pub fn prune_concurrent(&self) -> PruneOutcome {
        let cycle_logged = AtomicBool::new(false);
        let excluded: Mutex<ExcludedIdSet> = Mutex::new(BTreeSet::new());
        let roots = self.forest.root_ids();
        let batch_size = roots.len().div_ceil(self.worker_count()).max(1);
        tracing::debug!(
            "Pruning {} roots in batches of {} across {} workers",
            roots.len(),
            batch_size,
            roots.len().div_ceil(batch_size)
        );

        let walks: Vec<RootWalk> = std::thread::scope(|scope| {
            let handles: Vec<_> = roots
                .chunks(batch_size)
                .map(|batch| {
                    let cycle_logged = &cycle_logged;
                    let excluded = &excluded;
                    scope.spawn(move || {
                        let mut batch_excluded = ExcludedIdSet::new();
                        let walks: Vec<RootWalk> = batch
                            .iter()
                            .map(|root| {
                                let mut walk = self.prune_root(*root, cycle_logged);
                                batch_excluded.append(&mut walk.excluded);
                                walk
                            })
                            .collect();
                        excluded.lock().append(&mut batch_excluded);
                        walks
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        });

        let mut outcome = PruneOutcome {
            excluded: excluded.into_inner(),
            ..Default::default()
        };
        for walk in walks {
            Self::merge(&mut outcome, walk);
        }
        self.finish(outcome)
    }

    fn merge(outcome: &mut PruneOutcome, walk: RootWalk) {
        outcome.stats.absorb(walk.stats);
        if let Some((key, node)) = walk.entry {
            insert_entry(&mut outcome.hierarchy, key, node, &mut outcome.stats);
        }
    }

    fn finish(&self, outcome: PruneOutcome) -> PruneOutcome {
        tracing::info!(
            "Pruned {} roots: {} nodes emitted, {} ids excluded ({} explicit)",
            self.forest.root_ids().len(),
            outcome.stats.emitted,
            outcome.excluded.len(),
            self.exclusions.len()
        );
        outcome
    }

    fn prune_root(&self, root: DbId, cycle_logged: &AtomicBool) -> RootWalk {
        let mut walk = RootWalk::default();
        let Some(root_node) = self.forest.get(root) else {
            tracing::warn!("Root {} is not in the node map, skipping", root);
            walk.stats.missing += 1;
            return walk;
        };

        let root_excluded = self.exclusions.contains(root);
        if root_excluded {
            walk.excluded.insert(root);
        }
        let mut on_path: HashSet<DbId> = HashSet::from([root]);
        let mut stack = vec![Frame {
            id: root,
            node: root_node,
            excluded: root_excluded,
            cursor: 0,
            children: PrunedHierarchy::new(),
        }];

        while let Some(frame) = stack.last_mut() {
            if let Some(child) = frame.node.children.get(frame.cursor).copied() {
                frame.cursor += 1;
                let parent = frame.id;
                let inherited = frame.excluded;

                if on_path.contains(&child) {
                    walk.stats.cycles += 1;
                    if !cycle_logged.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            "Cycle detected: {} is an ancestor of {}, skipping",
                            child,
                            parent
                        );
                    }
                    continue;
                }
                let Some(child_node) = self.forest.get(child) else {
                    tracing::warn!(
                        "Child {} of {} is not in the node map, skipping",
                        child,
                        parent
                    );
                    walk.stats.missing += 1;
                    continue;
                };

                let excluded = inherited || self.exclusions.contains(child);
                if excluded {
                    walk.excluded.insert(child);
                }
                on_path.insert(child);
                stack.push(Frame {
                    id: child,
                    node: child_node,
                    excluded,
                    cursor: 0,
                    children: PrunedHierarchy::new(),
                });
                continue;
            }

            let Some(done) = stack.pop() else { break };
            on_path.remove(&done.id);
            if done.excluded {
                continue;
            }
            walk.stats.emitted += 1;
            let key = composite_key(done.id, done.node.name.as_deref());
            let entry = HierarchyNode {
                name: done.node.name.clone(),
                children_nodes: done.children,
            };
            match stack.last_mut() {
                Some(parent) => insert_entry(&mut parent.children, key, entry, &mut walk.stats),
                None => walk.entry = Some((key, entry)),
            }
        }
        walk
    }
}

/// Last write wins on identical composite keys.
fn insert_entry(
    map: &mut PrunedHierarchy,
    key: String,
    node: HierarchyNode,
    stats: &mut PruneStats,
) {
    if map.contains_key(&key) {
        tracing::debug!("Composite key collision on {:?}, keeping the later entry", key);
        stats.collisions += 1;
    }
    map.insert(key, node);
}
