//! Property stream ingestion.
//!
//! [`PropertyBagBuilder`] drains a FIFO worklist of ids. Each id's property tuples are folded
//! into a [`NodeRecord`]; parent markers pull the parent id into the worklist, so the visited
//! superset grows upward from the scene's fragments until every ancestor has been ingested.
//!
//! Child markers only link ids that were already ingested. A child that has not been ingested
//! yet is parked in a pending table and linked as soon as it is, instead of being dropped.

use std::collections::{btree_map::Entry, BTreeMap, HashSet, VecDeque};

use crate::{
    config::MarkerConfig,
    diagnostic::GraphDiagnostic,
    properties::{value_to_name, DbId, NodeRecord, PropertyValue},
    source::{PropertyDatabase, PropertyRecord},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub ids_visited: usize,
    pub tuples_read: usize,
    pub reserved_skipped: usize,
    pub conflicts: usize,
    pub deferred_links: usize,
    pub dangling_links: usize,
}

/// Everything ingestion learned about the scene graph.
#[derive(Debug, Clone, Default)]
pub struct IngestedGraph {
    pub nodes: BTreeMap<DbId, NodeRecord>,
    /// Ids whose parent marker named the root sentinel, in discovery order.
    pub explicit_roots: Vec<DbId>,
    /// The parent id that marks explicit roots.
    pub root_sentinel: Option<DbId>,
    /// Every id taken off the worklist, in visitation order.
    pub visited: Vec<DbId>,
    pub diagnostics: Vec<GraphDiagnostic>,
    pub stats: IngestStats,
}

pub struct PropertyBagBuilder<'a, D: PropertyDatabase + ?Sized> {
    db: &'a D,
    markers: MarkerConfig,
    queue: VecDeque<DbId>,
    seen: HashSet<DbId>,
    graph: IngestedGraph,
    explicit_seen: HashSet<DbId>,
    /// child -> parents waiting for the child to be ingested
    pending_children: BTreeMap<DbId, Vec<DbId>>,
}

impl<'a, D: PropertyDatabase + ?Sized> PropertyBagBuilder<'a, D> {
    pub fn new(db: &'a D, markers: MarkerConfig) -> Self {
        let graph = IngestedGraph {
            root_sentinel: Some(markers.root_sentinel),
            ..Default::default()
        };
        PropertyBagBuilder {
            db,
            markers,
            queue: VecDeque::new(),
            seen: HashSet::new(),
            graph,
            explicit_seen: HashSet::new(),
            pending_children: BTreeMap::new(),
        }
    }

    /// Add ids to the back of the worklist.
    pub fn seed<I: IntoIterator<Item = DbId>>(&mut self, ids: I) -> &mut Self {
        self.queue.extend(ids);
        self
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Ingest the next id on the worklist. Ids that were already ingested are popped without
    /// effect. Returns `None` once the worklist is empty.
    pub fn ingest_next(&mut self) -> Option<DbId> {
        let id = self.queue.pop_front()?;
        if !self.seen.insert(id) {
            return Some(id);
        }
        self.graph.visited.push(id);
        self.graph.stats.ids_visited += 1;

        let mut node = NodeRecord::default();
        for record in self.db.enumerate_properties(id) {
            self.graph.stats.tuples_read += 1;
            self.apply(id, &mut node, record);
        }
        self.graph.nodes.insert(id, node);

        if let Some(parents) = self.pending_children.remove(&id) {
            for parent in parents {
                if let Some(parent_node) = self.graph.nodes.get_mut(&parent) {
                    tracing::trace!("Linking deferred child {} under {}", id, parent);
                    parent_node.children.push(id);
                    self.graph.stats.deferred_links += 1;
                }
            }
        }
        Some(id)
    }

    /// Drain the worklist and hand back the ingested graph.
    pub fn run(mut self) -> IngestedGraph {
        while self.ingest_next().is_some() {}
        self.finish()
    }

    fn finish(mut self) -> IngestedGraph {
        let pending = std::mem::take(&mut self.pending_children);
        for (child, parents) in pending {
            for parent in parents {
                self.graph.stats.dangling_links += 1;
                self.report(GraphDiagnostic::DanglingReference {
                    from: parent,
                    to: child,
                });
            }
        }
        tracing::debug!(
            "Ingested {} ids from {} property tuples ({} explicit roots)",
            self.graph.stats.ids_visited,
            self.graph.stats.tuples_read,
            self.graph.explicit_roots.len()
        );
        self.graph
    }

    fn apply(&mut self, id: DbId, node: &mut NodeRecord, record: PropertyRecord) {
        let PropertyRecord {
            category,
            name,
            value,
            unit,
        } = record;
        let markers = &self.markers;

        if category == markers.name {
            node.name = Some(value_to_name(&value));
        } else if category == markers.child {
            let Some(child) = self.reference(id, &category, &value) else {
                return;
            };
            if self.seen.contains(&child) {
                node.children.push(child);
            } else {
                self.pending_children.entry(child).or_default().push(id);
                self.report(GraphDiagnostic::DeferredReference { parent: id, child });
            }
        } else if category == markers.parent {
            let Some(parent) = self.reference(id, &category, &value) else {
                return;
            };
            node.parents.push(parent);
            if !self.seen.contains(&parent) {
                self.queue.push_back(parent);
            }
            if parent == self.markers.root_sentinel && self.explicit_seen.insert(id) {
                self.graph.explicit_roots.push(id);
            }
        } else if category == markers.category {
            match node.categories.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(slot) => {
                    if *slot.get() != value {
                        let key = slot.key().clone();
                        self.conflict(GraphDiagnostic::category_conflict(id, key));
                    }
                }
            }
        } else if category == markers.instance_of
            || category == markers.internal_ref
            || category.starts_with(&markers.reserved_prefix)
        {
            tracing::trace!("Skipping reserved category {} on id {}", category, id);
            self.graph.stats.reserved_skipped += 1;
        } else {
            let bag = node.properties.entry(category.clone()).or_default();
            match bag.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(PropertyValue::new(value, unit));
                }
                Entry::Occupied(slot) => {
                    if slot.get().value != value {
                        let key = slot.key().clone();
                        self.conflict(GraphDiagnostic::property_conflict(id, category, key));
                    }
                }
            }
        }
    }

    fn reference(&mut self, id: DbId, category: &str, value: &serde_json::Value) -> Option<DbId> {
        let reference = DbId::from_value(value);
        if reference.is_none() {
            self.report(GraphDiagnostic::MalformedReference {
                id,
                category: category.to_string(),
                value: value.to_string(),
            });
        }
        reference
    }

    fn conflict(&mut self, diagnostic: GraphDiagnostic) {
        self.graph.stats.conflicts += 1;
        self.report(diagnostic);
    }

    fn report(&mut self, diagnostic: GraphDiagnostic) {
        diagnostic.trace();
        self.graph.diagnostics.push(diagnostic);
    }
}
