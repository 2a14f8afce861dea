//! Shared test utilities for forest and hierarchy testing

use crate::{
    forest::Forest,
    properties::{DbId, NodeRecord},
    source::{MemoryPropertyDb, PropertyRecord},
};
use serde_json::json;
use std::collections::BTreeMap;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Build a node map from `(id, name, children, parents)` rows. Edges are taken as given, so
/// callers can describe inconsistent adjacency on purpose.
pub fn forest_nodes(rows: &[(i64, &str, &[i64], &[i64])]) -> BTreeMap<DbId, NodeRecord> {
    rows.iter()
        .map(|(id, name, children, parents)| {
            let node = NodeRecord::named(*name)
                .with_children(children.iter().copied())
                .with_parents(parents.iter().copied());
            (DbId(*id), node)
        })
        .collect()
}

/// A forest whose adjacency is derived from the child lists alone.
pub fn tree(rows: &[(i64, &str, &[i64])], roots: &[i64]) -> Forest {
    let mut nodes: BTreeMap<DbId, NodeRecord> = rows
        .iter()
        .map(|(id, name, children)| {
            (DbId(*id), NodeRecord::named(*name).with_children(children.iter().copied()))
        })
        .collect();
    for (id, _, children) in rows {
        for child in children.iter() {
            if let Some(node) = nodes.get_mut(&DbId(*child)) {
                node.add_parent(DbId(*id));
            }
        }
    }
    Forest::new(nodes, roots.iter().copied().map(DbId).collect())
}

/// Property rows for a scene node: its name, one `__parent__` marker per parent and one
/// `__child__` marker per child.
pub fn insert_scene_node(
    db: &mut MemoryPropertyDb,
    id: i64,
    name: &str,
    parents: &[i64],
    children: &[i64],
) {
    db.insert(id, PropertyRecord::new("__name__", "name", json!(name)));
    for parent in parents {
        db.insert(id, PropertyRecord::new("__parent__", "parent", json!(parent)));
    }
    for child in children {
        db.insert(id, PropertyRecord::new("__child__", "child", json!(child)));
    }
}
