//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use bim_hierarchy::{
    prune::PrunedHierarchy,
    source::{MemoryPropertyDb, PropertyRecord},
};
use serde_json::json;

/// Scene ids start here so none of them collides with the root sentinel.
#[allow(dead_code)]
pub const BASE_ID: i64 = 100;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times, subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Name plus structure markers for one scene element.
#[allow(dead_code)]
pub fn scene_node(
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

/// A scene tree rooted at [`BASE_ID`]. `links[i]` is `(raw parent, listed)` for element `i`:
/// the parent of element `i > 0` is `raw % i`, and `listed` decides whether the parent also
/// names the element with a child marker.
#[allow(dead_code)]
pub fn random_tree_db(links: &[(usize, bool)]) -> MemoryPropertyDb {
    let mut children: Vec<Vec<i64>> = vec![Vec::new(); links.len()];
    let mut parents: Vec<Option<i64>> = vec![None; links.len()];
    for (i, (raw, listed)) in links.iter().enumerate().skip(1) {
        let parent = raw % i;
        parents[i] = Some(BASE_ID + parent as i64);
        if *listed {
            children[parent].push(BASE_ID + i as i64);
        }
    }

    let mut db = MemoryPropertyDb::new();
    for i in 0..links.len() {
        let parent: Vec<i64> = parents[i].into_iter().collect();
        scene_node(&mut db, BASE_ID + i as i64, &format!("e{i}"), &parent, &children[i]);
    }
    db
}

/// Number of entries in a hierarchy, at every depth.
#[allow(dead_code)]
pub fn count_entries(hierarchy: &PrunedHierarchy) -> usize {
    let mut count = 0;
    let mut stack = vec![hierarchy];
    while let Some(level) = stack.pop() {
        count += level.len();
        stack.extend(level.values().map(|node| &node.children_nodes));
    }
    count
}
