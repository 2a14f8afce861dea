//! # bim-hierarchy
//!
//! Turns the flat property graph of a CAD/BIM scene export into a named object hierarchy, and
//! prunes that hierarchy against a list of excluded ids.
//!
//! ## Overview
//!
//! A scene export stores structure as reserved property tuples (`__name__`, `__parent__`,
//! `__child__`, ...) next to ordinary element properties. Those markers are incomplete and
//! inconsistent in practice: parents forget children, nodes have several parents, forward
//! references point at ids that were not read yet. This crate rebuilds a consistent forest out of
//! them and exports it in two stages:
//!
//! 1. **Scene to forest** (`bim.json`): ingest every property tuple reachable from the scene's
//!    fragments, then reconcile roots, orphans and back edges.
//! 2. **Forest to hierarchy** (`bim_hierarchy.json`, `bim_hierarchy_excluded.json`): walk the
//!    forest, rename every node to `"[DBID: <id>] <name>"`, drop excluded subtrees and collect
//!    every excluded id.
//!
//! Neither stage fails on bad data. Anomalies are traced and returned as
//! [`diagnostic::GraphDiagnostic`] values.
//!
//! ## Architecture
//!
//! - **[`source`]**: Collaborator traits (`SceneReader`, `PropertyDatabase`) and in-memory impls
//! - **[`ingest`]**: `PropertyBagBuilder`, the worklist that folds property tuples into nodes
//! - **[`reconcile`]**: `ForestReconciler`, root selection and graph repair
//! - **[`forest`]**: The reconciled `Forest` and its petgraph view
//! - **[`prune`]**: `HierarchyPruner`, exclusion sets and the pruned output tree
//! - **[`pipeline`]**: Both stages wired together
//! - **[`artifact`]**: JSON writers for the exported files
//! - **[`config`]**: Marker categories and output options, loaded from TOML
//!
//! ## Quick Start
//!
//! ```rust
//! use bim_hierarchy::{
//!     config::HierarchyConfig,
//!     pipeline::{build_forest, export_hierarchy},
//!     prune::ExclusionSet,
//!     source::{MemoryPropertyDb, MemoryScene, PropertyRecord},
//! };
//! use serde_json::json;
//!
//! let mut db = MemoryPropertyDb::new();
//! db.insert(2, PropertyRecord::new("__name__", "name", json!("Model")));
//! db.insert(3, PropertyRecord::new("__name__", "name", json!("Wall")))
//!     .insert(3, PropertyRecord::new("__parent__", "parent", json!(2)));
//! let scene = MemoryScene::new([3]);
//!
//! let report = build_forest(&scene, &db, &HierarchyConfig::default());
//! assert_eq!(report.forest.root_ids().len(), 1);
//!
//! let outcome = export_hierarchy(&report.forest, &ExclusionSet::parse_list("3")?);
//! assert!(outcome.hierarchy.contains_key("[DBID: 2] Model"));
//! assert_eq!(outcome.excluded.len(), 1);
//! # Ok::<(), bim_hierarchy::HierarchyError>(())
//! ```

pub mod artifact;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod forest;
pub mod ingest;
pub mod pipeline;
pub mod properties;
pub mod prune;
pub mod reconcile;
pub mod source;
#[cfg(test)]
mod tests;

pub use error::*;
