//! The two export stages wired together.
//!
//! [`build_forest`] turns a scene into the reconciled [`Forest`] (`bim.json`).
//! [`export_hierarchy`] prunes a forest into the hierarchy and excluded id artifacts.

use crate::{
    config::HierarchyConfig,
    diagnostic::GraphDiagnostic,
    forest::Forest,
    ingest::{IngestStats, PropertyBagBuilder},
    prune::{ExclusionSet, HierarchyPruner, PruneOutcome},
    reconcile::{ForestReconciler, ReconcileStats},
    source::{PropertyDatabase, SceneReader},
};

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub forest: Forest,
    /// Ingestion diagnostics followed by reconciliation diagnostics.
    pub diagnostics: Vec<GraphDiagnostic>,
    pub ingest: IngestStats,
    pub reconcile: ReconcileStats,
}

impl BuildReport {
    pub fn conflicts(&self) -> impl Iterator<Item = &GraphDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_conflict())
    }

    pub fn structural(&self) -> impl Iterator<Item = &GraphDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_structural())
    }
}

pub fn build_forest<R, D>(reader: &R, db: &D, config: &HierarchyConfig) -> BuildReport
where
    R: SceneReader + ?Sized,
    D: PropertyDatabase + ?Sized,
{
    let fragments = reader.enumerate_fragments();
    tracing::debug!("Seeding ingestion from {} fragments", fragments.len());

    let mut builder = PropertyBagBuilder::new(db, config.markers.clone());
    builder.seed(fragments.iter().map(|fragment| fragment.db_id));
    let mut graph = builder.run();

    let mut diagnostics = std::mem::take(&mut graph.diagnostics);
    let ingest = graph.stats.clone();
    let reconciled = ForestReconciler::new(graph).reconcile();
    diagnostics.extend(reconciled.diagnostics);

    BuildReport {
        forest: reconciled.forest,
        diagnostics,
        ingest,
        reconcile: reconciled.stats,
    }
}

pub fn export_hierarchy(forest: &Forest, exclusions: &ExclusionSet) -> PruneOutcome {
    HierarchyPruner::new(forest, exclusions).prune()
}
