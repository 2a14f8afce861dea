//! Diagnostic types for ingestion and reconciliation anomalies.
//!
//! Nothing the scene export can contain stops the pipeline. Conflicting property writes and
//! structural oddities (orphans, multi-parent nodes, forward references, cycles) are handled by
//! the algorithms and reported through these values, in addition to being traced.

use crate::properties::DbId;

/// Where a conflicting write happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictScope {
    /// `categories[name]`
    Category,
    /// `properties[category][name]`
    Property(String),
}

/// Non-fatal anomaly discovered while building or reconciling the forest.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphDiagnostic {
    /// A second, different value was written to an existing key. The first value was kept.
    DataConflict {
        id: DbId,
        scope: ConflictScope,
        key: String,
    },

    /// A child marker named an id that had not been ingested yet. The edge is re-linked once
    /// the child is ingested.
    DeferredReference { parent: DbId, child: DbId },

    /// An edge points at an id that never made it into the node map. The edge is ignored.
    DanglingReference { from: DbId, to: DbId },

    /// A child or parent marker whose value is not an id.
    MalformedReference {
        id: DbId,
        category: String,
        value: String,
    },

    /// A node that could not be reached from any seeded root.
    Orphan(DbId),

    /// A node listing more than one distinct parent.
    MultiParent { id: DbId, parents: Vec<DbId> },

    /// A walk came back to an id already on its current path.
    CycleDetected { at: DbId },
}

impl GraphDiagnostic {
    pub fn category_conflict(id: DbId, key: impl Into<String>) -> Self {
        Self::DataConflict {
            id,
            scope: ConflictScope::Category,
            key: key.into(),
        }
    }

    pub fn property_conflict(
        id: DbId,
        category: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::DataConflict {
            id,
            scope: ConflictScope::Property(category.into()),
            key: key.into(),
        }
    }

    /// Check if this diagnostic is a duplicate-value warning
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::DataConflict { .. })
    }

    /// Check if this diagnostic describes the shape of the graph rather than its data
    pub fn is_structural(&self) -> bool {
        !self.is_conflict()
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::CycleDetected { .. })
    }

    pub fn as_orphan(&self) -> Option<DbId> {
        match self {
            Self::Orphan(id) => Some(*id),
            _ => None,
        }
    }

    /// Emit this diagnostic through `tracing`. Conflicts and dangling or malformed references
    /// are warnings; the rest is expected in real exports and only logged at debug level.
    pub fn trace(&self) {
        match self {
            Self::DataConflict { .. }
            | Self::DanglingReference { .. }
            | Self::MalformedReference { .. }
            | Self::CycleDetected { .. } => tracing::warn!("{}", self),
            _ => tracing::debug!("{}", self),
        }
    }
}

impl std::fmt::Display for GraphDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataConflict {
                id,
                scope: ConflictScope::Category,
                key,
            } => write!(f, "category {key} already exists on id {id}"),
            Self::DataConflict {
                id,
                scope: ConflictScope::Property(category),
                key,
            } => write!(f, "prop {category}:{key} already exists on id {id}"),
            Self::DeferredReference { parent, child } => {
                write!(f, "child {child} of {parent} not ingested yet, deferring link")
            }
            Self::DanglingReference { from, to } => {
                write!(f, "reference from {from} to unknown id {to} dropped")
            }
            Self::MalformedReference {
                id,
                category,
                value,
            } => write!(f, "{category} on id {id} is not an id: {value}"),
            Self::Orphan(id) => write!(f, "id {id} is unreachable from the seeded roots"),
            Self::MultiParent { id, parents } => {
                write!(f, "id {id} has {} parents: {parents:?}", parents.len())
            }
            Self::CycleDetected { at } => write!(f, "cycle detected at id {at}"),
        }
    }
}
