//! Narrow interfaces to the scene collaborators.
//!
//! Decoding the scene file and its compressed property tables happens elsewhere. The core only
//! needs the fragment list to seed ingestion and a way to enumerate one id's property tuples.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{error::HierarchyError, properties::DbId};

/// One `{category, name, value, unit?}` tuple of a node's property stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub category: String,
    pub name: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl PropertyRecord {
    pub fn new(category: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        PropertyRecord {
            category: category.into(),
            name: name.into(),
            value,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// A renderable scene fragment. Only its owning id matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(rename = "dbID")]
    pub db_id: DbId,
}

pub trait PropertyDatabase {
    /// All property tuples of `id`, in storage order. Unknown ids yield an empty list. Calling
    /// this twice for the same id returns the same sequence.
    fn enumerate_properties(&self, id: DbId) -> Vec<PropertyRecord>;
}

pub trait SceneReader {
    fn enumerate_fragments(&self) -> Vec<Fragment>;
}

/// Flattened row of a property dump, as produced by the property table decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRow {
    #[serde(rename = "dbID", alias = "dbId")]
    pub db_id: DbId,
    #[serde(flatten)]
    pub record: PropertyRecord,
}

/// Property database backed by already decoded rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryPropertyDb {
    rows: BTreeMap<DbId, Vec<PropertyRecord>>,
}

impl MemoryPropertyDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i64, record: PropertyRecord) -> &mut Self {
        self.rows.entry(DbId(id)).or_default().push(record);
        self
    }

    pub fn from_rows<I: IntoIterator<Item = PropertyRow>>(rows: I) -> Self {
        let mut db = Self::new();
        for row in rows {
            db.insert(row.db_id.get(), row.record);
        }
        db
    }

    /// Parse a JSON array of `{dbID, category, name, value, unit?}` rows.
    pub fn from_json_str(json: &str) -> Result<Self, HierarchyError> {
        let rows: Vec<PropertyRow> = serde_json::from_str(json)?;
        Ok(Self::from_rows(rows))
    }

    pub fn ids(&self) -> impl Iterator<Item = DbId> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl PropertyDatabase for MemoryPropertyDb {
    fn enumerate_properties(&self, id: DbId) -> Vec<PropertyRecord> {
        self.rows.get(&id).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryScene {
    fragments: Vec<Fragment>,
}

impl MemoryScene {
    pub fn new<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        MemoryScene {
            fragments: ids
                .into_iter()
                .map(|id| Fragment { db_id: DbId(id) })
                .collect(),
        }
    }
}

impl SceneReader for MemoryScene {
    fn enumerate_fragments(&self) -> Vec<Fragment> {
        self.fragments.clone()
    }
}
