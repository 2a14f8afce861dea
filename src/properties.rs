/// [crate::properties] contains the basic building blocks of the scene graph: identifiers,
/// property values and the per-id [NodeRecord].
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::error::HierarchyError;

/// Scene element identifier ("dbID").
///
/// Ids are integers in the scene database, but every exported artifact keys nodes by the
/// decimal string form. `DbId` therefore always serializes as a string and accepts either a
/// string or an integer when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DbId(pub i64);

impl DbId {
    pub fn new(id: i64) -> Self {
        DbId(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    /// Interpret a JSON property value as a node reference. Integers and integer strings are
    /// accepted, anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<DbId> {
        match value {
            Value::Number(n) => n.as_i64().map(DbId),
            Value::String(s) => s.trim().parse::<i64>().ok().map(DbId),
            _ => None,
        }
    }
}

impl Display for DbId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DbId {
    fn from(id: i64) -> Self {
        DbId(id)
    }
}

impl FromStr for DbId {
    type Err = HierarchyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DbId(s.trim().parse::<i64>()?))
    }
}

impl Serialize for DbId {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DbId {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        struct DbIdVisitor;
        impl Visitor<'_> for DbIdVisitor {
            type Value = DbId;

            fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
                write!(formatter, "an integer dbId or its decimal string form")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<DbId, E> {
                Ok(DbId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<DbId, E> {
                i64::try_from(v)
                    .map(DbId)
                    .map_err(|_| E::custom(format!("dbId {v} out of range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<DbId, E> {
                v.trim()
                    .parse::<i64>()
                    .map(DbId)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }
        de.deserialize_any(DbIdVisitor)
    }
}

/// A regular property value with its optional unit of measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl PropertyValue {
    pub fn new(value: Value, unit: Option<String>) -> Self {
        PropertyValue {
            value,
            unit: unit.filter(|u| !u.is_empty()),
        }
    }
}

/// category -> property name -> value
pub type PropertyBag = BTreeMap<String, BTreeMap<String, PropertyValue>>;

/// One node of the scene graph as assembled from its property stream.
///
/// `children` and `parents` keep declaration order and may contain duplicates until the
/// forest is reconciled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: PropertyBag,
    #[serde(default)]
    pub categories: BTreeMap<String, Value>,
    #[serde(default)]
    pub children: Vec<DbId>,
    #[serde(default)]
    pub parents: Vec<DbId>,
}

impl NodeRecord {
    pub fn named(name: impl Into<String>) -> Self {
        NodeRecord {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_children<I: IntoIterator<Item = i64>>(mut self, children: I) -> Self {
        self.children.extend(children.into_iter().map(DbId));
        self
    }

    pub fn with_parents<I: IntoIterator<Item = i64>>(mut self, parents: I) -> Self {
        self.parents.extend(parents.into_iter().map(DbId));
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Append `child` unless it is already listed. Returns whether the edge was added.
    pub fn add_child(&mut self, child: DbId) -> bool {
        if self.children.contains(&child) {
            false
        } else {
            self.children.push(child);
            true
        }
    }

    /// Append `parent` unless it is already listed. Returns whether the edge was added.
    pub fn add_parent(&mut self, parent: DbId) -> bool {
        if self.parents.contains(&parent) {
            false
        } else {
            self.parents.push(parent);
            true
        }
    }
}

/// The human readable key a surviving node is published under: `[DBID: <id>] <name>`.
pub fn composite_key(id: DbId, name: Option<&str>) -> String {
    format!("[DBID: {id}] {}", name.unwrap_or_default())
}

/// Render a JSON property value as a display name. Strings are taken verbatim.
pub fn value_to_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Remove repeated entries while keeping the first occurrence of each.
pub(crate) fn dedup_in_order(ids: &mut Vec<DbId>) -> bool {
    let before = ids.len();
    let mut seen = std::collections::HashSet::with_capacity(before);
    ids.retain(|id| seen.insert(*id));
    before != ids.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dbid_serializes_as_string() {
        let id = DbId(42);
        assert_eq!(serde_json::to_value(id).unwrap(), json!("42"));
    }

    #[test]
    fn test_dbid_deserializes_from_number_or_string() {
        let ids: Vec<DbId> = serde_json::from_value(json!([1, "2", " 3 "])).unwrap();
        assert_eq!(ids, vec![DbId(1), DbId(2), DbId(3)]);

        assert!(serde_json::from_value::<DbId>(json!("wall")).is_err());
        assert!(serde_json::from_value::<DbId>(json!(true)).is_err());
    }

    #[test]
    fn test_dbid_as_map_key() {
        let mut map = BTreeMap::new();
        map.insert(DbId(10), 1);
        map.insert(DbId(2), 2);
        let text = serde_json::to_string(&map).unwrap();
        assert_eq!(text, r#"{"2":2,"10":1}"#);

        let back: BTreeMap<DbId, i32> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_dbid_from_value() {
        assert_eq!(DbId::from_value(&json!(7)), Some(DbId(7)));
        assert_eq!(DbId::from_value(&json!("8")), Some(DbId(8)));
        assert_eq!(DbId::from_value(&json!(1.5)), None);
        assert_eq!(DbId::from_value(&json!(null)), None);
    }

    #[test]
    fn test_composite_key() {
        assert_eq!(composite_key(DbId(3), Some("Wall")), "[DBID: 3] Wall");
        assert_eq!(composite_key(DbId(3), None), "[DBID: 3] ");
    }

    #[test]
    fn test_property_value_drops_empty_unit() {
        let value = PropertyValue::new(json!(3.5), Some(String::new()));
        assert_eq!(value.unit, None);
        assert_eq!(serde_json::to_value(&value).unwrap(), json!({"value": 3.5}));
    }

    #[test]
    fn test_dedup_in_order() {
        let mut ids = vec![DbId(3), DbId(1), DbId(3), DbId(2), DbId(1)];
        assert!(dedup_in_order(&mut ids));
        assert_eq!(ids, vec![DbId(3), DbId(1), DbId(2)]);
        assert!(!dedup_in_order(&mut ids));
    }

    #[test]
    fn test_node_record_edges() {
        let mut node = NodeRecord::named("Level 1").with_children([4, 5]);
        assert!(!node.add_child(DbId(4)));
        assert!(node.add_child(DbId(6)));
        assert!(node.add_parent(DbId(1)));
        assert!(!node.add_parent(DbId(1)));
        assert_eq!(node.children, vec![DbId(4), DbId(5), DbId(6)]);
        assert_eq!(node.display_name(), "Level 1");
    }
}
