use crate::{error::HierarchyError, properties::DbId};
use serde::{Deserialize, Serialize};
use std::{fs::read_to_string, path::Path};

/// Reserved property categories that carry structure instead of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub name: String,
    pub child: String,
    pub parent: String,
    pub category: String,
    pub instance_of: String,
    pub internal_ref: String,
    /// Any other category starting with this prefix is reserved and skipped.
    pub reserved_prefix: String,
    /// A parent marker pointing at this id flags the node as an explicit root.
    pub root_sentinel: DbId,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        MarkerConfig {
            name: "__name__".to_string(),
            child: "__child__".to_string(),
            parent: "__parent__".to_string(),
            category: "__category__".to_string(),
            instance_of: "__instanceof__".to_string(),
            internal_ref: "__internalref__".to_string(),
            reserved_prefix: "__".to_string(),
            root_sentinel: DbId(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub pretty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    pub markers: MarkerConfig,
    pub artifacts: ArtifactConfig,
}

impl HierarchyConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, HierarchyError> {
        let config: HierarchyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration at `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HierarchyError> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read hierarchy config from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(HierarchyConfig::default());
        }
        let content = read_to_string(path)?;
        HierarchyConfig::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), HierarchyError> {
        let m = &self.markers;
        let markers = [
            ("name", &m.name),
            ("child", &m.child),
            ("parent", &m.parent),
            ("category", &m.category),
            ("instance_of", &m.instance_of),
            ("internal_ref", &m.internal_ref),
        ];
        for (field, marker) in markers.iter() {
            if marker.is_empty() {
                return Err(HierarchyError::Config(format!(
                    "markers.{field} must not be empty"
                )));
            }
        }
        // every category starts with the empty string, so nothing would count as data
        if m.reserved_prefix.is_empty() {
            return Err(HierarchyError::Config(
                "markers.reserved_prefix must not be empty".to_string(),
            ));
        }
        for (i, (field, marker)) in markers.iter().enumerate() {
            if let Some((other, _)) = markers[i + 1..].iter().find(|(_, m)| m == marker) {
                return Err(HierarchyError::Config(format!(
                    "markers.{field} and markers.{other} share the category {marker:?}"
                )));
            }
        }
        Ok(())
    }
}
