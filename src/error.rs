use std::{io, num::ParseIntError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

/// Fatal errors raised at the crate boundary (artifact serialization, configuration, caller
/// supplied id lists). The graph algorithms themselves never fail; their anomalies are reported
/// as [`crate::diagnostic::GraphDiagnostic`]s instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum HierarchyError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid dbId: {0}")]
    InvalidId(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for HierarchyError {
    fn from(src: toml::de::Error) -> HierarchyError {
        HierarchyError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for HierarchyError {
    fn from(src: JsonError) -> HierarchyError {
        if src.is_io() {
            return HierarchyError::Io(format!("JSON writer failed: {src}"));
        }
        HierarchyError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<ParseIntError> for HierarchyError {
    fn from(src: ParseIntError) -> HierarchyError {
        HierarchyError::InvalidId(format!("{src}"))
    }
}

impl From<io::Error> for HierarchyError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => HierarchyError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => HierarchyError::PermissionDenied,
            _ => HierarchyError::Io(format!("IOError: {}", x.kind())),
        }
    }
}
