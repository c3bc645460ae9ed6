//! Target object naming and lifecycle.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum object name length accepted by the store.
const MAX_OBJECT_NAME_LEN: usize = 1024;

/// Name of the single object a run stages blocks against.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectName(String);

impl ObjectName {
    /// Generate a unique name of the form `{prefix}{uuid}.dat`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}{}.dat", Uuid::new_v4()))
    }

    /// Parse a caller-supplied name.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidObjectName("name is empty".to_string()));
        }
        if name.len() > MAX_OBJECT_NAME_LEN {
            return Err(Error::InvalidObjectName(format!(
                "name is {} bytes (max: {MAX_OBJECT_NAME_LEN})",
                name.len()
            )));
        }
        if name.ends_with('/') || name.starts_with('/') {
            return Err(Error::InvalidObjectName(format!(
                "leading or trailing slash: {name}"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectName({})", self.0)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of the target object as observed in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// Never written.
    Absent,
    /// Holds staged blocks but no committed version.
    HasUncommittedBlocks,
    /// Has a committed, readable version.
    Committed,
    /// Was removed by a delete.
    Deleted,
}

impl ObjectState {
    /// Whether the store would report the object as existing.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::HasUncommittedBlocks | Self::Committed)
    }
}
