//! Patch operations and their compact wire encoding.

use crate::path::Path;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A single path-addressed mutation.
///
/// Encoded as `[path, value]` for a replace and `[path]` for a remove.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Upsert `value` at `path`
    Replace {
        /// Target location
        path: Path,
        /// New value
        value: Value,
    },
    /// Delete the key or index at `path`
    Remove {
        /// Target location
        path: Path,
    },
}

impl PatchOp {
    /// Create a replace operation
    pub fn replace(path: Path, value: Value) -> Self {
        Self::Replace { path, value }
    }

    /// Create a remove operation
    pub fn remove(path: Path) -> Self {
        Self::Remove { path }
    }

    /// Target path of the operation
    pub fn path(&self) -> &Path {
        match self {
            Self::Replace { path, .. } | Self::Remove { path } => path,
        }
    }

    /// Whether this is a remove
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

impl Serialize for PatchOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PatchOp::Replace { path, value } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(path)?;
                seq.serialize_element(value)?;
                seq.end()
            }
            PatchOp::Remove { path } => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(path)?;
                seq.end()
            }
        }
    }
}

struct PatchOpVisitor;

impl<'de> Visitor<'de> for PatchOpVisitor {
    type Value = PatchOp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a [path] or [path, value] array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PatchOp, A::Error> {
        let path: Path = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let value: Option<Value> = seq.next_element()?;
        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(3, &self));
        }
        Ok(match value {
            Some(value) => PatchOp::Replace { path, value },
            None => PatchOp::Remove { path },
        })
    }
}

impl<'de> Deserialize<'de> for PatchOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(PatchOpVisitor)
    }
}
