//! Node names and object paths.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Name of a cluster node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    /// Create a node name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for NodeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Kind of a configured object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Service
    Svc,
    /// Volume
    Vol,
    /// Configuration map
    Cfg,
    /// Secret
    Sec,
    /// User
    Usr,
    /// Namespace configuration
    Nscfg,
    /// Cluster configuration
    Ccfg,
}

impl ObjectKind {
    /// Lowercase name used in paths
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Svc => "svc",
            ObjectKind::Vol => "vol",
            ObjectKind::Cfg => "cfg",
            ObjectKind::Sec => "sec",
            ObjectKind::Usr => "usr",
            ObjectKind::Nscfg => "nscfg",
            ObjectKind::Ccfg => "ccfg",
        }
    }
}

impl FromStr for ObjectKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "svc" => Ok(ObjectKind::Svc),
            "vol" => Ok(ObjectKind::Vol),
            "cfg" => Ok(ObjectKind::Cfg),
            "sec" => Ok(ObjectKind::Sec),
            "usr" => Ok(ObjectKind::Usr),
            "nscfg" => Ok(ObjectKind::Nscfg),
            "ccfg" => Ok(ObjectKind::Ccfg),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path of a configured object, used as the instance map key.
///
/// Accepted forms are `name` (a service in the root namespace) and
/// `namespace/kind/name`. The string form is kept as-is on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Namespace of objects given without one
    pub const ROOT_NAMESPACE: &'static str = "root";

    /// Parse and validate an object path
    pub fn parse(s: &str) -> CoreResult<Self> {
        let invalid = |reason| CoreError::InvalidObjectPath {
            path: s.to_string(),
            reason,
        };
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self(s.to_string())),
            [namespace, kind, name] => {
                if namespace.is_empty() || name.is_empty() {
                    return Err(invalid("empty namespace or name"));
                }
                kind.parse::<ObjectKind>().map_err(|()| invalid("unknown kind"))?;
                Ok(Self(s.to_string()))
            }
            [""] => Err(invalid("empty path")),
            _ => Err(invalid("expected name or namespace/kind/name")),
        }
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part, `root` when omitted
    pub fn namespace(&self) -> &str {
        match self.0.split('/').collect::<Vec<_>>().as_slice() {
            [namespace, _, _] => namespace,
            _ => Self::ROOT_NAMESPACE,
        }
    }

    /// Kind part, `svc` when omitted; `None` for an unknown kind
    pub fn kind(&self) -> Option<ObjectKind> {
        match self.0.split('/').collect::<Vec<_>>().as_slice() {
            [_, kind, _] => kind.parse().ok(),
            _ => Some(ObjectKind::Svc),
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Borrow<str> for ObjectPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}
