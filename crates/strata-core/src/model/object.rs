#![allow(missing_docs)]

use super::{Provisioned, Status, Timestamped};
use crate::names::NodeName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object status aggregated over every instance, computed locally
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStatus {
    pub avail: Status,
    pub overall: Status,
    pub placement_state: String,
    /// `frozen`, `thawed`, `mixed` or `n/a`
    pub frozen: String,
    pub provisioned: Provisioned,
    #[serde(default)]
    pub scope: Vec<NodeName>,
    pub updated_at: DateTime<Utc>,
}

impl Timestamped for ObjectStatus {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
