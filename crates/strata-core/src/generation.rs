//! Generation counters and the owner × observer generation matrix.
//!
//! Every node owns a single monotonically increasing [`Generation`]. The
//! [`GenerationMatrix`] records, for each observer, the last generation of
//! each owner that the observer has absorbed. The local node's row is the one
//! it advertises in every heartbeat; peer rows mirror what peers advertise.

use crate::names::NodeName;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-node generation counter. `0` means "no baseline".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// No baseline / unknown
    pub const UNKNOWN: Generation = Generation(0);

    /// First generation of a freshly started node
    pub const INITIAL: Generation = Generation(1);

    /// Wrap a raw counter
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Following generation
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Whether this is the "no baseline" marker
    pub const fn is_unknown(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// Accepts integers and decimal strings: JSON object keys carry generations as
// strings, and buffered (internally tagged) decoding loses serde_json's key
// coercion.
impl<'de> Deserialize<'de> for Generation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GenerationVisitor;

        impl<'de> Visitor<'de> for GenerationVisitor {
            type Value = Generation;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or its decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Generation, E> {
                Ok(Generation(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Generation, E> {
                u64::try_from(v)
                    .map(Generation)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Generation, E> {
                v.parse::<u64>()
                    .map(Generation)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(GenerationVisitor)
    }
}

/// One observer's view: owner → last absorbed generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationRow(BTreeMap<NodeName, Generation>);

impl GenerationRow {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation recorded for `owner`, [`Generation::UNKNOWN`] when absent
    pub fn get(&self, owner: &NodeName) -> Generation {
        self.0.get(owner).copied().unwrap_or_default()
    }

    /// Record a generation for `owner`
    pub fn set(&mut self, owner: NodeName, generation: Generation) {
        self.0.insert(owner, generation);
    }

    /// Forget `owner`
    pub fn remove(&mut self, owner: &NodeName) -> Option<Generation> {
        self.0.remove(owner)
    }

    /// Whether `owner` has an entry (even a zero one)
    pub fn contains(&self, owner: &NodeName) -> bool {
        self.0.contains_key(owner)
    }

    /// Iterate over `(owner, generation)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, Generation)> {
        self.0.iter().map(|(name, gen)| (name, *gen))
    }
}

impl FromIterator<(NodeName, Generation)> for GenerationRow {
    fn from_iter<I: IntoIterator<Item = (NodeName, Generation)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Typed owner × observer generation matrix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMatrix {
    rows: BTreeMap<NodeName, GenerationRow>,
}

impl GenerationMatrix {
    /// Empty matrix
    pub fn new() -> Self {
        Self::default()
    }

    /// `observer`'s last-known view of `owner`'s generation
    pub fn get(&self, owner: &NodeName, observer: &NodeName) -> Generation {
        self.rows
            .get(observer)
            .map(|row| row.get(owner))
            .unwrap_or_default()
    }

    /// Record `observer`'s view of `owner`'s generation
    pub fn set(&mut self, owner: &NodeName, observer: &NodeName, generation: Generation) {
        self.rows
            .entry(observer.clone())
            .or_default()
            .set(owner.clone(), generation);
    }

    /// Row advertised by `observer`
    pub fn row(&self, observer: &NodeName) -> Option<&GenerationRow> {
        self.rows.get(observer)
    }

    /// Replace `observer`'s row wholesale with what it reported
    pub fn replace_row(&mut self, observer: &NodeName, row: GenerationRow) {
        self.rows.insert(observer.clone(), row);
    }

    /// Drop `node` both as an observer and as an owner in every row
    pub fn remove_node(&mut self, node: &NodeName) {
        self.rows.remove(node);
        for row in self.rows.values_mut() {
            row.remove(node);
        }
    }

    /// Observers with a row, in name order
    pub fn observers(&self) -> impl Iterator<Item = &NodeName> {
        self.rows.keys()
    }

    /// Lowest view of `owner`'s generation among observers other than `owner`.
    ///
    /// Returns `None` when no other observer is tracked.
    pub fn low_water_mark(&self, owner: &NodeName) -> Option<Generation> {
        self.rows
            .iter()
            .filter(|(observer, _)| *observer != owner)
            .map(|(_, row)| row.get(owner))
            .min()
    }
}
