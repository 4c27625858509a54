//! # Strata JSON Patch
//!
//! Structural diff and ordered application of path-addressed operations on
//! JSON-shaped values. This is the wire form of replicated node state: a node
//! records each local mutation as a [`PatchOp`], peers replay them in order.
//!
//! ## Operations
//!
//! - **replace**: upsert a value at a path. The parent container must exist.
//! - **remove**: delete an object key or an array index.
//!
//! On the wire an operation is a JSON array: `[path, value]` is a replace and
//! `[path]` is a remove. Path segments are strings (object keys) or integers
//! (array indices).
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use strata_json_patch::{apply, diff};
//!
//! let old = json!({"status": {"avail": "up"}, "labels": ["a", "b"]});
//! let new = json!({"status": {"avail": "down"}, "labels": ["a"]});
//!
//! let ops = diff(&old, &new);
//! let mut doc = old.clone();
//! apply(&mut doc, &ops).unwrap();
//! assert_eq!(doc, new);
//! ```

#![forbid(unsafe_code)]

mod apply;
mod diff;
mod error;
mod op;
mod path;

pub use apply::{apply, apply_to_bytes, get};
pub use diff::diff;
pub use error::{PatchError, PatchResult};
pub use op::PatchOp;
pub use path::{Path, Segment};
