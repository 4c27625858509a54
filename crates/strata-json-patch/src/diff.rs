//! Structural diff producing replace/remove operations.

use crate::op::PatchOp;
use crate::path::Path;
use serde_json::{Map, Value};

/// Compute the operations turning `old` into `new`.
///
/// Objects and arrays are diffed recursively; any shape mismatch at a path
/// collapses to a single replace of that path. Applying the result to `old`
/// in order yields `new`.
pub fn diff(old: &Value, new: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_at(&mut ops, Path::root(), old, new);
    ops
}

fn diff_at(ops: &mut Vec<PatchOp>, path: Path, old: &Value, new: &Value) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_objects(ops, &path, a, b),
        (Value::Array(a), Value::Array(b)) => diff_arrays(ops, &path, a, b),
        _ if old == new => {}
        _ => ops.push(PatchOp::replace(path, new.clone())),
    }
}

fn diff_objects(
    ops: &mut Vec<PatchOp>,
    path: &Path,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
) {
    for key in old.keys() {
        if !new.contains_key(key) {
            ops.push(PatchOp::remove(path.child(key.as_str())));
        }
    }
    for (key, new_value) in new {
        let child = path.child(key.as_str());
        match old.get(key) {
            Some(old_value) => diff_at(ops, child, old_value, new_value),
            None => ops.push(PatchOp::replace(child, new_value.clone())),
        }
    }
}

fn diff_arrays(ops: &mut Vec<PatchOp>, path: &Path, old: &[Value], new: &[Value]) {
    // Highest index first so each removal addresses an existing element.
    for index in (new.len()..old.len()).rev() {
        ops.push(PatchOp::remove(path.child(index)));
    }
    let shared = old.len().min(new.len());
    for (index, (a, b)) in old.iter().zip(new.iter()).enumerate() {
        diff_at(ops, path.child(index), a, b);
    }
    for (index, value) in new.iter().enumerate().skip(shared) {
        ops.push(PatchOp::replace(path.child(index), value.clone()));
    }
}
