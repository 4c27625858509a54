//! Ordered application of patch operations.

use crate::error::{PatchError, PatchResult};
use crate::op::PatchOp;
use crate::path::{Path, Segment};
use serde_json::Value;

/// Apply `ops` to `doc` strictly in list order.
///
/// Application stops at the first failing operation; earlier operations stay
/// applied. Callers needing all-or-nothing semantics apply to a copy.
pub fn apply(doc: &mut Value, ops: &[PatchOp]) -> PatchResult<()> {
    for op in ops {
        apply_one(doc, op)?;
    }
    Ok(())
}

/// Decode `bytes` as JSON, apply `ops` and return the resulting value.
pub fn apply_to_bytes(bytes: &[u8], ops: &[PatchOp]) -> PatchResult<Value> {
    let mut doc: Value = serde_json::from_slice(bytes).map_err(|e| PatchError::InvalidDocument {
        message: e.to_string(),
    })?;
    apply(&mut doc, ops)?;
    Ok(doc)
}

/// Look up the value at `path`, if any.
pub fn get<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments().iter().try_fold(doc, |current, segment| match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        _ => None,
    })
}

fn apply_one(doc: &mut Value, op: &PatchOp) -> PatchResult<()> {
    let path = op.path();
    let Some((parent_segments, last)) = path.split_last() else {
        return match op {
            PatchOp::Replace { value, .. } => {
                *doc = value.clone();
                Ok(())
            }
            PatchOp::Remove { .. } => Err(PatchError::RemoveRoot),
        };
    };

    let parent = resolve_mut(doc, parent_segments, path)?;
    match op {
        PatchOp::Replace { value, .. } => replace_child(parent, last, value.clone(), path),
        PatchOp::Remove { .. } => remove_child(parent, last, path),
    }
}

fn resolve_mut<'a>(
    doc: &'a mut Value,
    segments: &[Segment],
    path: &Path,
) -> PatchResult<&'a mut Value> {
    let mut current = doc;
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(map), Segment::Key(key)) => map
                .get_mut(key)
                .ok_or_else(|| PatchError::MissingPath { path: path.clone() })?,
            (Value::Array(items), Segment::Index(index)) => {
                let len = items.len();
                items.get_mut(*index).ok_or_else(|| PatchError::IndexOutOfBounds {
                    path: path.clone(),
                    index: *index,
                    len,
                })?
            }
            (_, segment) => return Err(mismatch(segment, path)),
        };
    }
    Ok(current)
}

fn replace_child(parent: &mut Value, last: &Segment, value: Value, path: &Path) -> PatchResult<()> {
    match (parent, last) {
        (Value::Object(map), Segment::Key(key)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            match (*index).cmp(&len) {
                std::cmp::Ordering::Less => items[*index] = value,
                std::cmp::Ordering::Equal => items.push(value),
                std::cmp::Ordering::Greater => {
                    return Err(PatchError::IndexOutOfBounds {
                        path: path.clone(),
                        index: *index,
                        len,
                    })
                }
            }
            Ok(())
        }
        (_, segment) => Err(mismatch(segment, path)),
    }
}

fn remove_child(parent: &mut Value, last: &Segment, path: &Path) -> PatchResult<()> {
    match (parent, last) {
        (Value::Object(map), Segment::Key(key)) => {
            // Replayed removals of an absent key are harmless.
            map.remove(key);
            Ok(())
        }
        (Value::Array(items), Segment::Index(index)) => {
            if *index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.clone(),
                    index: *index,
                    len: items.len(),
                });
            }
            items.remove(*index);
            Ok(())
        }
        (_, segment) => Err(mismatch(segment, path)),
    }
}

fn mismatch(segment: &Segment, path: &Path) -> PatchError {
    let expected = match segment {
        Segment::Key(_) => "object",
        Segment::Index(_) => "array",
    };
    PatchError::NotAContainer {
        path: path.clone(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn replace_upserts_into_existing_parent() {
        let mut doc = json!({"status": {}});
        apply(&mut doc, &[PatchOp::replace(path!("status", "avail"), json!("up"))]).unwrap();
        assert_eq!(doc, json!({"status": {"avail": "up"}}));
    }

    #[test]
    fn replace_does_not_create_missing_parents() {
        let mut doc = json!({});
        let op = PatchOp::replace(path!("instance", "svc", "status"), json!({}));
        let err = apply(&mut doc, &[op]).unwrap_err();
        assert_matches!(err, PatchError::MissingPath { .. });
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn replace_at_root_swaps_document() {
        let mut doc = json!({"a": 1});
        apply(&mut doc, &[PatchOp::replace(Path::root(), json!([1]))]).unwrap();
        assert_eq!(doc, json!([1]));
    }

    #[test]
    fn remove_root_is_rejected() {
        let mut doc = json!({"a": 1});
        assert_eq!(apply(&mut doc, &[PatchOp::remove(Path::root())]), Err(PatchError::RemoveRoot));
    }

    #[test]
    fn array_replace_appends_at_len_and_rejects_past_it() {
        let mut doc = json!({"l": [1]});
        apply(&mut doc, &[PatchOp::replace(path!("l", 1usize), json!(2))]).unwrap();
        assert_eq!(doc, json!({"l": [1, 2]}));

        let err = apply(&mut doc, &[PatchOp::replace(path!("l", 5usize), json!(9))]).unwrap_err();
        assert_matches!(err, PatchError::IndexOutOfBounds { index: 5, len: 2, .. });
    }

    #[test]
    fn remove_missing_key_is_noop_but_missing_index_fails() {
        let mut doc = json!({"m": {}, "l": []});
        apply(&mut doc, &[PatchOp::remove(path!("m", "gone"))]).unwrap();
        let err = apply(&mut doc, &[PatchOp::remove(path!("l", 0usize))]).unwrap_err();
        assert_matches!(err, PatchError::IndexOutOfBounds { .. });
    }

    #[test]
    fn segment_kind_must_match_container() {
        let mut doc = json!({"l": [1]});
        let err = apply(&mut doc, &[PatchOp::replace(path!("l", "x"), json!(1))]).unwrap_err();
        assert_matches!(err, PatchError::NotAContainer { expected: "object", .. });
    }

    #[test]
    fn later_operations_win_on_overlap() {
        let mut doc = json!({});
        let ops = vec![
            PatchOp::replace(path!("a"), json!({"b": 1})),
            PatchOp::replace(path!("a", "b"), json!(2)),
            PatchOp::remove(path!("a", "b")),
            PatchOp::replace(path!("a"), json!(3)),
        ];
        apply(&mut doc, &ops).unwrap();
        assert_eq!(doc, json!({"a": 3}));
    }

    #[test]
    fn apply_to_bytes_decodes_first() {
        let out = apply_to_bytes(br#"{"a":1}"#, &[PatchOp::replace(path!("b"), json!(2))]).unwrap();
        assert_eq!(out, json!({"a": 1, "b": 2}));
        assert_matches!(apply_to_bytes(b"{", &[]), Err(PatchError::InvalidDocument { .. }));
    }

    #[test]
    fn get_follows_mixed_paths() {
        let doc = json!({"a": [{"b": 7}]});
        assert_eq!(get(&doc, &path!("a", 0usize, "b")), Some(&json!(7)));
        assert_eq!(get(&doc, &path!("a", 1usize)), None);
        assert_eq!(get(&doc, &Path::root()), Some(&doc));
    }
}
