//! Path addressing inside a JSON document.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a [`Path`]: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    /// Array index
    Index(usize),
    /// Object key
    Key(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "{i}"),
            Segment::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// Ordered sequence of segments from the document root.
///
/// The empty path addresses the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from anything convertible into segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Return a new path extended by one segment.
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Segments in root-to-leaf order.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Split into the parent path and the last segment.
    pub fn split_last(&self) -> Option<(&[Segment], &Segment)> {
        self.0.split_last().map(|(last, parent)| (parent, last))
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` equals `other` or lies underneath it.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl<S: Into<Segment>> FromIterator<S> for Path {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::from_segments(iter)
    }
}

/// Build a [`Path`] from a list of keys and indices.
///
/// ```
/// use strata_json_patch::{path, Segment};
///
/// let p = path!("instance", "svc1", "status");
/// assert_eq!(p.len(), 3);
/// let q = path!("labels", 0usize);
/// assert_eq!(q.segments()[1], Segment::Index(0));
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {
        $crate::Path::from_segments(::std::vec![$($crate::Segment::from($seg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_slash_separators() {
        assert_eq!(Path::root().to_string(), "/");
        assert_eq!(path!("instance", "ns/svc/a", 2usize).to_string(), "/instance/ns/svc/a/2");
    }

    #[test]
    fn segments_serialize_as_strings_and_integers() {
        let p = path!("labels", 3usize);
        let encoded = serde_json::to_string(&p).unwrap();
        assert_eq!(encoded, r#"["labels",3]"#);

        let decoded: Path = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn numeric_looking_keys_stay_keys() {
        let decoded: Path = serde_json::from_str(r#"["gen","12"]"#).unwrap();
        assert_eq!(decoded.segments()[1], Segment::Key("12".to_string()));
    }

    #[test]
    fn split_last_returns_parent_and_leaf() {
        let p = path!("a", "b", "c");
        let (parent, last) = p.split_last().unwrap();
        assert_eq!(parent.len(), 2);
        assert_eq!(last, &Segment::from("c"));
        assert!(Path::root().split_last().is_none());
    }

    #[test]
    fn starts_with_matches_prefixes() {
        let p = path!("instance", "svc", "status");
        assert!(p.starts_with(&path!("instance")));
        assert!(p.starts_with(&p));
        assert!(!p.starts_with(&path!("status")));
    }
}
