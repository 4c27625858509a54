//! Patch engine errors.

use crate::path::Path;

/// Result type for patch operations
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors raised while applying operations to a document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// A container on the way to the target does not exist
    #[error("missing path {path}")]
    MissingPath {
        /// Path of the operation that failed
        path: Path,
    },

    /// An array index lies past the end of the array
    #[error("index {index} out of bounds at {path} (len {len})")]
    IndexOutOfBounds {
        /// Path of the operation that failed
        path: Path,
        /// Offending index
        index: usize,
        /// Array length at the time of the operation
        len: usize,
    },

    /// A segment kind does not match the container it addresses
    #[error("cannot address {path}: parent is not a {expected}")]
    NotAContainer {
        /// Path of the operation that failed
        path: Path,
        /// Container type the segment required
        expected: &'static str,
    },

    /// Removing the document root is not expressible
    #[error("cannot remove the document root")]
    RemoveRoot,

    /// The input bytes were not a JSON document
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Decoder message
        message: String,
    },
}
