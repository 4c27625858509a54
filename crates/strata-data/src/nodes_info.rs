//! Nodes-info cache file.
//!
//! Written at commit whenever labels or paths changed, so that clients can
//! still resolve node selectors while the daemon API is down.

use crate::error::NodesInfoError;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use strata_core::NodesInfo;
use tempfile::NamedTempFile;

/// Location of the nodes-info cache file
#[derive(Debug, Clone)]
pub struct NodesInfoFile {
    path: PathBuf,
}

impl NodesInfoFile {
    /// File name used under the daemon var directory
    pub const FILE_NAME: &'static str = "nodes_info.json";

    /// Cache file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache file under a var directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(Self::FILE_NAME))
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file atomically: write a sibling temp file, then rename
    pub fn write(&self, info: &NodesInfo) -> Result<(), NodesInfoError> {
        let io_err = |source| NodesInfoError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, info).map_err(|source| NodesInfoError::Format {
                path: self.path.clone(),
                source,
            })?;
            writer.flush().map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        tracing::debug!(path = %self.path.display(), nodes = info.len(), "nodes info written");
        Ok(())
    }

    /// Read the file
    pub fn load(&self) -> Result<NodesInfo, NodesInfoError> {
        let bytes = fs::read(&self.path).map_err(|source| NodesInfoError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| NodesInfoError::Format {
            path: self.path.clone(),
            source,
        })
    }
}
