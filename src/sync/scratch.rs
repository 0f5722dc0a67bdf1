//! Transient local storage for sync runs
//!
//! Every run and every entity workflow gets its own uniquely named directory
//! under the scratch root, so bare artifact names like `<key>.json` never
//! collide between concurrent workflows or overlapping runs. Directories are
//! removed when their [`TempDir`] guard drops.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Root under which per-run and per-entity scratch directories are created
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    /// Scratch space under `root`, or the system temp dir if unset
    pub fn new(root: Option<&str>) -> Self {
        Self {
            root: root.map(PathBuf::from).unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Scratch space under an existing directory
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh directory for one orchestration run
    pub fn run_dir(&self) -> io::Result<TempDir> {
        self.ensure()?;
        tempfile::Builder::new()
            .prefix("factbook-run-")
            .tempdir_in(&self.root)
    }

    /// Fresh directory owned by one entity workflow
    pub fn entity_dir(&self, key: &str) -> io::Result<TempDir> {
        self.ensure()?;
        tempfile::Builder::new()
            .prefix(&format!("factbook-{}-", key))
            .tempdir_in(&self.root)
    }
}
