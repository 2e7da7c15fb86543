//! Directory listings

use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use super::SyncSource;
use crate::error::Result;
use crate::model::Model;
use crate::policy::CachingPolicy;
use crate::tree::{NodeId, Tree};

/// Lists one directory level per reference.
///
/// The directory comes from the reference's `path` attribute, or the
/// configured root. Entries become `dir` and `file` children carrying
/// `name`, `path` and (for files) `size`. Declaring `dir` as a dirty stage
/// with the same policy makes the whole hierarchy lazily browsable.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory(&self, tree: &Tree, reference: NodeId) -> Result<PathBuf> {
        Ok(match tree.attribute(reference, "path")? {
            Some(path) => PathBuf::from(path),
            None => self.root.clone(),
        })
    }
}

impl SyncSource for FileSystemSource {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn fetch(&self, tree: &mut Tree, reference: NodeId) -> Result<NodeId> {
        let directory = self.directory(tree, reference)?;
        debug!("listing {}", directory.display());

        // Read the whole listing before allocating, so a failure leaves no
        // orphaned nodes in the arena.
        let mut entries = Vec::new();
        for entry in WalkDir::new(&directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            let size = if entry.file_type().is_dir() {
                None
            } else {
                Some(entry.metadata().map_err(std::io::Error::from)?.len())
            };
            entries.push((entry, size));
        }

        let content = tree.create("dir");
        tree.set_attribute(content, "path", &directory.to_string_lossy())?;
        for (entry, size) in entries {
            let node = tree.create(if size.is_none() { "dir" } else { "file" });
            tree.set_attribute(node, "name", &entry.file_name().to_string_lossy())?;
            tree.set_attribute(node, "path", &entry.path().to_string_lossy())?;
            if let Some(size) = size {
                tree.set_attribute(node, "size", &size.to_string())?;
            }
            tree.insert_child(content, node, None)?;
        }
        Ok(content)
    }

    fn insert(
        &self,
        _model: &mut Model,
        _policy: &CachingPolicy,
        _parent: NodeId,
        _content: NodeId,
        _index: Option<usize>,
        _dirty: bool,
    ) -> Result<Option<NodeId>> {
        Err(self.unsupported("insert"))
    }

    fn remove(&self, _model: &mut Model, _policy: &CachingPolicy, _parent: NodeId, _content: NodeId) -> Result<bool> {
        Err(self.unsupported("remove"))
    }
}
