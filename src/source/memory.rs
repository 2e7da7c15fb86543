//! In-memory document store

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;
use log::debug;

use super::SyncSource;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::tree::{NodeId, Tree};

/// Documents keyed by the `id` attribute of the reference (or its name when
/// it has none).
///
/// Interior mutability keeps the store usable behind the shared handle a
/// policy holds; the model is single-threaded anyway.
#[derive(Debug, Default)]
pub struct MemorySource {
    documents: RefCell<IndexMap<String, Fragment>>,
    fetches: Cell<usize>,
    flushes: Cell<usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a document
    pub fn with_document(self, key: &str, document: Fragment) -> Self {
        self.put(key, document);
        self
    }

    /// Add or replace a document
    pub fn put(&self, key: &str, document: Fragment) {
        self.documents.borrow_mut().insert(key.to_string(), document);
    }

    pub fn document(&self, key: &str) -> Option<Fragment> {
        self.documents.borrow().get(key).cloned()
    }

    pub fn remove_document(&self, key: &str) -> Option<Fragment> {
        self.documents.borrow_mut().shift_remove(key)
    }

    /// How many times content was fetched
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    /// How many times a reference was flushed
    pub fn flush_count(&self) -> usize {
        self.flushes.get()
    }

    /// Key under which `reference` is stored
    pub fn key(tree: &Tree, reference: NodeId) -> Result<String> {
        Ok(match tree.attribute(reference, "id")? {
            Some(id) => id.to_string(),
            None => tree.name(reference)?.to_string(),
        })
    }
}

impl SyncSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, tree: &mut Tree, reference: NodeId) -> Result<NodeId> {
        self.fetches.set(self.fetches.get() + 1);
        let key = Self::key(tree, reference)?;
        let document = self.document(&key).ok_or_else(|| Error::Sync {
            node: tree.path(reference),
            message: format!("no document '{}' in the memory source", key),
            cause: None,
        })?;
        debug!("memory source serves '{}'", key);
        document.instantiate(tree)
    }

    fn flush(&self, tree: &Tree, reference: NodeId) -> Result<()> {
        if tree.is_dirty(reference)? {
            return Ok(());
        }
        let key = Self::key(tree, reference)?;
        let captured = Fragment::capture(tree, reference)?.without_bookkeeping();
        self.flushes.set(self.flushes.get() + 1);
        debug!("memory source stores '{}'", key);
        self.put(&key, captured);
        Ok(())
    }
}
