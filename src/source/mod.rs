//! # Backing stores
//!
//! A [`SyncSource`] is the store-specific half of a caching policy. It only
//! has to turn a reference into content (`fetch`) and, if it can, persist a
//! reference back (`flush`). Incremental `insert`/`update`/`remove` default
//! to the policy's shared reconciliation and are overridden only by stores
//! for which a structural diff is the wrong model.
//!
//! Stores provided here:
//!
//! - [`MemorySource`]: in-memory documents keyed by the reference `id`.
//! - [`FileSystemSource`]: a directory listing, one level per reference.
//! - [`EnvironmentSource`]: process environment variables, read-only.

mod environment;
mod filesystem;
mod memory;

pub use environment::EnvironmentSource;
pub use filesystem::FileSystemSource;
pub use memory::MemorySource;

use std::fmt;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::policy::CachingPolicy;
use crate::tree::{NodeId, Tree};

/// Store-specific population and persistence
pub trait SyncSource: fmt::Debug {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Build the backing content of `reference` as a detached subtree whose
    /// root stands for the reference itself.
    ///
    /// Runs with syncs suppressed and must not attach anything to the live
    /// tree; the policy applies the result afterwards. A failed fetch must
    /// not leave any node it allocated behind.
    fn fetch(&self, tree: &mut Tree, reference: NodeId) -> Result<NodeId>;

    /// Persist local changes of `reference`
    fn flush(&self, _tree: &Tree, _reference: NodeId) -> Result<()> {
        Err(self.unsupported("flush"))
    }

    /// Commit `reference` back to the store
    fn checkin(&self, tree: &Tree, reference: NodeId) -> Result<()> {
        self.flush(tree, reference)
    }

    /// Take `reference` out of the store for local editing
    fn checkout(&self, _tree: &Tree, _reference: NodeId) -> Result<()> {
        Ok(())
    }

    /// Insert detached `content` under `parent`
    fn insert(
        &self,
        model: &mut Model,
        policy: &CachingPolicy,
        parent: NodeId,
        content: NodeId,
        index: Option<usize>,
        dirty: bool,
    ) -> Result<Option<NodeId>> {
        policy.default_insert(model, parent, content, index, dirty)
    }

    /// Reconcile `reference` with detached `content`
    fn update(&self, model: &mut Model, policy: &CachingPolicy, reference: NodeId, content: NodeId) -> Result<()> {
        policy.default_update(model, reference, content)
    }

    /// Remove the child of `parent` matching detached `content`
    fn remove(&self, model: &mut Model, policy: &CachingPolicy, parent: NodeId, content: NodeId) -> Result<bool> {
        policy.default_remove(model, parent, content)
    }

    /// The error read-only stores return
    fn unsupported(&self, operation: &str) -> Error {
        Error::Unsupported {
            operation: operation.to_string(),
            target: format!("the {} source", self.name()),
        }
    }
}
