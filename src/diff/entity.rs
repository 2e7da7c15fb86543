//! Stage-aware reconciliation
//!
//! The entity differ runs the structural diff with the stage boundaries of
//! one policy treated specially:
//!
//! - Every node matched by a stage selector (on either side, below the root)
//!   is indexed with its stage entry. Matches on the live side have their
//!   dirty flag recorded and forced to false for the duration of the diff.
//! - A pair is opaque, compared only for presence, when either node belongs
//!   to a stage declared dirty, when the live node was dirty before the diff,
//!   or when the incoming node is itself an unpopulated reference. Unresolved
//!   stages are therefore never touched.
//! - Bookkeeping attributes are never compared, and neither are the policy's
//!   static attributes on the root.
//! - An inserted node that was indexed is rebuilt as a fresh external
//!   reference for its stage's policy instead of being cloned verbatim.
//!
//! Afterwards the recorded dirty flags are restored, whatever the outcome.

use std::collections::{HashMap, HashSet};

use log::debug;

use super::{apply, diff, DiffHooks};
use crate::error::Result;
use crate::fragment::is_bookkeeping;
use crate::model::Model;
use crate::policy::CachingPolicy;
use crate::tree::{NodeId, PolicyId, Tree};

#[derive(Debug, Clone, Copy)]
struct Boundary {
    policy: PolicyId,
    dirty: bool,
}

/// Diff hooks scoped to one reconciliation
pub struct EntityDiffer<'p> {
    policy: &'p CachingPolicy,
    root: Option<NodeId>,
    boundaries: HashMap<NodeId, Boundary>,
    was_dirty: HashSet<NodeId>,
}

impl<'p> EntityDiffer<'p> {
    pub fn new(policy: &'p CachingPolicy) -> Self {
        Self {
            policy,
            root: None,
            boundaries: HashMap::new(),
            was_dirty: HashSet::new(),
        }
    }

    /// Turn the live subtree `left` into `right` with minimal changes.
    ///
    /// `right` is only read. The caller is expected to suppress syncs.
    pub fn reconcile(&mut self, model: &mut Model, left: NodeId, right: NodeId) -> Result<()> {
        let result = self.run(model, left, right);
        self.restore(model.tree_mut());
        result
    }

    fn run(&mut self, model: &mut Model, left: NodeId, right: NodeId) -> Result<()> {
        self.root = Some(left);
        self.index(model.tree_mut(), left, right)?;
        let changes = diff(model.tree(), left, right, &*self)?;
        debug!(
            "reconciling {} with {} change(s), {} stage boundary(ies)",
            model.tree().path(left),
            changes.len(),
            self.boundaries.len()
        );
        apply(model, changes, self)
    }

    fn index(&mut self, tree: &mut Tree, left: NodeId, right: NodeId) -> Result<()> {
        for stage in self.policy.composer().stages() {
            let boundary = Boundary {
                policy: stage.policy,
                dirty: stage.dirty,
            };
            for node in stage.selector.select(tree, left)? {
                if node == left {
                    continue;
                }
                if tree.set_dirty(node, false)? {
                    self.was_dirty.insert(node);
                }
                self.boundaries.insert(node, boundary);
            }
            for node in stage.selector.select(tree, right)? {
                if node != right {
                    self.boundaries.insert(node, boundary);
                }
            }
        }
        Ok(())
    }

    fn restore(&mut self, tree: &mut Tree) {
        for node in self.was_dirty.drain() {
            // Nodes removed by the diff are gone; nothing to restore.
            if tree.contains(node) {
                let _ = tree.set_dirty(node, true);
            }
        }
        self.boundaries.clear();
        self.root = None;
    }

    fn is_dirty_boundary(&self, node: NodeId) -> bool {
        self.boundaries.get(&node).is_some_and(|b| b.dirty)
    }
}

impl DiffHooks for EntityDiffer<'_> {
    fn compare_attribute(&self, _tree: &Tree, node: NodeId, name: &str) -> bool {
        if is_bookkeeping(name) {
            return false;
        }
        !(self.root == Some(node) && self.policy.is_static_attribute(Some(name)))
    }

    fn compare_contents(&self, tree: &Tree, left: NodeId, right: NodeId) -> bool {
        !(self.was_dirty.contains(&left)
            || self.is_dirty_boundary(left)
            || self.is_dirty_boundary(right)
            || tree.is_dirty(right).unwrap_or(false))
    }

    fn clone_for_insert(&mut self, model: &mut Model, source: NodeId) -> Result<NodeId> {
        if let Some(boundary) = self.boundaries.get(&source).copied() {
            let policy = model.policy(boundary.policy)?;
            let local = model.tree_mut().clone_subtree(source)?;
            return policy.create_external_tree(model, local, boundary.dirty, None);
        }
        let copy = model.tree_mut().clone_prototype(source)?;
        if model.tree().is_dirty(source)? {
            return Ok(copy);
        }
        for child in model.tree().children(source)?.to_vec() {
            let child_copy = self.clone_for_insert(model, child)?;
            model.tree_mut().insert_child(copy, child_copy, None)?;
        }
        Ok(copy)
    }
}
