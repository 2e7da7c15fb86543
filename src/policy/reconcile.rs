//! Skeletons and incremental reconciliation
//!
//! The [`Reconciler`] holds the parts of a policy that merge content into an
//! already populated reference: the optional skeleton, the diff-based
//! `update`, and the best-match `remove`.

use log::debug;

use crate::diff::entity::EntityDiffer;
use crate::diff::IDENTITY_ATTRIBUTE;
use crate::error::Result;
use crate::fragment::Fragment;
use crate::model::Model;
use crate::policy::CachingPolicy;
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    skeleton: Option<Fragment>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skeleton(skeleton: Fragment) -> Self {
        Self {
            skeleton: Some(skeleton),
        }
    }

    pub fn skeleton(&self) -> Option<&Fragment> {
        self.skeleton.as_ref()
    }

    /// Graft the skeleton onto a populated reference that has no children.
    ///
    /// The skeleton root stands for the reference: its attributes fill in
    /// missing ones, its children are appended.
    ///
    /// A skeleton only ever decorates populated content. The one caller is
    /// `CachingPolicy::sync`, reached through `run_sync` after the dirty
    /// flag has been cleared, so a dirty reference here is a bug in the
    /// crate rather than bad input.
    pub fn apply_skeleton(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        let Some(skeleton) = &self.skeleton else {
            return Ok(());
        };
        debug_assert!(
            !model.tree().is_dirty(reference)?,
            "skeleton applied to dirty reference {}",
            model.tree().path(reference)
        );
        if !model.tree().children(reference)?.is_empty() {
            return Ok(());
        }
        debug!("applying skeleton to {}", model.tree().path(reference));
        for (name, value) in &skeleton.attributes {
            if model.tree().attribute(reference, name)?.is_none() {
                model.put_attribute(reference, name, value)?;
            }
        }
        for child in &skeleton.children {
            let node = child.instantiate(model.tree_mut())?;
            model.attach(reference, node, None)?;
        }
        Ok(())
    }

    /// Shape detached incoming content the way a sync would: static
    /// subtrees appended, then the skeleton if it is still empty.
    pub fn prepare(&self, tree: &mut Tree, policy: &CachingPolicy, content: NodeId) -> Result<()> {
        policy.composer().apply_static_subtrees(tree, content)?;
        if let Some(skeleton) = &self.skeleton {
            if tree.children(content)?.is_empty() {
                for child in &skeleton.children {
                    let node = child.instantiate(tree)?;
                    tree.insert_child(content, node, None)?;
                }
            }
        }
        Ok(())
    }

    /// Merge detached `content` into the populated `reference` with the
    /// entity differ, syncs suppressed tree-wide.
    pub fn reconcile(&self, model: &mut Model, policy: &CachingPolicy, reference: NodeId, content: NodeId) -> Result<()> {
        self.prepare(model.tree_mut(), policy, content)?;
        model.with_sync_suppressed(|m| EntityDiffer::new(policy).reconcile(m, reference, content))
    }

    /// Diff-based update. Dropped when the reference is still dirty: there
    /// is no local state to reconcile against yet.
    pub fn update(&self, model: &mut Model, policy: &CachingPolicy, reference: NodeId, content: NodeId) -> Result<()> {
        if model.tree().is_dirty(reference)? {
            debug!("dropping update of unpopulated {}", model.tree().path(reference));
            return Ok(());
        }
        self.reconcile(model, policy, reference, content)
    }

    /// Detach and destroy the child of `parent` that best matches `content`.
    ///
    /// Candidates share the content's name (and `id`, when it has one); the
    /// one agreeing on the most attributes wins, the first on ties. Returns
    /// whether anything was removed.
    pub fn remove(&self, model: &mut Model, parent: NodeId, content: NodeId) -> Result<bool> {
        if model.tree().is_dirty(parent)? {
            debug!("dropping remove under unpopulated {}", model.tree().path(parent));
            return Ok(false);
        }
        let Some(target) = best_match(model.tree(), parent, content)? else {
            debug!("no match for removal under {}", model.tree().path(parent));
            return Ok(false);
        };
        model.discard(target, true)?;
        Ok(true)
    }
}

fn best_match(tree: &Tree, parent: NodeId, content: NodeId) -> Result<Option<NodeId>> {
    let wanted = tree.get(content)?;
    let identity = wanted.attributes().get(IDENTITY_ATTRIBUTE);
    let mut best: Option<(usize, NodeId)> = None;
    for child in tree.children(parent)? {
        let candidate = tree.get(*child)?;
        if candidate.name() != wanted.name() {
            continue;
        }
        if identity.is_some() && candidate.attributes().get(IDENTITY_ATTRIBUTE) != identity {
            continue;
        }
        let score = wanted
            .attributes()
            .iter()
            .filter(|(name, value)| candidate.attributes().get(*name) == Some(*value))
            .count();
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, *child));
        }
    }
    Ok(best.map(|(_, node)| node))
}
