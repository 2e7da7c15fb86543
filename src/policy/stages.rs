//! Secondary stages
//!
//! A policy composes nested external content in two ways. *Dynamic* stages
//! pair a selector with a policy: every node the selector matches in freshly
//! synchronized content is replaced, at the same position, by an external
//! reference wired to that policy. *Static* subtrees are grafted onto every
//! synchronized reference unconditionally, after dynamic substitution.
//!
//! Stage composition only ever runs on detached content, so it uses raw tree
//! operations and nobody observes a half-transformed subtree.

use log::trace;

use crate::error::Result;
use crate::fragment::Fragment;
use crate::model::Model;
use crate::selector::Selector;
use crate::tree::{NodeId, PolicyId, Tree};

/// A dynamic secondary stage
#[derive(Debug, Clone)]
pub struct StageEntry {
    /// Which nodes of the synced content become references
    pub selector: Selector,
    /// Policy wired to the new references
    pub policy: PolicyId,
    /// Whether the new references start unpopulated
    pub dirty: bool,
}

impl StageEntry {
    pub fn new(selector: Selector, policy: PolicyId, dirty: bool) -> Self {
        Self {
            selector,
            policy,
            dirty,
        }
    }
}

/// A subtree grafted onto every synchronized reference
#[derive(Debug, Clone)]
pub struct StaticSubtree {
    pub content: Fragment,
    /// When set, the graft is an unpopulated reference for this policy
    /// carrying only the fragment's attributes.
    pub policy: Option<PolicyId>,
}

impl StaticSubtree {
    pub fn new(content: Fragment) -> Self {
        Self {
            content,
            policy: None,
        }
    }

    pub fn with_policy(content: Fragment, policy: PolicyId) -> Self {
        Self {
            content,
            policy: Some(policy),
        }
    }

    /// Build a detached copy of the graft
    pub fn instantiate(&self, tree: &mut Tree) -> Result<NodeId> {
        match self.policy {
            None => self.content.instantiate(tree),
            Some(policy) => {
                let reference = tree.create_reference(&self.content.name, Some(policy), true);
                for (name, value) in &self.content.attributes {
                    tree.set_attribute(reference, name, value)?;
                }
                Ok(reference)
            }
        }
    }
}

/// Ordered dynamic stages and static subtrees of one policy
#[derive(Debug, Clone, Default)]
pub struct StageComposer {
    stages: Vec<StageEntry>,
    static_subtrees: Vec<StaticSubtree>,
}

impl StageComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stage(&mut self, entry: StageEntry) {
        self.stages.push(entry);
    }

    pub fn push_static_subtree(&mut self, subtree: StaticSubtree) {
        self.static_subtrees.push(subtree);
    }

    pub fn stages(&self) -> &[StageEntry] {
        &self.stages
    }

    pub fn static_subtrees(&self) -> &[StaticSubtree] {
        &self.static_subtrees
    }

    /// Dynamic substitution followed by static grafting below `root`.
    ///
    /// `root` itself is never substituted.
    pub fn apply_next_stages(&self, model: &mut Model, root: NodeId) -> Result<()> {
        self.apply_dynamic_stages(model, root, false)?;
        self.apply_static_subtrees(model.tree_mut(), root)
    }

    /// Replace every selector match below `root` by an external reference
    /// for the stage's policy, at the same parent and index.
    ///
    /// With `force_dirty` every new reference starts unpopulated whatever
    /// its entry says.
    pub fn apply_dynamic_stages(&self, model: &mut Model, root: NodeId, force_dirty: bool) -> Result<()> {
        for stage in &self.stages {
            let policy = model.policy(stage.policy)?;
            let matches = stage.selector.select(model.tree(), root)?;
            for node in matches {
                // An earlier substitution may already have consumed this match.
                if node == root || !model.tree().contains(node) || !model.tree().is_ancestor(root, node)? {
                    continue;
                }
                let Some((parent, index)) = model.tree_mut().detach(node)? else {
                    continue;
                };
                trace!(
                    "stage '{}' wraps {} for policy '{}'",
                    stage.selector,
                    model.tree().path(parent),
                    policy.name()
                );
                let reference = policy.create_external_tree(model, node, stage.dirty || force_dirty, None)?;
                model.tree_mut().insert_child(parent, reference, Some(index))?;
            }
        }
        Ok(())
    }

    /// Append a fresh copy of every static subtree to `root`
    pub fn apply_static_subtrees(&self, tree: &mut Tree, root: NodeId) -> Result<()> {
        for subtree in &self.static_subtrees {
            let graft = subtree.instantiate(tree)?;
            tree.insert_child(root, graft, None)?;
        }
        Ok(())
    }
}
