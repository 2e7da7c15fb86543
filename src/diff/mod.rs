//! Structural tree diff
//!
//! [`diff`] compares a live subtree (left) with new content (right) and
//! produces an ordered change set; [`apply`] performs it against the model so
//! every change is notified. Nodes correspond when they share a name and an
//! `id` attribute, and child lists are aligned with a longest common
//! subsequence so untouched nodes keep their identity.
//!
//! Changes for one parent are ordered attribute and value changes first,
//! then child removals, then insertions by ascending final index, then the
//! changes of matched children. Applied in that order every index is valid
//! at the time it is used.
//!
//! The diff knows nothing about caching. [`DiffHooks`] lets a caller hide
//! attributes, treat subtrees as opaque and control how inserted nodes are
//! cloned; [`entity::EntityDiffer`] uses those hooks for stage boundaries.

pub mod entity;

use crate::error::Result;
use crate::model::Model;
use crate::tree::{NodeId, Tree};

/// Attribute that identifies a node among its siblings
pub const IDENTITY_ATTRIBUTE: &str = "id";

/// One edit of the left-hand tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    SetAttribute { node: NodeId, name: String, value: String },
    RemoveAttribute { node: NodeId, name: String },
    SetValue { node: NodeId, value: Option<String> },
    /// Insert a clone of right-hand `source` under `parent`
    InsertChild { parent: NodeId, index: usize, source: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
}

/// Customization points of the diff
pub trait DiffHooks {
    /// Whether an attribute of a left-hand node takes part in the diff
    fn compare_attribute(&self, _tree: &Tree, _node: NodeId, _name: &str) -> bool {
        true
    }

    /// Whether to descend into a matched pair. When false the pair is only
    /// compared for presence; attributes, value and children are left alone.
    fn compare_contents(&self, _tree: &Tree, _left: NodeId, _right: NodeId) -> bool {
        true
    }

    /// Build the detached node inserted for right-hand `source`
    fn clone_for_insert(&mut self, model: &mut Model, source: NodeId) -> Result<NodeId> {
        model.tree_mut().clone_subtree(source)
    }
}

/// Hooks that compare everything and clone verbatim
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainDiff;

impl DiffHooks for PlainDiff {}

/// Whether two nodes stand for the same entity
pub fn corresponds(tree: &Tree, left: NodeId, right: NodeId) -> Result<bool> {
    Ok(tree.name(left)? == tree.name(right)?
        && tree.attribute(left, IDENTITY_ATTRIBUTE)? == tree.attribute(right, IDENTITY_ATTRIBUTE)?)
}

/// Compute the changes turning `left` into `right`
pub fn diff(tree: &Tree, left: NodeId, right: NodeId, hooks: &dyn DiffHooks) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    diff_node(tree, left, right, hooks, &mut changes)?;
    Ok(changes)
}

fn diff_node(
    tree: &Tree,
    left: NodeId,
    right: NodeId,
    hooks: &dyn DiffHooks,
    changes: &mut Vec<Change>,
) -> Result<()> {
    if !hooks.compare_contents(tree, left, right) {
        return Ok(());
    }
    let old = tree.get(left)?;
    let new = tree.get(right)?;

    for (name, value) in new.attributes() {
        if hooks.compare_attribute(tree, left, name) && old.attributes().get(name) != Some(value) {
            changes.push(Change::SetAttribute {
                node: left,
                name: name.clone(),
                value: value.clone(),
            });
        }
    }
    for name in old.attributes().keys() {
        if hooks.compare_attribute(tree, left, name) && !new.attributes().contains_key(name) {
            changes.push(Change::RemoveAttribute {
                node: left,
                name: name.clone(),
            });
        }
    }
    if old.value() != new.value() {
        changes.push(Change::SetValue {
            node: left,
            value: new.value().map(str::to_string),
        });
    }

    let old_children = old.children();
    let new_children = new.children();
    let pairs = align(tree, old_children, new_children)?;

    let mut matched_old = vec![false; old_children.len()];
    let mut matched_new = vec![false; new_children.len()];
    for (i, j) in &pairs {
        matched_old[*i] = true;
        matched_new[*j] = true;
    }
    for (i, child) in old_children.iter().enumerate() {
        if !matched_old[i] {
            changes.push(Change::RemoveChild {
                parent: left,
                child: *child,
            });
        }
    }
    for (j, source) in new_children.iter().enumerate() {
        if !matched_new[j] {
            changes.push(Change::InsertChild {
                parent: left,
                index: j,
                source: *source,
            });
        }
    }
    for (i, j) in pairs {
        diff_node(tree, old_children[i], new_children[j], hooks, changes)?;
    }
    Ok(())
}

/// Longest common subsequence of corresponding children, as index pairs
fn align(tree: &Tree, old: &[NodeId], new: &[NodeId]) -> Result<Vec<(usize, usize)>> {
    let (n, m) = (old.len(), new.len());
    let mut same = vec![vec![false; m]; n];
    for (i, l) in old.iter().enumerate() {
        for (j, r) in new.iter().enumerate() {
            same[i][j] = corresponds(tree, *l, *r)?;
        }
    }

    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if same[i][j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if same[i][j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    Ok(pairs)
}

/// Perform a change set against the model, notifying listeners.
///
/// Removed subtrees are destroyed; inserted nodes come from
/// [`DiffHooks::clone_for_insert`].
pub fn apply(model: &mut Model, changes: Vec<Change>, hooks: &mut dyn DiffHooks) -> Result<()> {
    for change in changes {
        match change {
            Change::SetAttribute { node, name, value } => {
                model.put_attribute(node, &name, &value)?;
            }
            Change::RemoveAttribute { node, name } => {
                model.drop_attribute(node, &name)?;
            }
            Change::SetValue { node, value } => {
                model.put_value(node, value)?;
            }
            Change::RemoveChild { child, .. } => {
                model.discard(child, true)?;
            }
            Change::InsertChild { parent, index, source } => {
                let node = hooks.clone_for_insert(model, source)?;
                model.attach(parent, node, Some(index))?;
            }
        }
    }
    Ok(())
}
