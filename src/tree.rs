//! Arena-backed node tree
//!
//! Nodes live in a generational arena and are addressed by [`NodeId`]
//! handles. Parent links are handles too, so ancestor walks never deal with
//! ownership cycles, and a destroyed node simply invalidates its handle.
//!
//! Everything here is *raw*: no access hooks run and no listeners are
//! notified. The observed, lazily-synchronized view lives in
//! [`crate::model::Model`].

use std::fmt;

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Handle to a node in a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Handle to a caching policy registered with a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyId(pub(crate) usize);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy#{}", self.0)
    }
}

/// Caching state carried by external reference nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct External {
    /// True until the first successful sync, and again after eviction
    pub dirty: bool,
    /// The policy that populates this reference
    pub policy: Option<PolicyId>,
}

/// A single tree element
#[derive(Debug, Clone)]
pub struct NodeData {
    name: String,
    value: Option<String>,
    attributes: IndexMap<String, String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    external: Option<External>,
    locked: bool,
    observers: usize,
}

impl NodeData {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
            parent: None,
            external: None,
            locked: false,
            observers: 0,
        }
    }

    /// Node name (the element type)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node value, if any
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Attributes in insertion order
    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    /// Child handles in order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent handle, `None` for roots and detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Caching state, `None` for plain nodes
    pub fn external(&self) -> Option<External> {
        self.external
    }

    /// Whether the node rejects writes through the model
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of listeners registered on this node
    pub fn observers(&self) -> usize {
        self.observers
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// Generational arena of nodes
#[derive(Debug, Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    /// True when no node is alive
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn allocate(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                data: Some(data),
            });
            NodeId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    /// Create a detached plain node
    pub fn create(&mut self, name: &str) -> NodeId {
        self.allocate(NodeData::new(name))
    }

    /// Create a detached external reference
    pub fn create_reference(&mut self, name: &str, policy: Option<PolicyId>, dirty: bool) -> NodeId {
        let mut data = NodeData::new(name);
        data.external = Some(External { dirty, policy });
        self.allocate(data)
    }

    /// Check whether a handle refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.data.is_some())
    }

    /// Borrow a node
    pub fn get(&self, id: NodeId) -> Result<&NodeData> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
            .ok_or_else(|| Error::UnknownNode { id: id.to_string() })
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
            .ok_or_else(|| Error::UnknownNode { id: id.to_string() })
    }

    /// Node name
    pub fn name(&self, id: NodeId) -> Result<&str> {
        Ok(self.get(id)?.name())
    }

    /// Node value
    pub fn value(&self, id: NodeId) -> Result<Option<&str>> {
        Ok(self.get(id)?.value())
    }

    /// Replace the node value, returning the previous one
    pub fn set_value(&mut self, id: NodeId, value: Option<String>) -> Result<Option<String>> {
        Ok(std::mem::replace(&mut self.get_mut(id)?.value, value))
    }

    /// Read one attribute
    pub fn attribute(&self, id: NodeId, name: &str) -> Result<Option<&str>> {
        Ok(self.get(id)?.attributes.get(name).map(String::as_str))
    }

    /// All attributes in insertion order
    pub fn attributes(&self, id: NodeId) -> Result<&IndexMap<String, String>> {
        Ok(self.get(id)?.attributes())
    }

    /// Set an attribute, returning the previous value
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<Option<String>> {
        Ok(self
            .get_mut(id)?
            .attributes
            .insert(name.to_string(), value.to_string()))
    }

    /// Remove an attribute, returning its value
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<Option<String>> {
        Ok(self.get_mut(id)?.attributes.shift_remove(name))
    }

    /// Child handles in order
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.get(id)?.children())
    }

    /// Parent handle
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(id)?.parent)
    }

    /// Position of a node among its siblings
    pub fn index_of(&self, id: NodeId) -> Result<Option<usize>> {
        match self.parent(id)? {
            Some(parent) => Ok(self.children(parent)?.iter().position(|c| *c == id)),
            None => Ok(None),
        }
    }

    /// Caching state of a node, `None` for plain nodes
    pub fn external(&self, id: NodeId) -> Result<Option<External>> {
        Ok(self.get(id)?.external)
    }

    /// True for external references
    pub fn is_reference(&self, id: NodeId) -> bool {
        matches!(self.get(id), Ok(data) if data.external.is_some())
    }

    /// True for external references that have not been synchronized
    pub fn is_dirty(&self, id: NodeId) -> Result<bool> {
        Ok(self.get(id)?.external.is_some_and(|e| e.dirty))
    }

    /// Set the dirty flag of an external reference, returning the previous
    /// flag. Plain nodes are left alone and report `false`.
    pub fn set_dirty(&mut self, id: NodeId, dirty: bool) -> Result<bool> {
        match self.get_mut(id)?.external.as_mut() {
            Some(external) => Ok(std::mem::replace(&mut external.dirty, dirty)),
            None => Ok(false),
        }
    }

    /// Policy of an external reference
    pub fn policy(&self, id: NodeId) -> Result<Option<PolicyId>> {
        Ok(self.get(id)?.external.and_then(|e| e.policy))
    }

    /// Attach a policy to an external reference
    pub fn set_policy(&mut self, id: NodeId, policy: Option<PolicyId>) -> Result<()> {
        let node = self.get_mut(id)?;
        match node.external.as_mut() {
            Some(external) => {
                external.policy = policy;
                Ok(())
            }
            None => Err(Error::Unsupported {
                operation: "set_policy".to_string(),
                target: format!("plain node '{}'", node.name),
            }),
        }
    }

    /// Whether the node rejects writes through the model
    pub fn is_locked(&self, id: NodeId) -> Result<bool> {
        Ok(self.get(id)?.locked)
    }

    /// Set the structural lock, returning the previous state
    pub fn set_locked(&mut self, id: NodeId, locked: bool) -> Result<bool> {
        Ok(std::mem::replace(&mut self.get_mut(id)?.locked, locked))
    }

    /// Record the number of listeners registered on a node
    pub fn set_observers(&mut self, id: NodeId, count: usize) -> Result<()> {
        self.get_mut(id)?.observers = count;
        Ok(())
    }

    /// True when the node or any of its descendants has listeners
    pub fn is_observed(&self, id: NodeId) -> bool {
        self.descendants(id)
            .unwrap_or_default()
            .iter()
            .any(|n| self.get(*n).is_ok_and(|data| data.observers > 0))
    }

    /// Insert a detached node under `parent`.
    ///
    /// `index` is clamped to the child count; `None` appends. A node that is
    /// still attached elsewhere is detached first. Returns the final index.
    pub fn insert_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<usize> {
        if parent == child || self.is_ancestor(child, parent)? {
            return Err(Error::Unsupported {
                operation: "insert_child".to_string(),
                target: format!("a node inside its own subtree ({})", child),
            });
        }
        self.detach(child)?;
        let siblings = &mut self.get_mut(parent)?.children;
        let index = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, child);
        self.get_mut(child)?.parent = Some(parent);
        Ok(index)
    }

    /// Detach a node from its parent, returning the former parent and index
    pub fn detach(&mut self, child: NodeId) -> Result<Option<(NodeId, usize)>> {
        let Some(parent) = self.get_mut(child)?.parent.take() else {
            return Ok(None);
        };
        let siblings = &mut self.get_mut(parent)?.children;
        let index = siblings.iter().position(|c| *c == child);
        if let Some(index) = index {
            siblings.remove(index);
        }
        Ok(index.map(|index| (parent, index)))
    }

    /// Detach and free a node and its whole subtree
    pub fn destroy(&mut self, id: NodeId) -> Result<()> {
        self.detach(id)?;
        for node in self.descendants(id)? {
            let slot = &mut self.slots[node.index as usize];
            slot.data = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
            self.live -= 1;
        }
        Ok(())
    }

    /// The node and all its descendants in document (pre-)order
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node)?.iter().rev());
        }
        Ok(out)
    }

    /// Ancestors from the parent upwards
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut current = self.parent(id)?;
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node)?;
        }
        Ok(out)
    }

    /// Ancestors that are themselves external references, nearest first
    pub fn reference_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        self.ancestors(id)
            .unwrap_or_default()
            .into_iter()
            .filter(|a| self.is_reference(*a))
            .collect()
    }

    /// Nearest ancestor that is an external reference
    pub fn nearest_reference_ancestor(&self, id: NodeId) -> Option<NodeId> {
        self.reference_ancestors(id).into_iter().next()
    }

    /// True when `ancestor` is a strict ancestor of `node`
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        let mut current = self.parent(node)?;
        while let Some(parent) = current {
            if parent == ancestor {
                return Ok(true);
            }
            current = self.parent(parent)?;
        }
        Ok(false)
    }

    /// Shallow "prototype" clone: name, value, attributes and caching state,
    /// no children. The clone is detached and unlocked.
    pub fn clone_prototype(&mut self, id: NodeId) -> Result<NodeId> {
        let source = self.get(id)?;
        let data = NodeData {
            name: source.name.clone(),
            value: source.value.clone(),
            attributes: source.attributes.clone(),
            children: Vec::new(),
            parent: None,
            external: source.external,
            locked: false,
            observers: 0,
        };
        Ok(self.allocate(data))
    }

    /// Deep "identical subtree" clone
    pub fn clone_subtree(&mut self, id: NodeId) -> Result<NodeId> {
        let copy = self.clone_prototype(id)?;
        for child in self.children(id)?.to_vec() {
            let child_copy = self.clone_subtree(child)?;
            self.insert_child(copy, child_copy, None)?;
        }
        Ok(copy)
    }

    /// Slash-separated names from the root down to `id`, for diagnostics
    pub fn path(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .unwrap_or_default()
            .iter()
            .rev()
            .filter_map(|a| self.name(*a).ok())
            .collect();
        match self.name(id) {
            Ok(name) => names.push(name),
            Err(_) => return id.to_string(),
        }
        names.join("/")
    }
}
