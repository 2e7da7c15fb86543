//! # The observed model
//!
//! [`Model`] owns the node [`Tree`], the registered policies and caches, the
//! listeners and the tree-wide [`SyncContext`]. It is the only way to read or
//! write the tree *as observed*:
//!
//! - Accessors on external references call the policy's access hooks first,
//!   so a dirty reference is synchronized before it is read or written
//!   (static attributes excepted).
//! - Mutations notify [`NodeListener`]s: attribute, value and dirty-flag
//!   events go to listeners on the node, child events to listeners on the
//!   parent.
//! - Writes to a structurally locked node fail with [`Error::Locked`].
//!
//! Caching policies and diff application use the crate-internal helpers
//! (`attach`, `discard`, `put_attribute`, ...) which notify but skip hooks
//! and lock checks.
//!
//! Everything runs on one thread. Changes produced elsewhere go through a
//! [`crate::dispatch::Dispatcher`].

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::cache::{Cache, CacheId, CacheStats};
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::policy::{sync_failure, CachingPolicy};
use crate::tree::{NodeId, PolicyId, Tree};

/// Tree-wide sync suppression.
///
/// While suppressed, every sync request anywhere in the tree is a no-op.
/// Acquire it with [`Model::with_sync_suppressed`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncContext {
    suppressed: bool,
}

impl SyncContext {
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }
}

/// A change to the observed tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    ChildAdded {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    ChildRemoved {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    AttributeChanged {
        node: NodeId,
        name: String,
        old: Option<String>,
        new: Option<String>,
    },
    ValueChanged {
        node: NodeId,
        old: Option<String>,
        new: Option<String>,
    },
    DirtyChanged {
        node: NodeId,
        dirty: bool,
    },
}

/// Receives [`NodeEvent`]s. Listeners may read and mutate the model.
pub trait NodeListener {
    fn notify(&self, model: &mut Model, event: &NodeEvent);
}

impl<F> NodeListener for F
where
    F: Fn(&mut Model, &NodeEvent),
{
    fn notify(&self, model: &mut Model, event: &NodeEvent) {
        self(model, event)
    }
}

/// The lazily-synchronized tree
#[derive(Default)]
pub struct Model {
    tree: Tree,
    policies: Vec<Rc<CachingPolicy>>,
    caches: Vec<Box<dyn Cache>>,
    listeners: HashMap<NodeId, Vec<Rc<dyn NodeListener>>>,
    sync: SyncContext,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("nodes", &self.tree.len())
            .field("policies", &self.policies)
            .field("caches", &self.caches)
            .field("observed", &self.listeners.len())
            .field("sync", &self.sync)
            .finish()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw tree: no hooks, no notifications
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn sync_context(&self) -> SyncContext {
        self.sync
    }

    /// Run `f` with every sync in the tree suppressed, restoring the prior
    /// state afterwards
    pub fn with_sync_suppressed<R>(&mut self, f: impl FnOnce(&mut Model) -> R) -> R {
        let previous = std::mem::replace(&mut self.sync.suppressed, true);
        let result = f(self);
        self.sync.suppressed = previous;
        result
    }

    // Registries

    pub fn register_cache(&mut self, cache: Box<dyn Cache>) -> CacheId {
        self.caches.push(cache);
        CacheId(self.caches.len() - 1)
    }

    pub fn cache(&self, id: CacheId) -> Option<&dyn Cache> {
        self.caches.get(id.0).map(|c| c.as_ref())
    }

    /// Size and capacity of every registered cache
    pub fn cache_stats(&self) -> Vec<CacheStats> {
        self.caches
            .iter()
            .enumerate()
            .map(|(index, cache)| CacheStats {
                id: CacheId(index),
                size: cache.size(),
                capacity: cache.capacity(),
            })
            .collect()
    }

    /// Id the next registered policy will get, for policies whose stages
    /// refer to themselves
    pub fn next_policy_id(&self) -> PolicyId {
        PolicyId(self.policies.len())
    }

    pub fn register_policy(&mut self, mut policy: CachingPolicy) -> PolicyId {
        let id = self.next_policy_id();
        policy.set_id(id);
        debug!("registered policy '{}' as {}", policy.name(), id);
        self.policies.push(Rc::new(policy));
        id
    }

    pub fn policy(&self, id: PolicyId) -> Result<Rc<CachingPolicy>> {
        self.policies
            .get(id.0)
            .cloned()
            .ok_or_else(|| Error::UnknownPolicy { name: id.to_string() })
    }

    pub fn policy_by_name(&self, name: &str) -> Option<PolicyId> {
        self.policies.iter().find(|p| p.name() == name).map(|p| p.id())
    }

    pub fn policies(&self) -> impl Iterator<Item = &Rc<CachingPolicy>> {
        self.policies.iter()
    }

    /// Policy of `reference`; `NoPolicy` for plain nodes and references
    /// without one
    fn require_policy(&self, reference: NodeId) -> Result<Rc<CachingPolicy>> {
        match self.tree.policy(reference)? {
            Some(id) => self.policy(id),
            None => Err(Error::NoPolicy {
                node: self.tree.path(reference),
            }),
        }
    }

    /// Policy of the node itself or of its nearest reference ancestor
    fn governing_policy(&self, node: NodeId) -> Result<Rc<CachingPolicy>> {
        if self.tree.is_reference(node) {
            return self.require_policy(node);
        }
        match self.tree.nearest_reference_ancestor(node) {
            Some(reference) => self.require_policy(reference),
            None => Err(Error::NoPolicy {
                node: self.tree.path(node),
            }),
        }
    }

    /// Policy whose hooks guard `node`, if any
    fn hook_policy(&self, node: NodeId) -> Result<Option<Rc<CachingPolicy>>> {
        let Some(external) = self.tree.external(node)? else {
            return Ok(None);
        };
        match external.policy {
            Some(id) => Ok(Some(self.policy(id)?)),
            None if external.dirty => Err(Error::NoPolicy {
                node: self.tree.path(node),
            }),
            None => Ok(None),
        }
    }

    // Listeners

    pub fn add_listener(&mut self, node: NodeId, listener: Rc<dyn NodeListener>) -> Result<()> {
        self.tree.get(node)?;
        let registered = self.listeners.entry(node).or_default();
        registered.push(listener);
        let count = registered.len();
        self.tree.set_observers(node, count)
    }

    /// Unregister one listener, returning whether it was registered
    pub fn remove_listener(&mut self, node: NodeId, listener: &Rc<dyn NodeListener>) -> Result<bool> {
        let Some(registered) = self.listeners.get_mut(&node) else {
            return Ok(false);
        };
        let before = registered.len();
        registered.retain(|l| !Rc::ptr_eq(l, listener));
        let count = registered.len();
        if count == 0 {
            self.listeners.remove(&node);
        }
        self.tree.set_observers(node, count)?;
        Ok(count < before)
    }

    /// True when the node or one of its descendants has listeners
    pub fn is_observed(&self, node: NodeId) -> bool {
        self.tree.is_observed(node)
    }

    fn emit(&mut self, target: NodeId, event: NodeEvent) {
        let Some(listeners) = self.listeners.get(&target).cloned() else {
            return;
        };
        trace!("{:?} -> {} listener(s)", event, listeners.len());
        for listener in listeners {
            listener.notify(self, &event);
        }
    }

    // Creation

    /// Create a detached plain node
    pub fn create_node(&mut self, name: &str) -> NodeId {
        self.tree.create(name)
    }

    /// Create a detached, dirty external reference
    pub fn create_reference(&mut self, name: &str, policy: Option<PolicyId>) -> Result<NodeId> {
        if let Some(id) = policy {
            self.policy(id)?;
        }
        Ok(self.tree.create_reference(name, policy, true))
    }

    /// Build a detached plain subtree from a fragment
    pub fn instantiate(&mut self, fragment: &Fragment) -> Result<NodeId> {
        fragment.instantiate(&mut self.tree)
    }

    /// Destroy a node and its subtree, detaching it (with notification)
    /// first if it is attached
    pub fn destroy(&mut self, node: NodeId) -> Result<()> {
        self.discard(node, true)
    }

    // Observed access

    pub fn name(&self, node: NodeId) -> Result<String> {
        Ok(self.tree.name(node)?.to_string())
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.tree.parent(node)
    }

    pub fn is_dirty(&self, node: NodeId) -> Result<bool> {
        self.tree.is_dirty(node)
    }

    pub fn is_reference(&self, node: NodeId) -> bool {
        self.tree.is_reference(node)
    }

    pub fn attribute(&mut self, node: NodeId, name: &str) -> Result<Option<String>> {
        self.read_attribute_access(node, Some(name))?;
        Ok(self.tree.attribute(node, name)?.map(str::to_string))
    }

    /// Names of all attributes. Counts as a read of every attribute.
    pub fn attribute_names(&mut self, node: NodeId) -> Result<Vec<String>> {
        self.read_attribute_access(node, None)?;
        Ok(self.tree.attributes(node)?.keys().cloned().collect())
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<Option<String>> {
        self.write_attribute_access(node, Some(name))?;
        self.check_unlocked(node)?;
        self.put_attribute(node, name, value)
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<Option<String>> {
        self.write_attribute_access(node, Some(name))?;
        self.check_unlocked(node)?;
        self.drop_attribute(node, name)
    }

    /// Node value. Guarded like a read of all attributes.
    pub fn value(&mut self, node: NodeId) -> Result<Option<String>> {
        self.read_attribute_access(node, None)?;
        Ok(self.tree.value(node)?.map(str::to_string))
    }

    pub fn set_value(&mut self, node: NodeId, value: Option<&str>) -> Result<Option<String>> {
        self.write_attribute_access(node, None)?;
        self.check_unlocked(node)?;
        self.put_value(node, value.map(str::to_string))
    }

    pub fn children(&mut self, node: NodeId) -> Result<Vec<NodeId>> {
        self.read_children_access(node)?;
        Ok(self.tree.children(node)?.to_vec())
    }

    /// First child called `name`
    pub fn child(&mut self, node: NodeId, name: &str) -> Result<Option<NodeId>> {
        self.read_children_access(node)?;
        for child in self.tree.children(node)? {
            if self.tree.name(*child)? == name {
                return Ok(Some(*child));
            }
        }
        Ok(None)
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<usize> {
        self.insert_child(parent, child, None)
    }

    pub fn insert_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<usize> {
        self.write_children_access(parent)?;
        self.check_unlocked(parent)?;
        self.attach(parent, child, index)
    }

    /// Detach and destroy `child`
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.write_children_access(parent)?;
        self.check_unlocked(parent)?;
        if self.tree.parent(child)? != Some(parent) {
            return Err(Error::UnknownNode {
                id: format!("{} (not a child of {})", child, self.tree.path(parent)),
            });
        }
        self.discard(child, true)
    }

    // Structural lock

    pub fn lock(&mut self, node: NodeId) -> Result<()> {
        self.tree.set_locked(node, true)?;
        Ok(())
    }

    pub fn unlock(&mut self, node: NodeId) -> Result<()> {
        self.tree.set_locked(node, false)?;
        Ok(())
    }

    pub fn is_locked(&self, node: NodeId) -> Result<bool> {
        self.tree.is_locked(node)
    }

    fn check_unlocked(&self, node: NodeId) -> Result<()> {
        if self.tree.is_locked(node)? {
            return Err(Error::Locked {
                node: self.tree.path(node),
            });
        }
        Ok(())
    }

    // Access notifications

    fn read_attribute_access(&mut self, node: NodeId, name: Option<&str>) -> Result<()> {
        match self.hook_policy(node)? {
            Some(policy) => policy.read_attribute_access(self, node, name),
            None => Ok(()),
        }
    }

    fn write_attribute_access(&mut self, node: NodeId, name: Option<&str>) -> Result<()> {
        match self.hook_policy(node)? {
            Some(policy) => policy.write_attribute_access(self, node, name),
            None => Ok(()),
        }
    }

    fn read_children_access(&mut self, node: NodeId) -> Result<()> {
        match self.hook_policy(node)? {
            Some(policy) => policy.read_children_access(self, node),
            None => Ok(()),
        }
    }

    fn write_children_access(&mut self, node: NodeId) -> Result<()> {
        match self.hook_policy(node)? {
            Some(policy) => policy.write_children_access(self, node),
            None => Ok(()),
        }
    }

    // Reference lifecycle

    /// Synchronize `reference` now, whether or not it is dirty
    pub fn sync(&mut self, reference: NodeId) -> Result<()> {
        let policy = self.require_policy(reference)?;
        policy.run_sync(self, reference)
    }

    /// Persist pending local changes of `reference`
    pub fn flush(&mut self, reference: NodeId) -> Result<()> {
        let policy = self.require_policy(reference)?;
        policy.source().flush(&self.tree, reference)
    }

    /// Commit `reference` back to its store
    pub fn checkin(&mut self, reference: NodeId) -> Result<()> {
        let policy = self.require_policy(reference)?;
        policy.source().checkin(&self.tree, reference)
    }

    /// Populate `reference` if needed and take it out for editing
    pub fn checkout(&mut self, reference: NodeId) -> Result<()> {
        let policy = self.require_policy(reference)?;
        if self.tree.is_dirty(reference)? {
            policy.run_sync(self, reference)?;
        }
        policy.source().checkout(&self.tree, reference)
    }

    /// Drop the content of a populated reference and mark it dirty.
    ///
    /// No-op on plain nodes and dirty references. Non-static attributes and
    /// all children go, and the reference leaves its cache, which may make a
    /// pinned ancestor evictable again. If anything in the subtree was
    /// observed, the reference is synchronized again before returning.
    pub fn clear_cache(&mut self, reference: NodeId) -> Result<()> {
        let Some(external) = self.tree.external(reference)? else {
            return Ok(());
        };
        if external.dirty {
            return Ok(());
        }
        let observed = self.is_observed(reference);
        let policy = match external.policy {
            Some(id) => Some(self.policy(id)?),
            None => None,
        };
        debug!("clearing {}", self.tree.path(reference));

        let mut held_residents = false;
        for child in self.tree.children(reference)?.to_vec().into_iter().rev() {
            held_residents |= self.discard_subtree(child)?;
        }
        if let Some(policy) = &policy {
            let names: Vec<String> = self
                .tree
                .attributes(reference)?
                .keys()
                .filter(|name| !policy.is_static_attribute(Some(name.as_str())))
                .cloned()
                .collect();
            for name in names {
                self.drop_attribute(reference, &name)?;
            }
            if !policy.is_static_attribute(None) {
                self.put_value(reference, None)?;
            }
        }
        self.mark_dirty(reference, true)?;
        if let Some(cache) = policy.as_ref().and_then(|p| p.cache()) {
            self.forget_in(cache, reference);
        }
        // A reference pinned by its own descendants was never in its cache,
        // so the ancestor it pinned in turn is released here.
        if held_residents {
            if let Some(parent) = self.tree.parent(reference)? {
                self.release_from(parent);
            }
        }

        if observed {
            if let Some(policy) = policy {
                debug!("{} is observed; syncing again", self.tree.path(reference));
                policy.internal_sync(self, reference)?;
            }
        }
        Ok(())
    }

    /// Attach a policy to `reference`.
    ///
    /// A previously attached policy is detached first: the reference is
    /// cleared (a failure is only logged) and removed from the old cache.
    pub fn set_policy(&mut self, reference: NodeId, policy: PolicyId) -> Result<()> {
        self.policy(policy)?;
        if let Some(old) = self.tree.policy(reference)? {
            if let Err(e) = self.clear_cache(reference) {
                warn!(
                    "Failed to clear {} before switching policies: {}",
                    self.tree.path(reference),
                    e
                );
            }
            if let Some(cache) = self.policy(old)?.cache() {
                self.forget_in(cache, reference);
            }
        }
        self.tree.set_policy(reference, Some(policy))?;
        debug!("{} now uses {}", self.tree.path(reference), policy);
        Ok(())
    }

    // Reconciliation

    /// Insert detached `content` under `parent`. `content` is consumed.
    ///
    /// Returns the inserted node; `None` when the insert was dropped because
    /// `parent` is not populated.
    pub fn insert(
        &mut self,
        parent: NodeId,
        content: NodeId,
        index: Option<usize>,
        dirty: bool,
    ) -> Result<Option<NodeId>> {
        let policy = match self.governing_policy(parent) {
            Ok(policy) => policy,
            Err(e) => {
                self.dispose(content);
                return Err(e);
            }
        };
        let source = Rc::clone(policy.source());
        let result = source.insert(self, &policy, parent, content, index, dirty);
        self.dispose(content);
        result.map_err(|e| sync_failure(&self.tree, parent, e))
    }

    /// Reconcile `reference` with detached `content`. `content` is consumed.
    pub fn update(&mut self, reference: NodeId, content: NodeId) -> Result<()> {
        let policy = match self.require_policy(reference) {
            Ok(policy) => policy,
            Err(e) => {
                self.dispose(content);
                return Err(e);
            }
        };
        let source = Rc::clone(policy.source());
        let result = source.update(self, &policy, reference, content);
        self.dispose(content);
        result.map_err(|e| sync_failure(&self.tree, reference, e))
    }

    /// Remove the child of `parent` that best matches detached `content`.
    /// `content` is consumed. Returns whether anything was removed.
    pub fn remove(&mut self, parent: NodeId, content: NodeId) -> Result<bool> {
        let policy = match self.governing_policy(parent) {
            Ok(policy) => policy,
            Err(e) => {
                self.dispose(content);
                return Err(e);
            }
        };
        let source = Rc::clone(policy.source());
        let result = source.remove(self, &policy, parent, content);
        self.dispose(content);
        result.map_err(|e| sync_failure(&self.tree, parent, e))
    }

    pub fn insert_from_text(
        &mut self,
        parent: NodeId,
        text: &str,
        index: Option<usize>,
        dirty: bool,
    ) -> Result<Option<NodeId>> {
        let content = self.instantiate(&Fragment::parse(text)?)?;
        self.insert(parent, content, index, dirty)
    }

    pub fn update_from_text(&mut self, reference: NodeId, text: &str) -> Result<()> {
        let content = self.instantiate(&Fragment::parse(text)?)?;
        self.update(reference, content)
    }

    pub fn remove_from_text(&mut self, parent: NodeId, text: &str) -> Result<bool> {
        let content = self.instantiate(&Fragment::parse(text)?)?;
        self.remove(parent, content)
    }

    /// Destroy leftover detached content
    fn dispose(&mut self, content: NodeId) {
        if self.tree.contains(content) && matches!(self.tree.parent(content), Ok(None)) {
            let _ = self.tree.destroy(content);
        }
    }

    // Rendering

    /// Capture a subtree without syncing anything. Dirty references carry
    /// the `cache:dirty` bookkeeping attribute.
    pub fn snapshot(&self, node: NodeId) -> Result<Fragment> {
        Fragment::capture(&self.tree, node)
    }

    /// YAML rendering of [`Model::snapshot`]
    pub fn dump(&self, node: NodeId) -> Result<String> {
        self.snapshot(node)?.to_yaml()
    }

    // Notifying helpers: no hooks, no lock checks

    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Result<usize> {
        let previous = match self.tree.parent(child)? {
            Some(old) => self.tree.index_of(child)?.map(|i| (old, i)),
            None => None,
        };
        let index = self.tree.insert_child(parent, child, index)?;
        if let Some((old, old_index)) = previous {
            self.emit(
                old,
                NodeEvent::ChildRemoved {
                    parent: old,
                    child,
                    index: old_index,
                },
            );
        }
        self.emit(parent, NodeEvent::ChildAdded { parent, child, index });
        Ok(index)
    }

    /// Detach (with notification) and destroy a subtree.
    ///
    /// With `release`, the nearest reference ancestor becomes evictable
    /// again if the subtree held the last resident reference below it.
    pub(crate) fn discard(&mut self, child: NodeId, release: bool) -> Result<()> {
        let detached = self.tree.parent(child)?;
        let held_residents = self.discard_subtree(child)?;
        if let (true, Some(parent)) = (release && held_residents, detached) {
            self.release_from(parent);
        }
        Ok(())
    }

    /// Detach and destroy without releasing anything. Returns whether the
    /// subtree held a cache-resident reference.
    fn discard_subtree(&mut self, child: NodeId) -> Result<bool> {
        if let Some((parent, index)) = self.tree.detach(child)? {
            self.emit(parent, NodeEvent::ChildRemoved { parent, child, index });
        }
        if !self.tree.contains(child) {
            return Ok(false);
        }
        let held_residents = self.purge(child)?;
        self.tree.destroy(child)?;
        Ok(held_residents)
    }

    /// Forget every reference and listener in a subtree about to be
    /// destroyed. Returns whether any reference was cache-resident.
    fn purge(&mut self, root: NodeId) -> Result<bool> {
        let mut held_residents = false;
        for node in self.tree.descendants(root)? {
            self.listeners.remove(&node);
            let Some(policy) = self.tree.policy(node)? else {
                continue;
            };
            if let Some(cache) = self.policy(policy)?.cache() {
                if let Some(cache) = self.caches.get_mut(cache.0) {
                    held_residents |= cache.contains(node);
                    cache.forget(node);
                }
            }
        }
        Ok(held_residents)
    }

    fn release_from(&mut self, node: NodeId) {
        let target = if self.tree.is_reference(node) {
            Some(node)
        } else {
            self.tree.nearest_reference_ancestor(node)
        };
        let Some(target) = target else {
            return;
        };
        let Ok(Some(policy)) = self.tree.policy(target) else {
            return;
        };
        let Some(cache) = self.policy(policy).ok().and_then(|p| p.cache()) else {
            return;
        };
        let victims = match self.caches.get_mut(cache.0) {
            Some(c) => c.memory_unlock(&self.tree, target),
            None => return,
        };
        self.evict(victims);
    }

    pub(crate) fn put_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<Option<String>> {
        let old = self.tree.set_attribute(node, name, value)?;
        if old.as_deref() != Some(value) {
            self.emit(
                node,
                NodeEvent::AttributeChanged {
                    node,
                    name: name.to_string(),
                    old: old.clone(),
                    new: Some(value.to_string()),
                },
            );
        }
        Ok(old)
    }

    pub(crate) fn drop_attribute(&mut self, node: NodeId, name: &str) -> Result<Option<String>> {
        let old = self.tree.remove_attribute(node, name)?;
        if old.is_some() {
            self.emit(
                node,
                NodeEvent::AttributeChanged {
                    node,
                    name: name.to_string(),
                    old: old.clone(),
                    new: None,
                },
            );
        }
        Ok(old)
    }

    pub(crate) fn put_value(&mut self, node: NodeId, value: Option<String>) -> Result<Option<String>> {
        let old = self.tree.set_value(node, value.clone())?;
        if old != value {
            self.emit(node, NodeEvent::ValueChanged { node, old: old.clone(), new: value });
        }
        Ok(old)
    }

    pub(crate) fn mark_dirty(&mut self, node: NodeId, dirty: bool) -> Result<()> {
        let previous = self.tree.set_dirty(node, dirty)?;
        if previous != dirty && self.tree.is_reference(node) {
            self.emit(node, NodeEvent::DirtyChanged { node, dirty });
        }
        Ok(())
    }

    // Cache bookkeeping

    /// Admit a populated reference and clear whatever that evicts
    pub(crate) fn admit(&mut self, cache: Option<CacheId>, reference: NodeId) {
        let Some(cache) = cache else {
            return;
        };
        let victims = match self.caches.get_mut(cache.0) {
            Some(c) => c.add(&self.tree, reference),
            None => return,
        };
        self.evict(victims);
    }

    pub(crate) fn touch(&mut self, cache: Option<CacheId>, reference: NodeId) {
        if let Some(c) = cache.and_then(|id| self.caches.get_mut(id.0)) {
            c.touch(reference);
        }
    }

    fn forget_in(&mut self, cache: CacheId, reference: NodeId) {
        let victims = match self.caches.get_mut(cache.0) {
            Some(c) => c.remove(&self.tree, reference),
            None => return,
        };
        self.evict(victims);
    }

    /// Clear eviction victims. Eviction never fails: a failure to clear is
    /// logged and the victim stays as it is.
    fn evict(&mut self, victims: Vec<NodeId>) {
        for victim in victims {
            if !self.tree.contains(victim) {
                continue;
            }
            debug!("evicting {}", self.tree.path(victim));
            if let Err(e) = self.clear_cache(victim) {
                warn!("Failed to evict {}: {}", self.tree.path(victim), e);
            }
        }
    }
}
