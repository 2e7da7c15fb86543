//! # Caching policies
//!
//! A [`CachingPolicy`] is the strategy object behind every external
//! reference. It decides which accesses trigger a sync, orchestrates the
//! sync itself, composes secondary stages into freshly populated content and
//! reconciles later changes from the backing store.
//!
//! The store-specific part is a [`SyncSource`]; everything shared lives here
//! by composition:
//!
//! - [`StaticAttributes`]: which attributes never trigger a sync.
//! - [`StageComposer`]: dynamic stages and static subtrees.
//! - [`Reconciler`]: skeleton injection, diff-based update, best-match remove.
//!
//! ## Sync orchestration
//!
//! An access on a dirty reference calls [`CachingPolicy::internal_sync`]. If
//! syncs are suppressed anywhere in the tree the call does nothing.
//! Otherwise the reference is structurally unlocked, its dirty flag cleared
//! (so listeners reacting to that transition see a clean reference and do
//! not recurse), and the sync runs in two phases: the source builds
//! detached content with syncs suppressed, then that content is applied to
//! the live tree with notifications. Whether or not that worked, the
//! reference is admitted to the policy's cache and its lock restored.

mod reconcile;
mod stages;
mod static_attributes;

pub use reconcile::Reconciler;
pub use stages::{StageComposer, StageEntry, StaticSubtree};
pub use static_attributes::{AttributePattern, StaticAttributes};

use std::fmt;
use std::rc::Rc;

use log::{debug, trace};

use crate::cache::CacheId;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::model::Model;
use crate::selector::Selector;
use crate::source::SyncSource;
use crate::tree::{NodeId, PolicyId, Tree};

/// Strategy object governing one kind of external reference
pub struct CachingPolicy {
    id: PolicyId,
    name: String,
    source: Rc<dyn SyncSource>,
    cache: Option<CacheId>,
    static_attributes: StaticAttributes,
    composer: StageComposer,
    reconciler: Reconciler,
}

impl fmt::Debug for CachingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingPolicy")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source.name())
            .field("cache", &self.cache)
            .field("static_attributes", &self.static_attributes.to_string())
            .field("stages", &self.composer.stages().len())
            .finish()
    }
}

impl CachingPolicy {
    /// Create a policy without cache, stages or static attributes
    pub fn new(name: &str, source: Rc<dyn SyncSource>) -> Self {
        Self {
            id: PolicyId(usize::MAX),
            name: name.to_string(),
            source,
            cache: None,
            static_attributes: StaticAttributes::none(),
            composer: StageComposer::new(),
            reconciler: Reconciler::new(),
        }
    }

    /// Report populated references to `cache`
    pub fn with_cache(mut self, cache: CacheId) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_static_attributes(mut self, statics: StaticAttributes) -> Self {
        self.static_attributes = statics;
        self
    }

    /// Append a dynamic secondary stage
    pub fn with_stage(mut self, selector: Selector, policy: PolicyId, dirty: bool) -> Self {
        self.composer.push_stage(StageEntry::new(selector, policy, dirty));
        self
    }

    pub fn with_static_subtree(mut self, subtree: StaticSubtree) -> Self {
        self.composer.push_static_subtree(subtree);
        self
    }

    pub fn with_skeleton(mut self, skeleton: Fragment) -> Self {
        self.reconciler = Reconciler::with_skeleton(skeleton);
        self
    }

    pub(crate) fn set_id(&mut self, id: PolicyId) {
        self.id = id;
    }

    pub fn id(&self) -> PolicyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Rc<dyn SyncSource> {
        &self.source
    }

    /// Cache this policy reports to; `None` means always resident
    pub fn cache(&self) -> Option<CacheId> {
        self.cache
    }

    pub fn static_attributes(&self) -> &StaticAttributes {
        &self.static_attributes
    }

    pub fn composer(&self) -> &StageComposer {
        &self.composer
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Whether access to `name` (`None`: all attributes, or the value) is
    /// exempt from syncing
    pub fn is_static_attribute(&self, name: Option<&str>) -> bool {
        self.static_attributes.matches(name)
    }

    // Access notifications

    pub fn read_attribute_access(&self, model: &mut Model, reference: NodeId, name: Option<&str>) -> Result<()> {
        if self.is_static_attribute(name) {
            return Ok(());
        }
        trace!("read {:?} on {}", name, model.tree().path(reference));
        self.accessed(model, reference)
    }

    pub fn write_attribute_access(&self, model: &mut Model, reference: NodeId, name: Option<&str>) -> Result<()> {
        if self.is_static_attribute(name) {
            return Ok(());
        }
        trace!("write {:?} on {}", name, model.tree().path(reference));
        self.accessed(model, reference)
    }

    pub fn read_children_access(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        trace!("read children of {}", model.tree().path(reference));
        self.accessed(model, reference)
    }

    pub fn write_children_access(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        trace!("write children of {}", model.tree().path(reference));
        self.accessed(model, reference)
    }

    fn accessed(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        model.touch(self.cache, reference);
        if model.tree().is_dirty(reference)? {
            self.internal_sync(model, reference)?;
        }
        Ok(())
    }

    /// Sync unless syncs are currently suppressed anywhere in the tree
    pub fn internal_sync(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        if model.sync_context().is_suppressed() {
            trace!("sync of {} suppressed", model.tree().path(reference));
            return Ok(());
        }
        self.run_sync(model, reference)
    }

    /// Unconditional sync with the unlock/admit/relock bracket
    pub(crate) fn run_sync(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        let was_locked = model.tree_mut().set_locked(reference, false)?;
        debug!("syncing {} with policy '{}'", model.tree().path(reference), self.name);

        let result = model
            .mark_dirty(reference, false)
            .and_then(|_| self.sync(model, reference));

        // A listener may have destroyed the reference in the meantime.
        if model.tree().contains(reference) {
            model.admit(self.cache, reference);
            model.tree_mut().set_locked(reference, was_locked)?;
        }
        result.map_err(|e| sync_failure(model.tree(), reference, e))
    }

    /// Populate `reference` from the source, then apply the skeleton.
    /// Only `run_sync` calls this, with the dirty flag already cleared.
    pub(crate) fn sync(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        self.sync_impl(model, reference)?;
        self.reconciler.apply_skeleton(model, reference)
    }

    fn sync_impl(&self, model: &mut Model, reference: NodeId) -> Result<()> {
        let source = Rc::clone(&self.source);
        let content = model.with_sync_suppressed(|m| source.fetch(m.tree_mut(), reference))?;
        let result = self.populate(model, reference, content);
        if model.tree().contains(content) {
            model.tree_mut().destroy(content)?;
        }
        result
    }

    /// Apply fetched content to the live reference.
    ///
    /// An empty reference takes the content over after stage composition; a
    /// reference that already has children is reconciled instead.
    pub fn populate(&self, model: &mut Model, reference: NodeId, content: NodeId) -> Result<()> {
        if !model.tree().children(reference)?.is_empty() {
            return self.reconciler.reconcile(model, self, reference, content);
        }
        self.composer.apply_next_stages(model, content)?;

        let data = model.tree().get(content)?;
        let attributes = data.attributes().clone();
        let value = data.value().map(str::to_string);
        let children = data.children().to_vec();
        for (name, value) in &attributes {
            if model.tree().attribute(reference, name)? != Some(value.as_str()) {
                model.put_attribute(reference, name, value)?;
            }
        }
        if value.is_some() {
            model.put_value(reference, value)?;
        }
        for child in children {
            model.attach(reference, child, None)?;
        }
        Ok(())
    }

    /// Turn a detached local subtree into an external reference for this
    /// policy. `local` is consumed.
    ///
    /// A dirty reference keeps only the static attributes; a clean one takes
    /// every attribute and child and has its secondary stages applied. With
    /// a `prototype` the reference starts as a shallow copy of it.
    pub fn create_external_tree(
        &self,
        model: &mut Model,
        local: NodeId,
        dirty: bool,
        prototype: Option<NodeId>,
    ) -> Result<NodeId> {
        let tree = model.tree_mut();
        let reference = match prototype {
            Some(prototype) => {
                let reference = tree.clone_prototype(prototype)?;
                tree.set_policy(reference, Some(self.id))?;
                tree.set_dirty(reference, dirty)?;
                reference
            }
            None => {
                let name = tree.name(local)?.to_string();
                tree.create_reference(&name, Some(self.id), dirty)
            }
        };

        let attributes = tree.attributes(local)?.clone();
        for (name, value) in &attributes {
            if !dirty || self.is_static_attribute(Some(name)) {
                tree.set_attribute(reference, name, value)?;
            }
        }
        if !dirty {
            let value = tree.value(local)?.map(str::to_string);
            if value.is_some() {
                tree.set_value(reference, value)?;
            }
            for child in tree.children(local)?.to_vec() {
                tree.insert_child(reference, child, None)?;
            }
        }
        tree.destroy(local)?;

        if !dirty {
            self.composer.apply_next_stages(model, reference)?;
        }
        Ok(reference)
    }

    /// Default insert: build `content` against a prototype of `parent` so
    /// stage composition sees the right ancestry, then splice the result in.
    ///
    /// Returns the inserted node, or `None` when `parent` is unpopulated.
    pub fn default_insert(
        &self,
        model: &mut Model,
        parent: NodeId,
        content: NodeId,
        index: Option<usize>,
        dirty: bool,
    ) -> Result<Option<NodeId>> {
        if model.tree().is_dirty(parent)? {
            debug!("dropping insert under unpopulated {}", model.tree().path(parent));
            return Ok(None);
        }
        let scratch = model.tree_mut().clone_prototype(parent)?;
        let built = self.build_in(model, scratch, content, dirty);
        let node = match built {
            Ok(node) => {
                model.tree_mut().detach(node)?;
                Ok(node)
            }
            Err(e) => Err(e),
        };
        model.tree_mut().destroy(scratch)?;
        let node = node?;
        model.attach(parent, node, index)?;
        Ok(Some(node))
    }

    fn build_in(&self, model: &mut Model, scratch: NodeId, content: NodeId, dirty: bool) -> Result<NodeId> {
        model.tree_mut().insert_child(scratch, content, None)?;
        self.composer.apply_dynamic_stages(model, scratch, dirty)?;
        model
            .tree()
            .children(scratch)?
            .first()
            .copied()
            .ok_or_else(|| Error::Unsupported {
                operation: "insert".to_string(),
                target: format!("policy '{}' (content vanished during composition)", self.name),
            })
    }

    /// Default update: diff-based reconciliation
    pub fn default_update(&self, model: &mut Model, reference: NodeId, content: NodeId) -> Result<()> {
        self.reconciler.update(model, self, reference, content)
    }

    /// Default remove: detach the best structural match
    pub fn default_remove(&self, model: &mut Model, parent: NodeId, content: NodeId) -> Result<bool> {
        self.reconciler.remove(model, parent, content)
    }
}

/// Wrap a failure as a sync failure of `node` unless it already says what
/// went wrong in caching terms.
pub(crate) fn sync_failure(tree: &Tree, node: NodeId, error: Error) -> Error {
    match error {
        Error::Sync { .. }
        | Error::MalformedContent { .. }
        | Error::Unsupported { .. }
        | Error::NoPolicy { .. } => error,
        other => Error::sync_failure(tree.path(node), other),
    }
}
