//! Reference caches and eviction
//!
//! A cache tracks which external references are currently populated and
//! decides which of them to evict. Caches never touch the tree themselves:
//! every mutating call returns the *victims* the model must clear, which
//! keeps eviction on the model thread and lets a victim's `clear_cache`
//! notify listeners like any other mutation.
//!
//! Two implementations are provided:
//!
//! - [`UnboundedCache`]: never evicts; every operation is a no-op.
//! - [`AccessOrderedCache`]: least-recently-touched eviction with ancestor
//!   pinning. A resident reference removes every resident ancestor reference
//!   from the evictable set, so a subtree is never evicted out from under a
//!   live descendant.
//!
//! Locking and membership are the same thing here: a locked reference is
//! simply one that is not in the evictable set. References with listeners
//! anywhere in their subtree are never chosen as victims, so when everything
//! resident is pinned the cache grows past its capacity instead.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::{NodeId, Tree};

/// Handle to a cache registered with a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId(pub(crate) usize);

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache#{}", self.0)
    }
}

/// Which cache implementation to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// Least-recently-touched eviction with ancestor pinning
    #[default]
    AccessOrdered,
    /// Never evicts
    Unbounded,
}

/// Cache settings, as found under `cache:` in a settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CacheSettings {
    /// Cache implementation
    #[serde(default)]
    pub kind: CacheKind,
    /// Maximum number of evictable references; zero or negative is unbounded
    #[serde(default)]
    pub capacity: i64,
}

impl CacheSettings {
    /// Build the configured cache
    pub fn build(&self) -> Result<Box<dyn Cache>> {
        let mut cache: Box<dyn Cache> = match self.kind {
            CacheKind::AccessOrdered => Box::new(AccessOrderedCache::new(0)),
            CacheKind::Unbounded => Box::new(UnboundedCache),
        };
        cache.configure(self)?;
        Ok(cache)
    }
}

/// Size and capacity of one cache. `None` means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub id: CacheId,
    pub size: Option<usize>,
    pub capacity: Option<usize>,
}

/// The cache contract.
///
/// Implementations must never report an error for eviction: evicting a
/// dirty reference is a no-op for the model, and a locked (pinned) reference
/// is never returned as a victim.
pub trait Cache: fmt::Debug {
    /// Apply settings
    fn configure(&mut self, settings: &CacheSettings) -> Result<()>;

    /// Admit (or re-touch) a populated reference, returning victims to clear
    fn add(&mut self, tree: &Tree, reference: NodeId) -> Vec<NodeId>;

    /// Drop a reference from the evictable set, returning victims to clear
    fn remove(&mut self, tree: &Tree, reference: NodeId) -> Vec<NodeId>;

    /// Mark a reference as most recently used
    fn touch(&mut self, reference: NodeId);

    /// Forget a reference whose node is being destroyed, without releasing
    /// any ancestor
    fn forget(&mut self, reference: NodeId);

    /// True if the reference is currently evictable
    fn contains(&self, reference: NodeId) -> bool;

    /// Number of evictable references, `None` if unknown
    fn size(&self) -> Option<usize>;

    /// Capacity, `None` if there is no limit
    fn capacity(&self) -> Option<usize>;

    /// Exclude a reference from eviction
    fn memory_lock(&mut self, tree: &Tree, reference: NodeId) -> Vec<NodeId> {
        self.remove(tree, reference)
    }

    /// Make a reference evictable again
    fn memory_unlock(&mut self, tree: &Tree, reference: NodeId) -> Vec<NodeId> {
        self.add(tree, reference)
    }
}

/// A cache that never evicts
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundedCache;

impl Cache for UnboundedCache {
    fn configure(&mut self, _settings: &CacheSettings) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, _tree: &Tree, _reference: NodeId) -> Vec<NodeId> {
        Vec::new()
    }

    fn remove(&mut self, _tree: &Tree, _reference: NodeId) -> Vec<NodeId> {
        Vec::new()
    }

    fn touch(&mut self, _reference: NodeId) {}

    fn forget(&mut self, _reference: NodeId) {}

    fn contains(&self, _reference: NodeId) -> bool {
        false
    }

    fn size(&self) -> Option<usize> {
        None
    }

    fn capacity(&self) -> Option<usize> {
        None
    }
}

/// Least-recently-touched cache with ancestor pinning
#[derive(Debug, Clone, Default)]
pub struct AccessOrderedCache {
    /// Zero means unbounded
    capacity: usize,
    /// Evictable references, most recently touched last
    entries: Vec<NodeId>,
}

impl AccessOrderedCache {
    /// Create a cache; a capacity of zero never evicts
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    /// Evictable references, least recently touched first
    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    fn position(&self, reference: NodeId) -> Option<usize> {
        self.entries.iter().position(|r| *r == reference)
    }

    /// True while some evictable reference lives below `reference`.
    ///
    /// The leaves of the resident forest are always evictable, so this is
    /// exactly "some descendant is resident".
    fn pinned_by_descendant(&self, tree: &Tree, reference: NodeId) -> bool {
        self.entries
            .iter()
            .any(|r| tree.is_ancestor(reference, *r).unwrap_or(false))
    }

    /// Re-admit the nearest reference ancestor of `reference` if nothing
    /// below it is still resident. Never evicts.
    fn release_ancestor(&mut self, tree: &Tree, reference: NodeId) {
        let Some(ancestor) = tree.nearest_reference_ancestor(reference) else {
            return;
        };
        if self.can_admit(tree, ancestor) {
            debug!("releasing pinned ancestor {}", tree.path(ancestor));
            self.entries.push(ancestor);
        }
    }

    fn can_admit(&self, tree: &Tree, reference: NodeId) -> bool {
        tree.contains(reference)
            && !tree.is_dirty(reference).unwrap_or(true)
            && self.position(reference).is_none()
            && !self.pinned_by_descendant(tree, reference)
    }
}

impl Cache for AccessOrderedCache {
    fn configure(&mut self, settings: &CacheSettings) -> Result<()> {
        self.capacity = usize::try_from(settings.capacity).unwrap_or(0);
        Ok(())
    }

    fn add(&mut self, tree: &Tree, reference: NodeId) -> Vec<NodeId> {
        let newly_added = match self.position(reference) {
            Some(index) => {
                self.entries.remove(index);
                false
            }
            None => true,
        };
        if self.pinned_by_descendant(tree, reference) {
            debug!("{} stays pinned by a resident descendant", tree.path(reference));
            return Vec::new();
        }
        self.entries.push(reference);

        // A resident child pins every resident ancestor.
        for ancestor in tree.reference_ancestors(reference) {
            if let Some(index) = self.position(ancestor) {
                self.entries.remove(index);
            }
        }

        let mut victims = Vec::new();
        if newly_added && self.capacity > 0 && self.entries.len() > self.capacity {
            // Observed references are pinned: clearing one would only force
            // an immediate resync.
            let candidate = self.entries[..self.entries.len() - 1]
                .iter()
                .position(|r| !tree.is_observed(*r));
            match candidate {
                Some(index) => {
                    let victim = self.entries.remove(index);
                    debug!(
                        "evicting {} (size {}, capacity {})",
                        tree.path(victim),
                        self.entries.len(),
                        self.capacity
                    );
                    self.release_ancestor(tree, victim);
                    victims.push(victim);
                }
                None => debug!(
                    "every resident reference is pinned; growing to {}",
                    self.entries.len()
                ),
            }
        }
        victims
    }

    fn remove(&mut self, tree: &Tree, reference: NodeId) -> Vec<NodeId> {
        let Some(index) = self.position(reference) else {
            return Vec::new();
        };
        self.entries.remove(index);
        match tree.nearest_reference_ancestor(reference) {
            Some(ancestor) => self.memory_unlock(tree, ancestor),
            None => Vec::new(),
        }
    }

    fn touch(&mut self, reference: NodeId) {
        if let Some(index) = self.position(reference) {
            self.entries.remove(index);
            self.entries.push(reference);
        }
    }

    fn forget(&mut self, reference: NodeId) {
        self.entries.retain(|r| *r != reference);
    }

    fn contains(&self, reference: NodeId) -> bool {
        self.position(reference).is_some()
    }

    fn size(&self) -> Option<usize> {
        Some(self.entries.len())
    }

    fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    fn memory_unlock(&mut self, tree: &Tree, reference: NodeId) -> Vec<NodeId> {
        if self.can_admit(tree, reference) {
            self.add(tree, reference)
        } else {
            Vec::new()
        }
    }
}
