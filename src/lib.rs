//! # Tree Pager Library
//!
//! A lazily-synchronized, evictable hierarchical data cache. Any subtree of
//! the tree may be *external*: backed by a directory, a document store, the
//! environment or any other [`source::SyncSource`], populated on first
//! access, kept in a bounded cache and evicted again under pressure while the
//! shape of the tree stays stable. Think demand paging for an observed tree.
//!
//! ## Quick Example
//!
//! ```
//! use std::rc::Rc;
//! use tree_pager::cache::AccessOrderedCache;
//! use tree_pager::fragment::Fragment;
//! use tree_pager::model::Model;
//! use tree_pager::policy::{CachingPolicy, StaticAttributes};
//! use tree_pager::source::MemorySource;
//!
//! let source = MemorySource::new().with_document(
//!     "users",
//!     Fragment::new("table").with_child(Fragment::new("row").with_attribute("id", "1")),
//! );
//!
//! let mut model = Model::new();
//! let cache = model.register_cache(Box::new(AccessOrderedCache::new(16)));
//! let policy = model.register_policy(
//!     CachingPolicy::new("tables", Rc::new(source))
//!         .with_cache(cache)
//!         .with_static_attributes(StaticAttributes::parse("id")),
//! );
//!
//! let table = model.create_reference("table", Some(policy)).unwrap();
//! model.tree_mut().set_attribute(table, "id", "users").unwrap();
//!
//! // Static attributes never trigger a sync...
//! assert_eq!(model.attribute(table, "id").unwrap().as_deref(), Some("users"));
//! assert!(model.is_dirty(table).unwrap());
//!
//! // ...reading children does.
//! assert_eq!(model.children(table).unwrap().len(), 1);
//! assert!(!model.is_dirty(table).unwrap());
//! ```
//!
//! ## Core Concepts
//!
//! - **Tree (`tree`)**: a generational arena of nodes. Raw access, no hooks.
//! - **Model (`model`)**: the observed tree. Accessors run the access hooks
//!   of external references, mutations notify listeners, and a tree-wide
//!   sync context suppresses nested syncs.
//! - **Policies (`policy`)**: when to sync, how to compose secondary stages
//!   and static subtrees into fresh content, how to reconcile later changes.
//! - **Caches (`cache`)**: which populated references to evict, with
//!   ancestor pinning.
//! - **Diff (`diff`)**: a structural diff and the stage-aware entity differ
//!   built on it.
//! - **Sources (`source`)**: the store-specific fetch/flush halves.
//! - **Settings (`config`)**: a YAML document declaring all of the above.
//!
//! ## Sync Flow
//!
//! 1.  An accessor reaches a dirty external reference.
//! 2.  The policy clears the dirty flag and unlocks the reference.
//! 3.  The source fetches detached content with syncs suppressed.
//! 4.  Secondary stages are substituted and static subtrees grafted.
//! 5.  The content is applied to the live reference, notifying listeners.
//! 6.  The reference is admitted to its cache, which may evict others.

pub mod cache;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod fragment;
pub mod model;
pub mod output;
pub mod policy;
pub mod selector;
pub mod source;
pub mod tree;

#[cfg(test)]
mod cache_proptest;
