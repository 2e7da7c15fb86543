//! # Settings Documents
//!
//! This module defines the YAML settings document that declares caches,
//! policies and root references, and the logic that turns it into a ready
//! [`Model`].
//!
//! ## Format
//!
//! ```yaml
//! cache:
//!   kind: access-ordered      # or: unbounded
//!   capacity: 64              # zero or negative: no limit
//! policies:
//!   fs:
//!     source: filesystem
//!     root: /srv/data
//!     static-attributes: "name, path"
//!     stages:
//!       - { select: dir, policy: fs, dirty: true }
//!   env:
//!     source: environment
//!     prefix: APP_
//!     cache: false            # always resident
//! roots:
//!   - { name: data, policy: fs }
//!   - { name: env, policy: env }
//! ```
//!
//! Policies are registered in document order, so a stage may refer to any
//! policy, including the one it belongs to. Unknown policy names and
//! unparseable selectors fail with `ConfigParse` and a hint.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::model::Model;
use crate::policy::{CachingPolicy, StaticAttributes, StaticSubtree};
use crate::selector::Selector;
use crate::source::{EnvironmentSource, FileSystemSource, MemorySource, SyncSource};
use crate::tree::{NodeId, PolicyId};

/// Name of the plain node holding every configured root
pub const CONTAINER_NAME: &str = "roots";

/// The whole settings document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub policies: IndexMap<String, PolicySettings>,
    #[serde(default)]
    pub roots: Vec<RootSettings>,
}

/// Which backing store a policy reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Memory,
    Filesystem,
    Environment,
}

fn default_true() -> bool {
    true
}

/// One policy declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PolicySettings {
    pub source: SourceKind,
    /// Comma-separated static attribute patterns
    #[serde(default)]
    pub static_attributes: String,
    #[serde(default)]
    pub stages: Vec<StageSettings>,
    #[serde(default)]
    pub static_subtrees: Vec<StaticSubtreeSettings>,
    #[serde(default)]
    pub skeleton: Option<Fragment>,
    /// Report to the shared cache; `false` keeps references resident
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Directory listed by a filesystem source
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Variable prefix for an environment source
    #[serde(default)]
    pub prefix: Option<String>,
    /// Documents served by a memory source, by key
    #[serde(default)]
    pub documents: IndexMap<String, Fragment>,
}

/// A dynamic secondary stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StageSettings {
    pub select: String,
    pub policy: String,
    #[serde(default = "default_true")]
    pub dirty: bool,
}

/// A static subtree, optionally an unpopulated reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StaticSubtreeSettings {
    pub content: Fragment,
    #[serde(default)]
    pub policy: Option<String>,
}

/// A reference created at start-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RootSettings {
    pub name: String,
    pub policy: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

/// A model built from settings
#[derive(Debug)]
pub struct Built {
    pub model: Model,
    /// Plain node holding the roots, in declaration order
    pub container: NodeId,
    pub roots: Vec<NodeId>,
}

/// Parses a settings document.
pub fn parse(yaml_content: &str) -> Result<Settings> {
    serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: Some(
            "Expected top-level 'cache', 'policies' and 'roots' keys; see the settings format in the docs"
                .to_string(),
        ),
    })
}

/// Parse settings from a YAML file path
pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

impl Settings {
    fn resolve(&self, ids: &HashMap<&str, PolicyId>, name: &str, context: &str) -> Result<PolicyId> {
        ids.get(name).copied().ok_or_else(|| Error::ConfigParse {
            message: format!("unknown policy '{}' in {}", name, context),
            hint: Some(format!("Declare '{}' under 'policies:'", name)),
        })
    }

    fn build_source(name: &str, settings: &PolicySettings) -> Rc<dyn SyncSource> {
        match settings.source {
            SourceKind::Memory => {
                let source = MemorySource::new();
                for (key, document) in &settings.documents {
                    source.put(key, document.clone());
                }
                Rc::new(source)
            }
            SourceKind::Filesystem => {
                let root = settings.root.clone().unwrap_or_else(|| PathBuf::from("."));
                debug!("policy '{}' lists {}", name, root.display());
                Rc::new(FileSystemSource::new(root))
            }
            SourceKind::Environment => Rc::new(match &settings.prefix {
                Some(prefix) => EnvironmentSource::with_prefix(prefix),
                None => EnvironmentSource::new(),
            }),
        }
    }

    /// Build every policy into `model`, returning their ids by name
    fn build_policies(&self, model: &mut Model) -> Result<HashMap<&str, PolicyId>> {
        let cache = model.register_cache(self.cache.build()?);
        let first = model.next_policy_id().0;
        let ids: HashMap<&str, PolicyId> = self
            .policies
            .keys()
            .enumerate()
            .map(|(index, name)| (name.as_str(), PolicyId(first + index)))
            .collect();

        for (name, settings) in &self.policies {
            let mut policy = CachingPolicy::new(name, Self::build_source(name, settings))
                .with_static_attributes(StaticAttributes::parse(&settings.static_attributes));
            if settings.cache {
                policy = policy.with_cache(cache);
            }
            for stage in &settings.stages {
                let selector = Selector::parse(&stage.select).map_err(|e| Error::ConfigParse {
                    message: e.to_string(),
                    hint: Some(format!("Fix the 'select' expression of a stage of '{}'", name)),
                })?;
                let target = self.resolve(&ids, &stage.policy, &format!("a stage of '{}'", name))?;
                policy = policy.with_stage(selector, target, stage.dirty);
            }
            for subtree in &settings.static_subtrees {
                policy = policy.with_static_subtree(match &subtree.policy {
                    Some(target) => StaticSubtree::with_policy(
                        subtree.content.clone(),
                        self.resolve(&ids, target, &format!("a static subtree of '{}'", name))?,
                    ),
                    None => StaticSubtree::new(subtree.content.clone()),
                });
            }
            if let Some(skeleton) = &settings.skeleton {
                policy = policy.with_skeleton(skeleton.clone());
            }
            model.register_policy(policy);
        }
        Ok(ids)
    }

    /// Check that every name resolves and every selector parses, without
    /// syncing anything
    pub fn validate(&self) -> Result<()> {
        let mut model = Model::new();
        let ids = self.build_policies(&mut model)?;
        for root in &self.roots {
            self.resolve(&ids, &root.policy, &format!("root '{}'", root.name))?;
        }
        Ok(())
    }

    /// Build a model with every policy registered and every root attached,
    /// still dirty, under a plain container node
    pub fn build(&self) -> Result<Built> {
        let mut model = Model::new();
        let ids = self.build_policies(&mut model)?;
        let container = model.create_node(CONTAINER_NAME);
        let mut roots = Vec::new();
        for root in &self.roots {
            let policy = self.resolve(&ids, &root.policy, &format!("root '{}'", root.name))?;
            let reference = model.create_reference(&root.name, Some(policy))?;
            for (name, value) in &root.attributes {
                model.tree_mut().set_attribute(reference, name, value)?;
            }
            model.add_child(container, reference)?;
            roots.push(reference);
        }
        Ok(Built {
            model,
            container,
            roots,
        })
    }
}
