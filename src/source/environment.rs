//! Process environment

use log::debug;

use super::SyncSource;
use crate::error::Result;
use crate::model::Model;
use crate::policy::CachingPolicy;
use crate::tree::{NodeId, Tree};

/// Environment variables as `var` children (`name` attribute, value as node
/// value), sorted by name. Read-only.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSource {
    prefix: Option<String>,
}

impl EnvironmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only list variables starting with `prefix`
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
        }
    }
}

impl SyncSource for EnvironmentSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn fetch(&self, tree: &mut Tree, _reference: NodeId) -> Result<NodeId> {
        let mut vars: Vec<(String, String)> = std::env::vars()
            .filter(|(name, _)| self.prefix.as_deref().map_or(true, |p| name.starts_with(p)))
            .collect();
        vars.sort();
        debug!("environment source lists {} variable(s)", vars.len());

        let content = tree.create("environment");
        for (name, value) in vars {
            let var = tree.create("var");
            tree.set_attribute(var, "name", &name)?;
            tree.set_value(var, Some(value))?;
            tree.insert_child(content, var, None)?;
        }
        Ok(content)
    }

    fn insert(
        &self,
        _model: &mut Model,
        _policy: &CachingPolicy,
        _parent: NodeId,
        _content: NodeId,
        _index: Option<usize>,
        _dirty: bool,
    ) -> Result<Option<NodeId>> {
        Err(self.unsupported("insert"))
    }

    fn update(&self, _model: &mut Model, _policy: &CachingPolicy, _reference: NodeId, _content: NodeId) -> Result<()> {
        Err(self.unsupported("update"))
    }

    fn remove(&self, _model: &mut Model, _policy: &CachingPolicy, _parent: NodeId, _content: NodeId) -> Result<bool> {
        Err(self.unsupported("remove"))
    }
}
