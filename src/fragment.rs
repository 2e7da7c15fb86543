//! Plain-data tree fragments
//!
//! A [`Fragment`] is the serializable form of a subtree. It is how backing
//! stores hand content to the engine, how static subtrees and skeletons are
//! declared in settings, and how a live subtree is rendered for debugging.
//!
//! Serialized content is YAML; since YAML is a superset of JSON, JSON text is
//! accepted as well.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree};

/// Namespace prefix of bookkeeping attributes written by snapshots.
///
/// Attributes in this namespace describe caching state rather than content,
/// so reconciliation never diffs them.
pub const BOOKKEEPING_PREFIX: &str = "cache:";

/// Bookkeeping attribute marking a reference that was dirty when captured
pub const DIRTY_ATTRIBUTE: &str = "cache:dirty";

/// Check whether an attribute name belongs to the bookkeeping namespace
pub fn is_bookkeeping(name: &str) -> bool {
    name.starts_with(BOOKKEEPING_PREFIX)
}

/// Serializable subtree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fragment {
    /// Node name
    pub name: String,
    /// Optional text value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Attributes in document order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
    /// Child fragments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Fragment>,
}

impl Fragment {
    /// Create an empty fragment
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Builder: add an attribute
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Builder: set the value
    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// Builder: append a child
    pub fn with_child(mut self, child: Fragment) -> Self {
        self.children.push(child);
        self
    }

    /// Parse serialized content (YAML or JSON).
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedContent` carrying the offending text when the
    /// input does not describe a fragment.
    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::MalformedContent {
            message: e.to_string(),
            text: text.to_string(),
        })
    }

    /// Serialize as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build a detached plain subtree from this fragment
    pub fn instantiate(&self, tree: &mut Tree) -> Result<NodeId> {
        let node = tree.create(&self.name);
        tree.set_value(node, self.value.clone())?;
        for (name, value) in &self.attributes {
            tree.set_attribute(node, name, value)?;
        }
        for child in &self.children {
            let child_node = child.instantiate(tree)?;
            tree.insert_child(node, child_node, None)?;
        }
        Ok(node)
    }

    /// Capture a live subtree without going through any access hook.
    ///
    /// Dirty references are captured without children and carry
    /// [`DIRTY_ATTRIBUTE`].
    pub fn capture(tree: &Tree, node: NodeId) -> Result<Self> {
        let data = tree.get(node)?;
        let mut fragment = Fragment {
            name: data.name().to_string(),
            value: data.value().map(str::to_string),
            attributes: data.attributes().clone(),
            children: Vec::new(),
        };
        if tree.is_dirty(node)? {
            fragment
                .attributes
                .insert(DIRTY_ATTRIBUTE.to_string(), "true".to_string());
            return Ok(fragment);
        }
        for child in data.children() {
            fragment.children.push(Fragment::capture(tree, *child)?);
        }
        Ok(fragment)
    }

    /// Copy of this fragment without bookkeeping attributes
    pub fn without_bookkeeping(&self) -> Self {
        Fragment {
            name: self.name.clone(),
            value: self.value.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|(name, _)| !is_bookkeeping(name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            children: self.children.iter().map(Self::without_bookkeeping).collect(),
        }
    }
}
