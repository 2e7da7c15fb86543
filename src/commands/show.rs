//! # Show Command Implementation
//!
//! This module implements the `show` subcommand, which builds the model
//! described by a settings file and prints it as a tree.
//!
//! ## Functionality
//!
//! - **On-demand sync**: every visited reference goes through the access
//!   hooks, so it is populated exactly when the walk reaches it.
//! - **Depth Control**: `--depth` limits how far the walk descends; deeper
//!   references stay dirty and are shown as such.
//! - **Cache statistics**: residency of every cache after the walk.
//!
//! A reference that fails to sync is shown with the error instead of its
//! children; the walk carries on.

use anyhow::Result;
use clap::Args;
use log::warn;
use ptree::{print_tree, TreeItem};
use std::path::PathBuf;

use tree_pager::config;
use tree_pager::model::Model;
use tree_pager::output::{cache_line, OutputConfig};
use tree_pager::tree::NodeId;

/// Print the configured tree
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Path to the settings file.
    #[arg(short, long, value_name = "FILE", default_value = "tree-pager.yaml")]
    pub config: PathBuf,

    /// Maximum depth to walk.
    ///
    /// If not specified, walks (and syncs) the full tree.
    /// Use 0 to show only the roots without syncing them.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `show` command.
pub fn execute(args: ShowArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config_path = &args.config;

    let settings = config::from_file(config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let built = settings
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build model: {}", e))?;
    let mut model = built.model;

    let max_depth = args.depth.unwrap_or(usize::MAX);
    let tree_root = TreeNode {
        label: format!("{} ({} root(s))", config::CONTAINER_NAME, built.roots.len()),
        children: built
            .roots
            .iter()
            .map(|root| build_tree_node(&mut model, *root, max_depth, 0))
            .collect(),
    };
    print_tree(&tree_root).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;

    for stats in model.cache_stats() {
        println!("{}", cache_line(&out, &stats));
    }
    Ok(())
}

/// Walk one node through the access hooks
fn build_tree_node(model: &mut Model, node: NodeId, max_depth: usize, depth: usize) -> TreeNode {
    if depth >= max_depth {
        return TreeNode {
            label: label(model, node),
            children: vec![],
        };
    }
    match model.children(node) {
        Ok(children) => {
            let label = label(model, node);
            let mut nodes = Vec::with_capacity(children.len());
            for child in children {
                // Syncing an earlier sibling may have evicted this one's parent.
                if model.tree().contains(child) {
                    nodes.push(build_tree_node(model, child, max_depth, depth + 1));
                }
            }
            TreeNode {
                label,
                children: nodes,
            }
        }
        Err(e) => {
            warn!("Failed to expand {}: {}", model.tree().path(node), e);
            TreeNode {
                label: format!("{} (error: {})", label(model, node), e),
                children: vec![],
            }
        }
    }
}

/// Name, attributes and value, plus the sync state of references. Reads the
/// raw tree: labelling never syncs.
fn label(model: &Model, node: NodeId) -> String {
    let tree = model.tree();
    let Ok(data) = tree.get(node) else {
        return node.to_string();
    };
    let mut label = data.name().to_string();
    for (name, value) in data.attributes() {
        label.push_str(&format!(" {}=\"{}\"", name, value));
    }
    if let Some(value) = data.value() {
        label.push_str(&format!(": {}", value));
    }
    if let Some(external) = data.external() {
        label.push_str(if external.dirty { " (dirty)" } else { " (synced)" });
    }
    label
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}
