//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks a settings
//! file without building any content.
//!
//! ## Functionality
//!
//! - **Parsing**: the document must match the settings schema.
//! - **Resolution**: every stage, static subtree and root must name a
//!   declared policy, and every stage selector must parse.
//!
//! This command never syncs a reference, so it does not touch any backing
//! store.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use tree_pager::config;
use tree_pager::output::{emoji, OutputConfig};

/// Validate a settings file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the settings file to validate.
    #[arg(short, long, value_name = "FILE", default_value = "tree-pager.yaml")]
    pub config: PathBuf,
}

/// Execute the `validate` command.
///
/// # Arguments
/// * `args` - The command arguments
/// * `color_flag` - The value of the global --color flag ("always", "never", or "auto")
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config_path = &args.config;
    println!(
        "{} Validating configuration: {}",
        emoji(&out, "🔍", "[SCAN]"),
        config_path.display()
    );

    let settings = match config::from_file(config_path) {
        Ok(settings) => settings,
        Err(e) => {
            println!(
                "{} Configuration parsing failed: {}",
                emoji(&out, "❌", "[ERR]"),
                e
            );
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    };

    if let Err(e) = settings.validate() {
        println!("{} {}", emoji(&out, "❌", "[ERR]"), e);
        return Err(anyhow::anyhow!("Configuration validation failed"));
    }

    println!(
        "{} {} policy(ies), {} root(s), cache capacity {}",
        emoji(&out, "✅", "[OK]"),
        settings.policies.len(),
        settings.roots.len(),
        if settings.cache.capacity > 0 {
            settings.cache.capacity.to_string()
        } else {
            "unlimited".to_string()
        }
    );
    Ok(())
}
