//! # Tree Pager CLI
//!
//! This is the binary entry point for the `tree-pager` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Executing the appropriate command based on the parsed arguments.
//! - Handling top-level application errors and translating them into user-friendly
//!   output.
//!
//! The caching engine lives in the `tree_pager` library crate; the binary is a
//! thin wrapper that builds a model from a settings file and inspects it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
