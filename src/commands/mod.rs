//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the `tree-pager`
//! command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and the global color
//!   flag and performs the command's logic through the `tree_pager` library.

pub mod show;
pub mod validate;
