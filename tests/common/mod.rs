//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures, helper functions, and settings
//! documents to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_config(configs::MEMORY);
//!     fixture.command().arg("show").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::Path;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    pub use super::TestFixture;
}

/// Common settings documents for testing.
#[allow(dead_code)]
pub mod configs {
    /// One memory-backed table with a dirty `rows` stage.
    pub const MEMORY: &str = r#"
cache:
  capacity: 4
policies:
  tables:
    source: memory
    static-attributes: "id"
    stages:
      - { select: rows, policy: rows }
    documents:
      users:
        name: table
        attributes: { title: Users }
        children:
          - name: rows
            attributes: { id: users-rows }
  rows:
    source: memory
    static-attributes: "id"
    documents:
      users-rows:
        name: rows
        children:
          - { name: row, attributes: { id: "1" } }
          - { name: row, attributes: { id: "2" } }
roots:
  - name: table
    policy: tables
    attributes: { id: users }
"#;

    /// A root whose document does not exist.
    pub const MISSING_DOCUMENT: &str = r#"
policies:
  tables:
    source: memory
roots:
  - { name: ghost, policy: tables }
"#;

    /// A stage naming an undeclared policy.
    pub const UNKNOWN_POLICY: &str = r#"
policies:
  tables:
    source: memory
    stages:
      - { select: rows, policy: nowhere }
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "policies: [unclosed";

    /// No policies, no roots.
    pub const EMPTY: &str = "# tree-pager settings\n{}\n";
}

/// A test fixture that provides a temporary directory with optional settings.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_config(configs::MEMORY)
///     .with_file("data/a.txt", "hello");
///
/// fixture.command().arg("validate").assert().success();
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `tree-pager.yaml` settings file with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("tree-pager.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add a file with the given path and content.
    #[allow(dead_code)]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the settings file.
    #[allow(dead_code)]
    pub fn config_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("tree-pager.yaml")
    }

    /// Create a command configured to run in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tree-pager");
        cmd.current_dir(self.path()).arg("--color").arg("never");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_config() {
        let fixture = TestFixture::new().with_config("{}");
        assert!(fixture.config_path().exists());
    }

    #[test]
    fn test_configs_parse_as_settings() {
        for config in [configs::MEMORY, configs::MISSING_DOCUMENT, configs::UNKNOWN_POLICY, configs::EMPTY] {
            tree_pager::config::parse(config).expect("Config should be valid settings");
        }
    }

    #[test]
    fn test_invalid_yaml_is_actually_invalid() {
        assert!(tree_pager::config::parse(configs::INVALID_YAML).is_err());
    }
}
