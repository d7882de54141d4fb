//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures, helper functions, and YAML snippets
//! to reduce duplication across test files.
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
//!     let fixture = TestFixture::new().with_success_workspace();
//!     fixture.command().arg("build").arg("dir").assert().success();
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

/// Configuration YAML snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// A workspace with two members, one nested two levels deep.
    pub const TWO_MEMBERS: &str = "version: v1\ndirectories:\n  - proto\n  - other/proto\n";

    /// A workspace whose member is absolute.
    pub const ABSOLUTE_MEMBER: &str = "version: v1\ndirectories:\n  - /home/buf\n";

    /// A workspace whose member leaves the workspace directory.
    pub const ESCAPING_MEMBER: &str =
        "version: v1\ndirectories:\n  - ../breaking/other/proto\n";

    /// A workspace whose members nest.
    pub const NESTED_MEMBERS: &str = "version: v1\ndirectories:\n  - foo\n  - foo/bar\n";

    /// A module configuration with a misspelled key.
    pub const MISSPELLED_MODULE: &str = "version: v1\nbuild:\n  exclude:\n    - internal\n";
}

/// A temporary directory populated with schema files.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_file("dir/protomod.work.yaml", configs::TWO_MEMBERS)
///     .with_file("dir/proto/rpc.proto", "syntax = \"proto3\";");
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

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Add an empty directory.
    #[allow(dead_code)]
    pub fn with_dir(self, path: &str) -> Self {
        self.temp_dir
            .child(path)
            .create_dir_all()
            .expect("Failed to create directory");
        self
    }

    /// The two-member workspace under `dir/`.
    #[allow(dead_code)]
    pub fn with_success_workspace(self) -> Self {
        self.with_file("dir/protomod.work.yaml", configs::TWO_MEMBERS)
            .with_file(
                "dir/proto/rpc.proto",
                "syntax = \"proto3\";\n\npackage example;\n",
            )
            .with_file(
                "dir/other/proto/request.proto",
                "syntax = \"proto3\";\n\npackage request;\n",
            )
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command running in this fixture's directory, with an empty
    /// module cache inside the fixture.
    #[allow(dead_code)]
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("protomod");
        cmd.current_dir(self.path())
            .env("PROTOMOD_CACHE_DIR", self.path().join(".cache"));
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
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_fixture_with_file() {
        let fixture = TestFixture::new().with_file("a/b.proto", "");
        assert!(fixture.path().join("a/b.proto").exists());
    }

    #[test]
    fn test_configs_are_valid_yaml() {
        for config in [
            configs::TWO_MEMBERS,
            configs::ABSOLUTE_MEMBER,
            configs::ESCAPING_MEMBER,
            configs::NESTED_MEMBERS,
            configs::MISSPELLED_MODULE,
        ] {
            assert!(serde_yaml::from_str::<serde_yaml::Value>(config).is_ok());
        }
    }
}
