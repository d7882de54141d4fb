//! Default values and well-known file names for protomod.
//!
//! This module provides centralized default values used across the library
//! and the commands, ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Module configuration file, read from the root of every module.
pub const MODULE_CONFIG_FILE: &str = "protomod.yaml";

/// Workspace descriptor listing member module directories.
pub const WORKSPACE_FILE: &str = "protomod.work.yaml";

/// Dependency lock file pinning external modules to commits.
pub const LOCK_FILE: &str = "protomod.lock";

/// Module documentation captured from the bucket root.
pub const DOCUMENTATION_FILE: &str = "protomod.md";

/// Extension of schema files, without the dot.
pub const DEFAULT_EXTENSION: &str = "proto";

/// Environment variable overriding the module cache directory.
pub const CACHE_DIR_ENV: &str = "PROTOMOD_CACHE_DIR";

/// Returns the default module cache directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/protomod` (XDG Base Directory)
/// - macOS: `~/Library/Caches/protomod`
/// - Windows: `{FOLDERID_LocalAppData}\protomod`
///
/// Falls back to `.protomod-cache` in the current directory if the platform
/// cache directory cannot be determined.
///
/// This can be overridden by the `--cache-dir` CLI flag or the
/// `PROTOMOD_CACHE_DIR` environment variable.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".protomod-cache"))
        .join("protomod")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_root_returns_path() {
        let cache_root = default_cache_root();
        assert!(cache_root.ends_with("protomod"));
    }

    #[test]
    fn test_default_cache_root_is_absolute_or_fallback() {
        let cache_root = default_cache_root();
        // Either absolute (normal case) or relative fallback
        assert!(
            cache_root.is_absolute() || cache_root.starts_with(".protomod-cache"),
            "Expected absolute path or fallback, got: {:?}",
            cache_root
        );
    }

    #[test]
    fn test_file_names_are_distinct() {
        let names = [MODULE_CONFIG_FILE, WORKSPACE_FILE, LOCK_FILE, DOCUMENTATION_FILE];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
