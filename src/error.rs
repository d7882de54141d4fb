//! # Error Handling
//!
//! This module defines the centralized error type for `protomod`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! mode of bucket access, module building, and workspace construction.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Structural variants (`Path`, `Overlap`,
//!   `InputOverlap`, `DuplicateFile`, `NoFiles`, `ExternalPath`, the symlink
//!   variants, `DependencyCycle`, `NotFound`, `NotADirectory`) carry the
//!   external paths and member names needed to render the message the user
//!   sees. `ConfigSyntax` keeps the line and column of a malformed
//!   configuration file so the binary can print it as a file annotation.
//!   Wrapped variants (`Io`, `Yaml`, `Json`) come from the libraries the
//!   crate sits on.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Every error is terminal for the current build. Nothing in this crate
//! retries.

use std::fmt;

use thiserror::Error;

/// Why a path string was rejected by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathErrorKind {
    /// The path was absolute.
    Absolute,
    /// Resolving `..` segments would leave the root.
    Escapes,
    /// The path could not be interpreted at all.
    Malformed,
}

/// How a build input overlaps a workspace member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapRelation {
    /// The input directory lives inside the member directory.
    ContainedBy,
    /// The input directory contains the member directory.
    Contains,
}

impl fmt::Display for OverlapRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapRelation::ContainedBy => f.write_str("is contained by"),
            OverlapRelation::Contains => f.write_str("contains"),
        }
    }
}

/// One module path claimed by more than one external file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duplicate {
    /// The module-relative path that collided.
    pub path: String,
    /// Every external path claiming it, sorted.
    pub external_paths: Vec<String>,
}

impl fmt::Display for Duplicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exists in multiple locations: {}",
            self.path,
            self.external_paths.join(" ")
        )
    }
}

fn path_reason(kind: PathErrorKind) -> &'static str {
    match kind {
        PathErrorKind::Absolute => "expected to be relative",
        PathErrorKind::Escapes => "is outside the context directory",
        PathErrorKind::Malformed => "is not a valid path",
    }
}

fn join_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Main error type for protomod operations
#[derive(Error, Debug)]
pub enum Error {
    /// A path string was absolute, escaped its root, or was malformed.
    #[error("{path}: {}", path_reason(*kind))]
    Path { path: String, kind: PathErrorKind },

    /// Two workspace members nest inside each other.
    #[error("module \"{outer}\" contains module \"{inner}\" in {workspace_file}")]
    Overlap {
        outer: String,
        inner: String,
        workspace_file: String,
    },

    /// The requested build input overlaps a workspace member.
    #[error("failed to build input \"{input}\" because it {relation} module \"{module}\" listed in {workspace_file}")]
    InputOverlap {
        input: String,
        module: String,
        relation: OverlapRelation,
        workspace_file: String,
    },

    /// One or more module paths are claimed by several external files.
    ///
    /// The list is sorted; a single module build reports exactly one entry,
    /// a workspace build reports all of them.
    #[error("{}", join_lines(.0))]
    DuplicateFile(Vec<Duplicate>),

    /// Filtering left no schema files.
    #[error("{location} contains no .{extension} files")]
    NoFiles { location: String, extension: String },

    /// An explicitly requested path matched no file of the module.
    #[error("{path}: does not match any file in the module")]
    ExternalPath { path: String },

    /// A symlink resolves to one of its own ancestors.
    #[error("{path}: symlink cycle detected")]
    SymlinkCycle { path: String },

    /// A symlink resolves outside the bucket root.
    #[error("{path}: symlink target {target} is outside the bucket root")]
    SymlinkEscape { path: String, target: String },

    /// A symlink that was requested explicitly points nowhere.
    #[error("{path}: broken symlink")]
    BrokenSymlink { path: String },

    /// A module depends on itself through some chain.
    #[error("dependency cycle detected: {cycle}")]
    DependencyCycle { cycle: String },

    /// A declared dependency is neither a workspace module nor available
    /// from the module cache.
    #[error("module {module} depends on {dependency}, which is not in the workspace{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    UnresolvedDependency {
        module: String,
        dependency: String,
        hint: Option<String>,
    },

    /// A requested object does not exist.
    #[error("{path}: does not exist")]
    NotFound { path: String },

    /// A directory input named a regular file.
    #[error("{path}: not a directory")]
    NotADirectory { path: String },

    /// A configuration file was invalid.
    ///
    /// Optionally carries a hint about how to fix it.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A configuration file failed to parse at a known position.
    #[error("{path}:{line}:{column}:{message}")]
    ConfigSyntax {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// Checking out a version-control reference failed.
    #[error("Git checkout error for {url}@{reference}: {message}")]
    Git {
        url: String,
        reference: String,
        message: String,
    },

    /// A git child process exited unsuccessfully.
    #[error("Git command failed for {url}: {command} - {stderr}")]
    GitCommand {
        command: String,
        url: String,
        stderr: String,
    },

    /// An archive could not be read or written.
    #[error("Archive error: {message}")]
    Archive { message: String },

    /// A blocking staging operation observed its cancellation signal.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// An error indicating that a lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn path(path: impl Into<String>, kind: PathErrorKind) -> Self {
        Error::Path {
            path: path.into(),
            kind,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Builds a duplicate-file error from unsorted findings.
    pub(crate) fn duplicates(mut duplicates: Vec<Duplicate>) -> Self {
        for duplicate in &mut duplicates {
            duplicate.external_paths.sort();
        }
        duplicates.sort();
        Error::DuplicateFile(duplicates)
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
