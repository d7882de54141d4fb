//! Workspace descriptor (`protomod.work.yaml`).
//!
//! ```yaml
//! version: v1
//! directories:
//!   - proto
//!   - enterprise/proto
//! ```
//!
//! Member directories are validated as a set when the config is built: they
//! must be relative, stay inside the workspace, be unique, and not nest.

use serde::Deserialize;

use super::{check_version, in_file, read_config_file};
use crate::defaults::WORKSPACE_FILE;
use crate::error::{Error, OverlapRelation, Result};
use crate::path::{is_absolute, normalize_and_validate, NormalizedPath};
use crate::storage::ReadBucket;

const SUPPORTED_VERSIONS: &[&str] = &["v1"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalWorkspaceV1 {
    version: Option<String>,
    #[serde(default)]
    directories: Vec<String>,
}

/// Which members a build input selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// The input is the workspace root: every member is a target.
    All,
    /// The input is exactly one member, by index.
    Member(usize),
    /// The input is inside the workspace but unrelated to any member.
    Detached,
}

/// Validated member directories of a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    directories: Vec<NormalizedPath>,
    file: String,
}

impl WorkspaceConfig {
    /// Validates `directories` as declared in `file`.
    pub fn new<I>(directories: I, file: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let file = file.into();
        let mut normalized: Vec<NormalizedPath> = Vec::new();
        for raw in directories {
            let raw = raw.as_ref();
            if is_absolute(raw) {
                return Err(Error::config(format!(
                    "module \"{}\" listed in {} must be a relative path",
                    raw, file
                )));
            }
            let directory = normalize_and_validate(raw)?;
            if directory.is_root() {
                return Err(Error::config(format!(
                    "module \"{}\" listed in {} must not be the workspace root",
                    raw, file
                )));
            }
            if normalized.contains(&directory) {
                return Err(Error::config(format!(
                    "module \"{}\" is listed more than once in {}",
                    directory, file
                )));
            }
            normalized.push(directory);
        }
        if normalized.is_empty() {
            return Err(Error::config(format!("{} lists no directories", file)));
        }

        let mut sorted = normalized.clone();
        sorted.sort();
        for (i, outer) in sorted.iter().enumerate() {
            if let Some(inner) = sorted[i + 1..].iter().find(|inner| outer.contains(inner)) {
                return Err(Error::Overlap {
                    outer: outer.to_string(),
                    inner: inner.to_string(),
                    workspace_file: file,
                });
            }
        }

        Ok(Self {
            directories: normalized,
            file,
        })
    }

    /// Member directories in declaration order.
    pub fn directories(&self) -> &[NormalizedPath] {
        &self.directories
    }

    /// External path of the workspace file, for messages.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Classifies a workspace-relative input directory against the members.
    ///
    /// An input nested inside a member, or containing one, is an error.
    pub fn select(&self, target: &NormalizedPath) -> Result<TargetSelection> {
        if target.is_root() {
            return Ok(TargetSelection::All);
        }
        for (index, member) in self.directories.iter().enumerate() {
            if member == target {
                return Ok(TargetSelection::Member(index));
            }
            let relation = if member.contains(target) {
                OverlapRelation::ContainedBy
            } else if target.contains(member) {
                OverlapRelation::Contains
            } else {
                continue;
            };
            return Err(Error::InputOverlap {
                input: target.to_string(),
                module: member.to_string(),
                relation,
                workspace_file: self.file.clone(),
            });
        }
        Ok(TargetSelection::Detached)
    }
}

/// Parses workspace file contents; `file` names it in messages.
pub fn parse(contents: &str, file: &str) -> Result<WorkspaceConfig> {
    let external: ExternalWorkspaceV1 = serde_yaml::from_str(contents)?;
    check_version(external.version.as_deref(), SUPPORTED_VERSIONS)?;
    WorkspaceConfig::new(external.directories, file)
}

/// Loads `dir/protomod.work.yaml` from `bucket` if present.
pub fn load(bucket: &dyn ReadBucket, dir: &NormalizedPath) -> Result<Option<WorkspaceConfig>> {
    match read_config_file(bucket, dir, WORKSPACE_FILE)? {
        Some(file) => parse(&file.contents, &file.external_path)
            .map(Some)
            .map_err(|e| {
                let named = matches!(&e, Error::Config { message, .. } if message.contains(&file.external_path));
                if named {
                    e
                } else {
                    in_file(&file.external_path, e)
                }
            }),
        None => Ok(None),
    }
}
