//! Dependency lock file (`protomod.lock`).
//!
//! Pins each external dependency of a module to one commit:
//!
//! ```yaml
//! version: v1
//! deps:
//!   - name: buf.build/acme/units
//!     commit: 6f3a1b2c
//! ```

use serde::Deserialize;

use super::{check_version, in_file, read_config_file, ModuleIdentity};
use crate::defaults::LOCK_FILE;
use crate::error::{Error, Result};
use crate::path::NormalizedPath;
use crate::storage::ReadBucket;

const SUPPORTED_VERSIONS: &[&str] = &["v1"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalLockDep {
    name: String,
    commit: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalLockV1 {
    version: Option<String>,
    #[serde(default)]
    deps: Vec<ExternalLockDep>,
}

/// An external module pinned to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePin {
    pub identity: ModuleIdentity,
    pub commit: String,
}

/// Pins read from a lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockFile {
    pins: Vec<ModulePin>,
}

impl LockFile {
    pub fn new(pins: Vec<ModulePin>) -> Self {
        Self { pins }
    }

    /// The pin for `identity`, if locked.
    pub fn pin(&self, identity: &ModuleIdentity) -> Option<&ModulePin> {
        self.pins.iter().find(|pin| &pin.identity == identity)
    }

    pub fn pins(&self) -> &[ModulePin] {
        &self.pins
    }
}

/// Parses lock file contents.
pub fn parse(contents: &str) -> Result<LockFile> {
    let external: ExternalLockV1 = serde_yaml::from_str(contents)?;
    check_version(external.version.as_deref(), SUPPORTED_VERSIONS)?;
    let mut pins = Vec::with_capacity(external.deps.len());
    for dep in external.deps {
        if dep.commit.trim().is_empty() {
            return Err(Error::config(format!("dependency {} has an empty commit", dep.name)));
        }
        let identity: ModuleIdentity = dep.name.parse()?;
        if pins.iter().any(|pin: &ModulePin| pin.identity == identity) {
            return Err(Error::config(format!("dependency {} is locked more than once", identity)));
        }
        pins.push(ModulePin {
            identity,
            commit: dep.commit,
        });
    }
    Ok(LockFile { pins })
}

/// Loads `dir/protomod.lock` from `bucket`; a missing file is an empty lock.
pub fn load(bucket: &dyn ReadBucket, dir: &NormalizedPath) -> Result<LockFile> {
    match read_config_file(bucket, dir, LOCK_FILE)? {
        Some(file) => parse(&file.contents).map_err(|e| in_file(&file.external_path, e)),
        None => Ok(LockFile::default()),
    }
}
