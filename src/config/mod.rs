//! # Configuration Files
//!
//! protomod reads three YAML files, all through `serde_yaml`:
//!
//! - [`module`]: `protomod.yaml`, version-tagged, translated into a
//!   [`ModuleConfig`] whatever its version.
//! - [`workspace`]: `protomod.work.yaml`, the list of member directories.
//! - [`lock`]: `protomod.lock`, commits pinned for external dependencies.
//!
//! Each file is optional at the level of this module; callers decide what a
//! missing file means. Parse errors name the external path of the file.

pub mod lock;
pub mod module;
pub mod workspace;

pub use lock::{LockFile, ModulePin};
pub use module::{ModuleConfig, ModuleIdentity};
pub use workspace::{TargetSelection, WorkspaceConfig};

use crate::error::{Error, Result};
use crate::path::NormalizedPath;
use crate::storage::ReadBucket;

/// A configuration file read from a bucket.
pub(crate) struct ConfigFile {
    pub contents: String,
    pub external_path: String,
}

/// Reads `dir/name` from `bucket` if it exists.
pub(crate) fn read_config_file(
    bucket: &dyn ReadBucket,
    dir: &NormalizedPath,
    name: &str,
) -> Result<Option<ConfigFile>> {
    let path = dir.join(&crate::path::normalize_and_validate(name)?);
    let contents = match bucket.read_if_exists(&path)? {
        Some(contents) => contents,
        None => return Ok(None),
    };
    let external_path = bucket.external_path(&path);
    let contents = String::from_utf8(contents).map_err(|_| {
        Error::config(format!("{}: file is not valid UTF-8", external_path))
    })?;
    Ok(Some(ConfigFile {
        contents,
        external_path,
    }))
}

/// Prefixes parse errors with the file they came from.
pub(crate) fn in_file(external_path: &str, error: Error) -> Error {
    match error {
        Error::Yaml(e) => match e.location() {
            Some(location) => {
                let message = e.to_string();
                let message = match message.split_once(" at line ") {
                    Some((head, _)) => head.to_string(),
                    None => message,
                };
                Error::ConfigSyntax {
                    path: external_path.to_string(),
                    line: location.line(),
                    column: location.column(),
                    message,
                }
            }
            None => Error::config(format!("{}: {}", external_path, e)),
        },
        Error::Config { message, hint } => Error::Config {
            message: format!("{}: {}", external_path, message),
            hint,
        },
        other => other,
    }
}

/// Checks a file's `version` key against the supported versions.
pub(crate) fn check_version(version: Option<&str>, supported: &[&str]) -> Result<()> {
    match version {
        Some(version) if supported.contains(&version) => Ok(()),
        Some(version) => Err(Error::Config {
            message: format!("unknown version \"{}\"", version),
            hint: Some(format!("supported versions: {}", supported.join(", "))),
        }),
        None => Err(Error::Config {
            message: "missing version".to_string(),
            hint: Some(format!("add `version: {}`", supported[0])),
        }),
    }
}
