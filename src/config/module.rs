//! Module configuration (`protomod.yaml`).
//!
//! The file is version-tagged. Each supported version has a translator that
//! turns its external shape into the one internal [`ModuleConfig`], so the
//! builder never sees version differences.
//!
//! ```yaml
//! version: v1beta1
//! name: buf.build/acme/weather
//! deps:
//!   - buf.build/acme/units
//! build:
//!   roots:
//!     - proto
//!   excludes:
//!     - proto/vendor
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{check_version, in_file, read_config_file};
use crate::defaults::MODULE_CONFIG_FILE;
use crate::error::{Error, Result};
use crate::path::{normalize_and_validate, NormalizedPath};
use crate::storage::ReadBucket;

/// A module name of the form `remote/owner/repository`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleIdentity {
    pub remote: String,
    pub owner: String,
    pub repository: String,
}

impl ModuleIdentity {
    pub fn new(
        remote: impl Into<String>,
        owner: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            remote: remote.into(),
            owner: owner.into(),
            repository: repository.into(),
        }
    }
}

impl FromStr for ModuleIdentity {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split('/').collect();
        match segments.as_slice() {
            [remote, owner, repository]
                if !remote.is_empty() && !owner.is_empty() && !repository.is_empty() =>
            {
                Ok(Self::new(*remote, *owner, *repository))
            }
            _ => Err(Error::Config {
                message: format!("invalid module name \"{}\"", raw),
                hint: Some("module names have the form remote/owner/repository".to_string()),
            }),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.remote, self.owner, self.repository)
    }
}

/// The validated build configuration of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Sorted, pairwise non-overlapping roots.
    roots: Vec<NormalizedPath>,
    /// Root-relative excludes per root.
    excludes: BTreeMap<NormalizedPath, Vec<NormalizedPath>>,
    name: Option<ModuleIdentity>,
    dependencies: Vec<ModuleIdentity>,
}

impl Default for ModuleConfig {
    /// A single root at the bucket root and no excludes.
    fn default() -> Self {
        Self {
            roots: vec![NormalizedPath::root()],
            excludes: BTreeMap::new(),
            name: None,
            dependencies: Vec::new(),
        }
    }
}

impl ModuleConfig {
    /// Builds a config from bucket-relative roots and excludes.
    ///
    /// No roots means the single root `.`. Roots must not overlap. Each
    /// exclude must lie strictly inside exactly one root.
    pub fn new<R, E>(roots: R, excludes: E) -> Result<Self>
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let mut normalized_roots = roots
            .into_iter()
            .map(|root| normalize_and_validate(root.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if normalized_roots.is_empty() {
            normalized_roots.push(NormalizedPath::root());
        }
        normalized_roots.sort();
        for (i, root) in normalized_roots.iter().enumerate() {
            for other in &normalized_roots[i + 1..] {
                if root == other {
                    return Err(Error::config(format!("duplicate root \"{}\"", root)));
                }
                if root.contains(other) || other.contains(root) {
                    return Err(Error::config(format!(
                        "roots \"{}\" and \"{}\" overlap",
                        root, other
                    )));
                }
            }
        }

        let mut root_excludes: BTreeMap<NormalizedPath, Vec<NormalizedPath>> = BTreeMap::new();
        for exclude in excludes {
            let exclude = normalize_and_validate(exclude.as_ref())?;
            let root = normalized_roots
                .iter()
                .find(|root| root.contains(&exclude))
                .ok_or_else(|| {
                    Error::config(format!(
                        "excluded path \"{}\" is not contained in any root",
                        exclude
                    ))
                })?;
            if *root == exclude {
                return Err(Error::config(format!(
                    "excluded path \"{}\" is equal to root \"{}\"",
                    exclude, root
                )));
            }
            if let Some(relative) = exclude.strip_prefix(root) {
                root_excludes.entry(root.clone()).or_default().push(relative);
            }
        }
        for excludes in root_excludes.values_mut() {
            excludes.sort();
            excludes.dedup();
        }

        Ok(Self {
            roots: normalized_roots,
            excludes: root_excludes,
            name: None,
            dependencies: Vec::new(),
        })
    }

    /// Attaches the module name and declared dependencies.
    pub fn with_identity(
        mut self,
        name: Option<ModuleIdentity>,
        dependencies: Vec<ModuleIdentity>,
    ) -> Self {
        self.name = name;
        self.dependencies = dependencies;
        self
    }

    pub fn roots(&self) -> &[NormalizedPath] {
        &self.roots
    }

    /// Root-relative excludes of `root`.
    pub fn excludes(&self, root: &NormalizedPath) -> &[NormalizedPath] {
        self.excludes.get(root).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a root-relative module path falls under an exclude of `root`.
    pub fn is_excluded(&self, root: &NormalizedPath, module_path: &NormalizedPath) -> bool {
        self.excludes(root)
            .iter()
            .any(|exclude| exclude.contains(module_path))
    }

    pub fn name(&self) -> Option<&ModuleIdentity> {
        self.name.as_ref()
    }

    pub fn dependencies(&self) -> &[ModuleIdentity] {
        &self.dependencies
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct BuildV1Beta1 {
    #[serde(default)]
    roots: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ExternalConfigV1Beta1 {
    version: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    build: BuildV1Beta1,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct BuildV1 {
    #[serde(default)]
    excludes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ExternalConfigV1 {
    version: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    build: BuildV1,
}

type Translator = fn(&str) -> Result<ModuleConfig>;

/// Supported versions, newest first.
const TRANSLATORS: &[(&str, Translator)] = &[("v1", translate_v1), ("v1beta1", translate_v1beta1)];

fn identity(name: Option<String>, deps: Vec<String>) -> Result<(Option<ModuleIdentity>, Vec<ModuleIdentity>)> {
    let name = name.map(|name| name.parse()).transpose()?;
    let deps = deps
        .iter()
        .map(|dep| dep.parse())
        .collect::<Result<Vec<ModuleIdentity>>>()?;
    Ok((name, deps))
}

fn translate_v1beta1(contents: &str) -> Result<ModuleConfig> {
    let external: ExternalConfigV1Beta1 = serde_yaml::from_str(contents)?;
    let (name, deps) = identity(external.name, external.deps)?;
    Ok(ModuleConfig::new(external.build.roots, external.build.excludes)?.with_identity(name, deps))
}

fn translate_v1(contents: &str) -> Result<ModuleConfig> {
    let external: ExternalConfigV1 = serde_yaml::from_str(contents)?;
    let (name, deps) = identity(external.name, external.deps)?;
    Ok(ModuleConfig::new([".".to_string()], external.build.excludes)?.with_identity(name, deps))
}

/// Parses the contents of a module configuration file.
pub fn parse(contents: &str) -> Result<ModuleConfig> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
    let version = value.get("version").and_then(serde_yaml::Value::as_str);
    let supported: Vec<&str> = TRANSLATORS.iter().map(|(version, _)| *version).collect();
    check_version(version, &supported)?;
    let translate = TRANSLATORS
        .iter()
        .find(|(known, _)| Some(*known) == version)
        .map(|(_, translate)| *translate)
        .ok_or_else(|| Error::config("unsupported version"))?;
    translate(contents)
}

/// Loads `dir/protomod.yaml` from `bucket`, or the default config if absent.
pub fn load(bucket: &dyn ReadBucket, dir: &NormalizedPath) -> Result<ModuleConfig> {
    match read_config_file(bucket, dir, MODULE_CONFIG_FILE)? {
        Some(file) => parse(&file.contents).map_err(|e| in_file(&file.external_path, e)),
        None => Ok(ModuleConfig::default()),
    }
}
