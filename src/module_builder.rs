//! # Module Builder
//!
//! Turns a bucket and a [`ModuleConfig`] into a [`Module`]:
//!
//! 1. Walk each root (roots run in parallel on the `rayon` pool).
//! 2. Keep files with the schema extension that no exclude covers; their
//!    module path is the bucket path minus the root.
//! 3. Merge serially. Two files with the same module path are an error.
//! 4. Sort by module path. Nothing left is an error.
//! 5. Resolve explicit target paths, if any, against the result.
//! 6. Capture `protomod.md` at the bucket root as documentation.
//!
//! Building is fail-fast: the first violation is returned and no partial
//! module is produced.

use std::collections::BTreeMap;

use log::debug;
use rayon::prelude::*;

use crate::config::ModuleConfig;
use crate::defaults::{DEFAULT_EXTENSION, DOCUMENTATION_FILE};
use crate::error::{Duplicate, Error, Result};
use crate::module::{FileInfo, Module};
use crate::path::{normalize_and_validate, NormalizedPath};
use crate::storage::ReadBucket;

/// A file found under a root, keyed both ways.
#[derive(Debug, Clone)]
struct Found {
    bucket_path: NormalizedPath,
    info: FileInfo,
}

/// Builds modules from buckets.
#[derive(Debug, Clone)]
pub struct ModuleBucketBuilder {
    extension: String,
}

impl Default for ModuleBucketBuilder {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl ModuleBucketBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes files with `extension` (no dot) instead of `proto`.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Builds the module for `bucket`.
    ///
    /// `target_paths` are bucket-relative. Each must name a file of the
    /// module, or a directory holding some; the matched files become the
    /// module's target subset.
    pub fn build_for_bucket(
        &self,
        bucket: &dyn ReadBucket,
        config: &ModuleConfig,
        target_paths: Option<&[NormalizedPath]>,
    ) -> Result<Module> {
        let per_root = config
            .roots()
            .par_iter()
            .map(|root| self.collect_root(bucket, config, root))
            .collect::<Result<Vec<_>>>()?;

        let mut by_module_path: BTreeMap<NormalizedPath, Found> = BTreeMap::new();
        for found in per_root.into_iter().flatten() {
            if let Some(existing) = by_module_path.get(&found.info.module_path) {
                return Err(Error::duplicates(vec![Duplicate {
                    path: found.info.module_path.to_string(),
                    external_paths: vec![
                        existing.info.external_path.clone(),
                        found.info.external_path.clone(),
                    ],
                }]));
            }
            by_module_path.insert(found.info.module_path.clone(), found);
        }

        if by_module_path.is_empty() {
            return Err(Error::NoFiles {
                location: bucket.external_path(&NormalizedPath::root()),
                extension: self.extension.clone(),
            });
        }

        let targets = match target_paths {
            Some(paths) => Some(resolve_targets(bucket, &by_module_path, paths)?),
            None => None,
        };
        let files: Vec<FileInfo> = by_module_path.into_values().map(|found| found.info).collect();
        let documentation = read_documentation(bucket)?;
        debug!(
            "Built module {} with {} files",
            bucket.external_path(&NormalizedPath::root()),
            files.len()
        );

        Ok(Module::new(
            files,
            targets,
            documentation,
            config.name().cloned(),
            config.dependencies().to_vec(),
        ))
    }

    fn collect_root(
        &self,
        bucket: &dyn ReadBucket,
        config: &ModuleConfig,
        root: &NormalizedPath,
    ) -> Result<Vec<Found>> {
        let mut found = Vec::new();
        for object in bucket.walk(root) {
            let object = object?;
            if object.path.extension() != Some(self.extension.as_str()) {
                continue;
            }
            let module_path = match object.path.strip_prefix(root) {
                Some(module_path) => module_path,
                None => continue,
            };
            if config.is_excluded(root, &module_path) {
                continue;
            }
            found.push(Found {
                bucket_path: object.path,
                info: FileInfo::new(module_path, object.external_path),
            });
        }
        Ok(found)
    }
}

fn resolve_targets(
    bucket: &dyn ReadBucket,
    by_module_path: &BTreeMap<NormalizedPath, Found>,
    paths: &[NormalizedPath],
) -> Result<Vec<FileInfo>> {
    let mut targets: BTreeMap<NormalizedPath, FileInfo> = BTreeMap::new();
    for path in paths {
        let mut matched = false;
        for found in by_module_path.values() {
            if path.contains(&found.bucket_path) {
                targets.insert(found.info.module_path.clone(), found.info.clone());
                matched = true;
            }
        }
        if matched {
            continue;
        }
        return match bucket.stat(path) {
            Err(e @ Error::BrokenSymlink { .. }) => Err(e),
            _ => Err(Error::ExternalPath {
                path: bucket.external_path(path),
            }),
        };
    }
    Ok(targets.into_values().collect())
}

fn read_documentation(bucket: &dyn ReadBucket) -> Result<Option<String>> {
    let path = normalize_and_validate(DOCUMENTATION_FILE)?;
    Ok(bucket
        .read_if_exists(&path)?
        .map(|contents| String::from_utf8_lossy(&contents).into_owned()))
}
