//! # Workspaces
//!
//! A workspace is a set of member modules listed in `protomod.work.yaml`,
//! closed over their dependencies. [`WorkspaceBuilder`] builds every member,
//! resolves dependencies, and validates the whole before returning:
//!
//! - member directories do not nest (checked by [`WorkspaceConfig`]);
//! - the requested input does not partially overlap a member;
//! - no two modules in the closure share a module path;
//! - the dependency graph is acyclic.
//!
//! All-or-nothing: any violation fails the whole build.

mod resolve;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::cache::{MemoryModuleCache, ModuleCache};
use crate::config::{lock, module, workspace, LockFile, TargetSelection, WorkspaceConfig};
use crate::error::{Duplicate, Error, Result};
use crate::input::OpenedInput;
use crate::module::{FileInfo, Module};
use crate::module_builder::ModuleBucketBuilder;
use crate::path::NormalizedPath;
use crate::storage::{ReadBucket, SubBucket};
use resolve::Resolver;

/// A validated, dependency-closed set of modules.
#[derive(Debug, Clone)]
pub struct Workspace {
    modules: Vec<Module>,
    targets: Vec<usize>,
}

impl Workspace {
    /// Every module, dependencies before dependents.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// The modules the build was asked for.
    pub fn target_modules(&self) -> Vec<&Module> {
        self.targets.iter().map(|index| &self.modules[*index]).collect()
    }

    /// Target files of the target modules, sorted by module path.
    pub fn all_file_infos(&self) -> Vec<FileInfo> {
        let mut files: Vec<FileInfo> = self
            .target_modules()
            .into_iter()
            .flat_map(|module| module.target_file_infos().iter().cloned())
            .collect();
        files.sort();
        files
    }

    /// Files of the other modules, flagged as imports and sorted.
    pub fn import_file_infos(&self) -> Vec<FileInfo> {
        let mut files: Vec<FileInfo> = self
            .modules
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.targets.contains(index))
            .flat_map(|(_, module)| module.source_file_infos().iter().map(FileInfo::as_import))
            .collect();
        files.sort();
        files
    }
}

/// Builds workspaces from buckets.
#[derive(Clone)]
pub struct WorkspaceBuilder {
    module_builder: ModuleBucketBuilder,
    cache: Arc<dyn ModuleCache>,
}

impl Default for WorkspaceBuilder {
    fn default() -> Self {
        Self {
            module_builder: ModuleBucketBuilder::new(),
            cache: Arc::new(MemoryModuleCache::new()),
        }
    }
}

impl WorkspaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module_builder(mut self, module_builder: ModuleBucketBuilder) -> Self {
        self.module_builder = module_builder;
        self
    }

    /// Serves external dependencies from `cache`.
    pub fn with_cache(mut self, cache: impl ModuleCache + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Builds the workspace described by `config` over `bucket`, which is
    /// rooted at the workspace directory.
    ///
    /// `target` is the requested directory relative to the workspace root.
    /// `target_paths` are relative to the workspace root as well.
    pub fn build(
        &self,
        bucket: &dyn ReadBucket,
        config: &WorkspaceConfig,
        target: &NormalizedPath,
        target_paths: Option<&[NormalizedPath]>,
    ) -> Result<Workspace> {
        let selected: Vec<usize> = match config.select(target)? {
            TargetSelection::All => (0..config.directories().len()).collect(),
            TargetSelection::Member(index) => vec![index],
            TargetSelection::Detached => {
                debug!("{} is not a workspace member, building it alone", target);
                return self.build_module(bucket, target, target_paths);
            }
        };

        let mut member_paths: BTreeMap<usize, Vec<NormalizedPath>> = BTreeMap::new();
        if let Some(paths) = target_paths {
            for path in paths {
                let (index, relative) = selected
                    .iter()
                    .find_map(|index| {
                        path.strip_prefix(&config.directories()[*index])
                            .map(|relative| (*index, relative))
                    })
                    .ok_or_else(|| Error::ExternalPath {
                        path: bucket.external_path(path),
                    })?;
                member_paths.entry(index).or_default().push(relative);
            }
        }
        let targets: Vec<usize> = match target_paths {
            Some(_) => member_paths.keys().copied().collect(),
            None => selected,
        };

        let members = config
            .directories()
            .par_iter()
            .enumerate()
            .map(|(index, dir)| {
                let paths = member_paths.get(&index).map(Vec::as_slice);
                self.build_member(bucket, config, dir, paths)
            })
            .collect::<Result<Vec<_>>>()?;

        let directories = config.directories();
        let labels = directories.iter().map(ToString::to_string).collect();
        self.assemble(members, targets, labels, |index| {
            lock::load(bucket, &directories[index])
        })
    }

    /// Builds a single-module workspace from the directory `dir` of
    /// `bucket`. `target_paths` are relative to the bucket root.
    pub fn build_module(
        &self,
        bucket: &dyn ReadBucket,
        dir: &NormalizedPath,
        target_paths: Option<&[NormalizedPath]>,
    ) -> Result<Workspace> {
        let relative = target_paths
            .map(|paths| {
                paths
                    .iter()
                    .map(|path| {
                        path.strip_prefix(dir).ok_or_else(|| Error::ExternalPath {
                            path: bucket.external_path(path),
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        let sub = SubBucket::new(bucket, dir.clone());
        let config = module::load(&sub, &NormalizedPath::root())?;
        let module = self
            .module_builder
            .build_for_bucket(&sub, &config, relative.as_deref())?;
        self.assemble(vec![module], vec![0], vec![dir.to_string()], |_| {
            lock::load(&sub, &NormalizedPath::root())
        })
    }

    /// Builds the workspace for an opened input.
    ///
    /// Looks for `protomod.work.yaml` from the input directory up to the
    /// bucket root; without one the input directory is a single module.
    /// `target_paths` are relative to the bucket root.
    pub fn build_for_input(
        &self,
        input: &OpenedInput,
        target_paths: Option<&[NormalizedPath]>,
    ) -> Result<Workspace> {
        let bucket = input.bucket();
        let mut candidate = Some(input.subdir().clone());
        while let Some(dir) = candidate {
            if let Some(config) = workspace::load(bucket, &dir)? {
                debug!("Using workspace {}", config.file());
                let target = input
                    .subdir()
                    .strip_prefix(&dir)
                    .unwrap_or_else(NormalizedPath::root);
                let relative = target_paths
                    .map(|paths| {
                        paths
                            .iter()
                            .map(|path| {
                                path.strip_prefix(&dir).ok_or_else(|| Error::ExternalPath {
                                    path: bucket.external_path(path),
                                })
                            })
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?;
                let sub = SubBucket::new(bucket, dir.clone());
                return self.build(&sub, &config, &target, relative.as_deref());
            }
            candidate = dir.parent();
        }
        self.build_module(bucket, input.subdir(), target_paths)
    }

    fn build_member(
        &self,
        bucket: &dyn ReadBucket,
        config: &WorkspaceConfig,
        dir: &NormalizedPath,
        target_paths: Option<&[NormalizedPath]>,
    ) -> Result<Module> {
        let sub = SubBucket::new(bucket, dir.clone());
        let module_config = module::load(&sub, &NormalizedPath::root())?;
        self.module_builder
            .build_for_bucket(&sub, &module_config, target_paths)
            .map_err(|e| match e {
                Error::NoFiles { extension, .. } => Error::NoFiles {
                    location: format!("module \"{}\" listed in {}", dir, config.file()),
                    extension,
                },
                other => other,
            })
    }

    /// Resolves dependencies and validates the closure.
    fn assemble<L>(
        &self,
        members: Vec<Module>,
        targets: Vec<usize>,
        labels: Vec<String>,
        load_lock: L,
    ) -> Result<Workspace>
    where
        L: FnMut(usize) -> Result<LockFile>,
    {
        let resolution = Resolver::new(&members, self.cache.as_ref(), load_lock)?
            .with_labels(labels)
            .resolve()?;

        let mut modules = Vec::with_capacity(resolution.order.len());
        let mut target_positions = Vec::new();
        for key in &resolution.order {
            if let resolve::NodeKey::Member(index) = key {
                if targets.contains(index) {
                    target_positions.push(modules.len());
                }
            }
            if let Some(module) = resolution.module(&members, key) {
                modules.push(module.clone());
            }
        }

        check_duplicates(&modules)?;
        debug!(
            "Built workspace with {} modules ({} targets)",
            modules.len(),
            target_positions.len()
        );
        Ok(Workspace {
            modules,
            targets: target_positions,
        })
    }
}

/// Collects every module path claimed by more than one module.
fn check_duplicates(modules: &[Module]) -> Result<()> {
    let mut claims: BTreeMap<&NormalizedPath, Vec<String>> = BTreeMap::new();
    for module in modules {
        for file in module.source_file_infos() {
            claims
                .entry(&file.module_path)
                .or_default()
                .push(file.external_path.clone());
        }
    }
    let duplicates: Vec<Duplicate> = claims
        .into_iter()
        .filter(|(_, external_paths)| external_paths.len() > 1)
        .map(|(path, external_paths)| Duplicate {
            path: path.to_string(),
            external_paths,
        })
        .collect();
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(Error::duplicates(duplicates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModuleIdentity, ModulePin};
    use crate::path::normalize_and_validate;
    use crate::storage::MemoryBucket;

    fn np(raw: &str) -> NormalizedPath {
        normalize_and_validate(raw).unwrap()
    }

    fn paths(files: &[FileInfo]) -> Vec<String> {
        files.iter().map(|info| info.module_path.to_string()).collect()
    }

    fn two_member_bucket() -> MemoryBucket {
        let bucket = MemoryBucket::new();
        bucket.add_file_string("proto/acme/a.proto", "").unwrap();
        bucket.add_file_string("other/proto/acme/b.proto", "").unwrap();
        bucket
    }

    fn two_member_config() -> WorkspaceConfig {
        WorkspaceConfig::new(["proto", "other/proto"], "protomod.work.yaml").unwrap()
    }

    #[test]
    fn test_build_all_members() {
        let workspace = WorkspaceBuilder::new()
            .build(&two_member_bucket(), &two_member_config(), &NormalizedPath::root(), None)
            .unwrap();
        assert_eq!(workspace.modules().len(), 2);
        assert_eq!(workspace.target_modules().len(), 2);
        assert_eq!(
            paths(&workspace.all_file_infos()),
            vec!["acme/a.proto", "acme/b.proto"]
        );
        assert!(workspace.import_file_infos().is_empty());
    }

    #[test]
    fn test_build_one_member_keeps_others_as_imports() {
        let workspace = WorkspaceBuilder::new()
            .build(&two_member_bucket(), &two_member_config(), &np("proto"), None)
            .unwrap();
        assert_eq!(paths(&workspace.all_file_infos()), vec!["acme/a.proto"]);
        let imports = workspace.import_file_infos();
        assert_eq!(paths(&imports), vec!["acme/b.proto"]);
        assert!(imports[0].is_import);
    }

    #[test]
    fn test_member_without_files() {
        let bucket = two_member_bucket();
        let config = WorkspaceConfig::new(["proto", "notexist"], "protomod.work.yaml").unwrap();
        let error = WorkspaceBuilder::new()
            .build(&bucket, &config, &NormalizedPath::root(), None)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "module \"notexist\" listed in protomod.work.yaml contains no .proto files"
        );
    }

    #[test]
    fn test_duplicates_across_members_are_all_reported() {
        let bucket = MemoryBucket::new();
        for member in ["a", "b"] {
            bucket.add_file_string(&format!("{}/foo.proto", member), "").unwrap();
            bucket.add_file_string(&format!("{}/bar.proto", member), "").unwrap();
        }
        let config = WorkspaceConfig::new(["b", "a"], "protomod.work.yaml").unwrap();
        let error = WorkspaceBuilder::new()
            .build(&bucket, &config, &NormalizedPath::root(), None)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "bar.proto exists in multiple locations: a/bar.proto b/bar.proto\n\
             foo.proto exists in multiple locations: a/foo.proto b/foo.proto"
        );
    }

    #[test]
    fn test_detached_target_builds_alone() {
        let bucket = two_member_bucket();
        bucket.add_file_string("detached/c.proto", "").unwrap();
        let workspace = WorkspaceBuilder::new()
            .build(&bucket, &two_member_config(), &np("detached"), None)
            .unwrap();
        assert_eq!(workspace.modules().len(), 1);
        assert_eq!(paths(&workspace.all_file_infos()), vec!["c.proto"]);
    }

    #[test]
    fn test_input_overlap_fails_before_building() {
        // No files at all: overlap must be reported, not a missing-files error.
        let bucket = MemoryBucket::new();
        let error = WorkspaceBuilder::new()
            .build(&bucket, &two_member_config(), &np("other"), None)
            .unwrap_err();
        assert!(matches!(error, Error::InputOverlap { .. }));
    }

    #[test]
    fn test_target_paths_are_distributed_to_members() {
        let bucket = two_member_bucket();
        bucket.add_file_string("proto/acme/z.proto", "").unwrap();
        let targets = [np("proto/acme/z.proto")];
        let workspace = WorkspaceBuilder::new()
            .build(&bucket, &two_member_config(), &NormalizedPath::root(), Some(&targets))
            .unwrap();
        assert_eq!(paths(&workspace.all_file_infos()), vec!["acme/z.proto"]);
        assert_eq!(
            paths(&workspace.import_file_infos()),
            vec!["acme/b.proto"]
        );
    }

    #[test]
    fn test_target_path_outside_members() {
        let bucket = two_member_bucket();
        bucket.add_file_string("elsewhere/x.proto", "").unwrap();
        let result = WorkspaceBuilder::new().build(
            &bucket,
            &two_member_config(),
            &NormalizedPath::root(),
            Some(&[np("elsewhere/x.proto")]),
        );
        assert!(matches!(result, Err(Error::ExternalPath { .. })));
    }

    #[test]
    fn test_members_depend_on_each_other() {
        let bucket = MemoryBucket::new();
        bucket.add_file_string("a/a.proto", "").unwrap();
        bucket
            .add_file_string(
                "a/protomod.yaml",
                "version: v1\nname: buf.build/acme/a\ndeps:\n  - buf.build/acme/b\n",
            )
            .unwrap();
        bucket.add_file_string("b/b.proto", "").unwrap();
        bucket
            .add_file_string("b/protomod.yaml", "version: v1\nname: buf.build/acme/b\n")
            .unwrap();
        let config = WorkspaceConfig::new(["a", "b"], "protomod.work.yaml").unwrap();

        let workspace = WorkspaceBuilder::new()
            .build(&bucket, &config, &np("a"), None)
            .unwrap();
        let order: Vec<_> = workspace.modules().iter().map(Module::display_name).collect();
        assert_eq!(order, vec!["buf.build/acme/b", "buf.build/acme/a"]);
        assert_eq!(workspace.target_modules()[0].display_name(), "buf.build/acme/a");
    }

    #[test]
    fn test_external_dependency_from_cache() {
        let bucket = MemoryBucket::new();
        bucket.add_file_string("a/a.proto", "").unwrap();
        bucket
            .add_file_string(
                "a/protomod.yaml",
                "version: v1\nname: buf.build/acme/a\ndeps:\n  - buf.build/acme/units\n",
            )
            .unwrap();
        bucket
            .add_file_string(
                "a/protomod.lock",
                "version: v1\ndeps:\n  - name: buf.build/acme/units\n    commit: abc\n",
            )
            .unwrap();

        let units_bucket = MemoryBucket::new();
        units_bucket.add_file_string("units.proto", "").unwrap();
        let units = ModuleBucketBuilder::new()
            .build_for_bucket(&units_bucket, &module::ModuleConfig::default(), None)
            .unwrap();
        let cache = MemoryModuleCache::new();
        cache
            .insert(
                ModulePin {
                    identity: ModuleIdentity::new("buf.build", "acme", "units"),
                    commit: "abc".to_string(),
                },
                units,
            )
            .unwrap();

        let config = WorkspaceConfig::new(["a"], "protomod.work.yaml").unwrap();
        let workspace = WorkspaceBuilder::new()
            .with_cache(cache)
            .build(&bucket, &config, &NormalizedPath::root(), None)
            .unwrap();
        assert_eq!(workspace.modules().len(), 2);
        assert_eq!(paths(&workspace.import_file_infos()), vec!["units.proto"]);
    }

    #[test]
    fn test_build_for_input_without_workspace() {
        let bucket = MemoryBucket::new();
        bucket.add_file_string("proto/a.proto", "").unwrap();
        let input = OpenedInput::new(Box::new(bucket), np("proto"));
        let workspace = WorkspaceBuilder::new().build_for_input(&input, None).unwrap();
        assert_eq!(paths(&workspace.all_file_infos()), vec!["a.proto"]);
    }

    #[test]
    fn test_build_for_input_finds_enclosing_workspace() {
        let bucket = MemoryBucket::new();
        bucket
            .add_file_string("ws/protomod.work.yaml", "version: v1\ndirectories:\n  - proto\n  - other\n")
            .unwrap();
        bucket.add_file_string("ws/proto/a.proto", "").unwrap();
        bucket.add_file_string("ws/other/b.proto", "").unwrap();
        let input = OpenedInput::new(Box::new(bucket), np("ws/proto"));
        let workspace = WorkspaceBuilder::new()
            .build_for_input(&input, Some(&[np("ws/proto/a.proto")]))
            .unwrap();
        assert_eq!(paths(&workspace.all_file_infos()), vec!["a.proto"]);
        assert_eq!(paths(&workspace.import_file_infos()), vec!["b.proto"]);
    }
}
