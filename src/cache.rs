//! Module cache collaborators.
//!
//! The workspace resolver asks a [`ModuleCache`] for external dependencies
//! pinned in a lock file. Fetching modules from a remote is out of scope;
//! the cache only serves what is already present.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::config::{module, ModulePin};
use crate::error::{Error, Result};
use crate::module::Module;
use crate::module_builder::ModuleBucketBuilder;
use crate::path::NormalizedPath;
use crate::storage::OsBucket;

/// Source of external modules by pin.
pub trait ModuleCache: Send + Sync {
    /// The module for `pin`, or `None` if the cache does not have it.
    fn get_module(&self, pin: &ModulePin) -> Result<Option<Module>>;
}

/// In-process cache of built modules
#[derive(Debug, Clone, Default)]
pub struct MemoryModuleCache {
    cache: Arc<Mutex<HashMap<ModulePin, Module>>>,
}

impl MemoryModuleCache {
    /// Create a new empty module cache
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ModulePin, Module>>> {
        self.cache.lock().map_err(|_| Error::LockPoisoned {
            context: "module cache".to_string(),
        })
    }

    /// Get a cached module, or compute and cache it if not present
    pub fn get_or_process<F>(&self, pin: &ModulePin, processor: F) -> Result<Option<Module>>
    where
        F: FnOnce() -> Result<Option<Module>>,
    {
        if let Some(cached) = self.lock()?.get(pin) {
            return Ok(Some(cached.clone()));
        }

        // Not held across the build so concurrent lookups of other pins proceed.
        let result = processor()?;
        if let Some(module) = &result {
            self.lock()?.insert(pin.clone(), module.clone());
        }
        Ok(result)
    }

    /// Manually insert a module into the cache
    pub fn insert(&self, pin: ModulePin, module: Module) -> Result<()> {
        self.lock()?.insert(pin, module);
        Ok(())
    }

    /// Get the number of cached modules
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Clear all cached modules
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

impl ModuleCache for MemoryModuleCache {
    fn get_module(&self, pin: &ModulePin) -> Result<Option<Module>> {
        Ok(self.lock()?.get(pin).cloned())
    }
}

/// Modules stored on disk as `<root>/<remote>/<owner>/<repository>/<commit>/`.
///
/// Each directory is built like any other module, with its own
/// `protomod.yaml` if it has one. Built modules are memoized.
#[derive(Debug, Clone)]
pub struct DirectoryModuleCache {
    root: PathBuf,
    builder: ModuleBucketBuilder,
    built: MemoryModuleCache,
}

impl DirectoryModuleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            builder: ModuleBucketBuilder::new(),
            built: MemoryModuleCache::new(),
        }
    }

    pub fn with_builder(mut self, builder: ModuleBucketBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `pin`. Fails if the commit is not a plain name.
    pub fn module_dir(&self, pin: &ModulePin) -> Result<PathBuf> {
        let commit = pin.commit.as_str();
        if commit.is_empty() || commit == "." || commit == ".." || commit.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "invalid commit \"{}\" for {}",
                commit, pin.identity
            )));
        }
        Ok(self
            .root
            .join(&pin.identity.remote)
            .join(&pin.identity.owner)
            .join(&pin.identity.repository)
            .join(commit))
    }

    fn load(&self, pin: &ModulePin) -> Result<Option<Module>> {
        let dir = self.module_dir(pin)?;
        if !dir.is_dir() {
            debug!("Cache miss for {}:{} at {}", pin.identity, pin.commit, dir.display());
            return Ok(None);
        }
        let bucket = OsBucket::new(&dir)?
            .with_external_root(format!("{}:{}", pin.identity, pin.commit));
        let config = module::load(&bucket, &NormalizedPath::root())?;
        if let Some(name) = config.name() {
            if name != &pin.identity {
                warn!(
                    "Cached module at {} is named {}, expected {}",
                    dir.display(),
                    name,
                    pin.identity
                );
            }
        }
        let dependencies = config.dependencies().to_vec();
        let config = config.with_identity(Some(pin.identity.clone()), dependencies);
        self.builder
            .build_for_bucket(&bucket, &config, None)
            .map(Some)
    }
}

impl ModuleCache for DirectoryModuleCache {
    fn get_module(&self, pin: &ModulePin) -> Result<Option<Module>> {
        self.built.get_or_process(pin, || self.load(pin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModuleConfig, ModuleIdentity};
    use crate::storage::MemoryBucket;
    use std::fs;
    use tempfile::TempDir;

    fn pin(repository: &str, commit: &str) -> ModulePin {
        ModulePin {
            identity: ModuleIdentity::new("buf.build", "acme", repository),
            commit: commit.to_string(),
        }
    }

    fn module_with(path: &str) -> Module {
        let bucket = MemoryBucket::new();
        bucket.add_file_string(path, "").unwrap();
        ModuleBucketBuilder::new()
            .build_for_bucket(&bucket, &ModuleConfig::default(), None)
            .unwrap()
    }

    #[test]
    fn test_memory_cache_operations() {
        let cache = MemoryModuleCache::new();
        let units = pin("units", "abc");

        assert!(cache.is_empty().unwrap());
        assert!(cache.get_module(&units).unwrap().is_none());

        cache.insert(units.clone(), module_with("units.proto")).unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.get_module(&units).unwrap().is_some());
        assert!(cache.get_module(&pin("units", "def")).unwrap().is_none());

        cache.clear().unwrap();
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_get_or_process_memoizes() {
        let cache = MemoryModuleCache::new();
        let units = pin("units", "abc");
        let calls = Arc::new(Mutex::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let module = cache
                .get_or_process(&units, || {
                    *calls.lock().unwrap() += 1;
                    Ok(Some(module_with("units.proto")))
                })
                .unwrap();
            assert!(module.is_some());
        }
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_directory_cache_hit_and_miss() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("buf.build/acme/units/abc");
        fs::create_dir_all(dir.join("acme/units")).unwrap();
        fs::write(dir.join("acme/units/units.proto"), "").unwrap();

        let cache = DirectoryModuleCache::new(temp.path());
        let module = cache.get_module(&pin("units", "abc")).unwrap().unwrap();
        assert_eq!(module.display_name(), "buf.build/acme/units");
        assert_eq!(
            module.source_file_infos()[0].external_path,
            "buf.build/acme/units:abc/acme/units/units.proto"
        );

        assert!(cache.get_module(&pin("units", "zzz")).unwrap().is_none());
    }

    #[test]
    fn test_directory_cache_rejects_path_like_commit() {
        let temp = TempDir::new().unwrap();
        let cache = DirectoryModuleCache::new(temp.path());
        assert!(cache.get_module(&pin("units", "../escape")).is_err());
        assert!(cache.get_module(&pin("units", "..")).is_err());
    }

    #[test]
    fn test_directory_cache_reads_module_config() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("buf.build/acme/weather/c1");
        fs::create_dir_all(dir.join("proto")).unwrap();
        fs::write(dir.join("proto/weather.proto"), "").unwrap();
        fs::write(
            dir.join("protomod.yaml"),
            "version: v1beta1\nname: buf.build/acme/weather\ndeps:\n  - buf.build/acme/units\nbuild:\n  roots:\n    - proto\n",
        )
        .unwrap();

        let module = DirectoryModuleCache::new(temp.path())
            .get_module(&pin("weather", "c1"))
            .unwrap()
            .unwrap();
        assert_eq!(module.source_file_infos()[0].module_path.as_str(), "weather.proto");
        assert_eq!(
            module.dependencies(),
            &[ModuleIdentity::new("buf.build", "acme", "units")]
        );
    }
}
