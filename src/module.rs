//! Built modules and the file records they hold.

use serde::Serialize;

use crate::config::ModuleIdentity;
use crate::path::NormalizedPath;

/// One schema file of a module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileInfo {
    /// Path relative to the root the file was found under.
    #[serde(serialize_with = "serialize_path")]
    pub module_path: NormalizedPath,
    /// Path shown to users.
    pub external_path: String,
    /// Whether the file is only present as a dependency of a target.
    pub is_import: bool,
}

fn serialize_path<S: serde::Serializer>(
    path: &NormalizedPath,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(path.as_str())
}

impl FileInfo {
    pub fn new(module_path: NormalizedPath, external_path: impl Into<String>) -> Self {
        Self {
            module_path,
            external_path: external_path.into(),
            is_import: false,
        }
    }

    /// This file, flagged as an import.
    pub fn as_import(&self) -> Self {
        Self {
            is_import: true,
            ..self.clone()
        }
    }
}

/// An immutable set of schema files.
///
/// Built by [`crate::module_builder::ModuleBucketBuilder`]. The file list is
/// computed once and sorted by module path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    files: Vec<FileInfo>,
    targets: Option<Vec<FileInfo>>,
    documentation: Option<String>,
    identity: Option<ModuleIdentity>,
    dependencies: Vec<ModuleIdentity>,
}

impl Module {
    pub(crate) fn new(
        files: Vec<FileInfo>,
        targets: Option<Vec<FileInfo>>,
        documentation: Option<String>,
        identity: Option<ModuleIdentity>,
        dependencies: Vec<ModuleIdentity>,
    ) -> Self {
        Self {
            files,
            targets,
            documentation,
            identity,
            dependencies,
        }
    }

    /// Every file of the module, sorted by module path.
    pub fn source_file_infos(&self) -> &[FileInfo] {
        &self.files
    }

    /// The requested target subset, or every file when none was requested.
    pub fn target_file_infos(&self) -> &[FileInfo] {
        self.targets.as_deref().unwrap_or(&self.files)
    }

    /// Whether the module was built with explicit target paths.
    pub fn has_target_paths(&self) -> bool {
        self.targets.is_some()
    }

    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    pub fn identity(&self) -> Option<&ModuleIdentity> {
        self.identity.as_ref()
    }

    /// Declared dependencies, in declaration order.
    pub fn dependencies(&self) -> &[ModuleIdentity] {
        &self.dependencies
    }

    /// Display name: the identity if the module has one.
    pub fn display_name(&self) -> String {
        match &self.identity {
            Some(identity) => identity.to_string(),
            None => "<unnamed>".to_string(),
        }
    }
}
