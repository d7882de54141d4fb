//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `protomod` command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic, returning the exit code to report.
//!
//! Arguments shared by every command that reads an input live here in
//! [`InputArgs`].

pub mod build;
pub mod ls_files;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use protomod::cache::DirectoryModuleCache;
use protomod::input::{self, InputKind, InputRef, OpenedInput};
use protomod::path::{normalize_and_validate, NormalizedPath};
use protomod::storage::ArchiveFormat;
use protomod::workspace::{Workspace, WorkspaceBuilder};

/// Where to read schema files from.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Directory, archive file, or git repository to build.
    #[arg(value_name = "INPUT", default_value = ".")]
    pub input: String,

    /// Read INPUT as an archive of the given format (tar, targz).
    #[arg(long, value_name = "FORMAT", conflicts_with = "git_ref")]
    pub archive: Option<ArchiveFormat>,

    /// Number of leading path segments to drop from archive entries.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub strip_components: usize,

    /// Read INPUT as a git repository checked out at REF.
    #[arg(long, value_name = "REF")]
    pub git_ref: Option<String>,

    /// Directory inside INPUT to build.
    #[arg(long, value_name = "DIR")]
    pub subdir: Option<String>,

    /// Follow symlinks inside a directory input.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Limit the build to these files or directories, relative to the input.
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<String>,

    /// The directory relative inputs are resolved against.
    ///
    /// If not provided, it defaults to the current working directory.
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,
}

impl InputArgs {
    /// The parsed input reference. Archive inputs are recognized by their
    /// extension when `--archive` is not given.
    pub fn input_ref(&self) -> InputRef {
        let archive = match &self.git_ref {
            Some(_) => None,
            None => self.archive.or_else(|| ArchiveFormat::from_path(&self.input)),
        };
        let kind = match (archive, &self.git_ref) {
            (Some(format), _) => InputKind::Archive {
                format,
                strip_components: self.strip_components,
            },
            (None, Some(reference)) => InputKind::Git {
                reference: reference.clone(),
            },
            (None, None) => InputKind::Dir,
        };
        InputRef {
            kind,
            path: self.input.clone(),
            subdir: self.subdir.clone(),
            follow_symlinks: self.follow_symlinks,
        }
    }

    /// Opens the input.
    pub fn open(&self, cancel: &CancellationToken) -> Result<OpenedInput> {
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("failed to read the current directory")?,
        };
        Ok(input::open(&self.input_ref(), &working_dir, cancel)?)
    }

    /// `--path` values re-keyed to the bucket of `opened`.
    pub fn target_paths(&self, opened: &OpenedInput) -> Result<Option<Vec<NormalizedPath>>> {
        if self.paths.is_empty() {
            return Ok(None);
        }
        let paths = self
            .paths
            .iter()
            .map(|raw| Ok(opened.subdir().join(&normalize_and_validate(raw)?)))
            .collect::<protomod::error::Result<Vec<_>>>()?;
        Ok(Some(paths))
    }
}

/// Opens the input and builds its workspace.
pub fn build_workspace(args: &InputArgs, cache_dir: PathBuf) -> Result<Workspace> {
    let cancel = CancellationToken::new();
    let opened = args.open(&cancel)?;
    let target_paths = args.target_paths(&opened)?;
    let builder = WorkspaceBuilder::new().with_cache(DirectoryModuleCache::new(cache_dir));
    Ok(builder.build_for_input(&opened, target_paths.as_deref())?)
}
