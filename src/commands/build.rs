//! # Build Command Implementation
//!
//! Builds the workspace for an input and reports nothing on success. Every
//! structural problem (overlapping members, duplicate files, dependency
//! cycles, unresolved dependencies) fails the command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use log::info;

use super::{build_workspace, InputArgs};
use protomod::diagnostics::ExitCode;

/// Build and validate the workspace of an input
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Execute the `build` command.
pub fn execute(args: BuildArgs, cache_dir: PathBuf) -> Result<ExitCode> {
    let workspace = build_workspace(&args.input, cache_dir)?;
    info!(
        "Built {} modules with {} target files",
        workspace.modules().len(),
        workspace.all_file_infos().len()
    );
    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(input: &str, working_dir: &std::path::Path) -> BuildArgs {
        BuildArgs {
            input: InputArgs {
                input: input.to_string(),
                archive: None,
                strip_components: 0,
                git_ref: None,
                subdir: None,
                follow_symlinks: false,
                paths: vec![],
                working_dir: Some(working_dir.to_path_buf()),
            },
        }
    }

    #[test]
    fn test_execute_builds_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("proto")).unwrap();
        fs::write(temp.path().join("proto/a.proto"), "").unwrap();

        let code = execute(args("proto", temp.path()), temp.path().join("cache")).unwrap();
        assert_eq!(code, ExitCode::Success);
    }

    #[test]
    fn test_execute_reports_missing_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("empty")).unwrap();

        let error = execute(args("empty", temp.path()), temp.path().join("cache")).unwrap_err();
        assert!(error.to_string().contains("contains no .proto files"));
    }
}
