//! # Ls-Files Command Implementation
//!
//! Lists the target files of an input's workspace by external path, sorted.
//! Files of modules that are only dependencies are listed with
//! `--include-imports`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};

use super::{build_workspace, InputArgs};
use protomod::diagnostics::ExitCode;
use protomod::module::FileInfo;
use protomod::workspace::Workspace;

/// List the files of an input
#[derive(Args, Debug)]
pub struct LsFilesArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Also list files of modules the targets depend on.
    #[arg(long)]
    pub include_imports: bool,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    pub format: ListFormat,
}

/// Output formats for file listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ListFormat {
    /// One external path per line
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Execute the `ls-files` command.
pub fn execute(args: LsFilesArgs, cache_dir: PathBuf) -> Result<ExitCode> {
    let workspace = build_workspace(&args.input, cache_dir)?;
    for line in render(&workspace, args.include_imports, args.format)? {
        println!("{}", line);
    }
    Ok(ExitCode::Success)
}

fn render(workspace: &Workspace, include_imports: bool, format: ListFormat) -> Result<Vec<String>> {
    let mut files: Vec<FileInfo> = workspace.all_file_infos();
    if include_imports {
        files.extend(workspace.import_file_infos());
    }
    files.sort_by(|a, b| a.external_path.cmp(&b.external_path));

    let lines = match format {
        ListFormat::Text => files.into_iter().map(|file| file.external_path).collect(),
        ListFormat::Json => files
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomod::config::WorkspaceConfig;
    use protomod::storage::MemoryBucket;
    use protomod::workspace::WorkspaceBuilder;

    fn workspace(target: &str) -> Workspace {
        let bucket = MemoryBucket::new().with_external_root("dir");
        bucket.add_file_string("proto/rpc.proto", "").unwrap();
        bucket.add_file_string("other/proto/request.proto", "").unwrap();
        let config = WorkspaceConfig::new(["proto", "other/proto"], "dir/protomod.work.yaml").unwrap();
        let target = protomod::path::normalize_and_validate(target).unwrap();
        WorkspaceBuilder::new()
            .build(&bucket, &config, &target, None)
            .unwrap()
    }

    #[test]
    fn test_render_text_sorted_by_external_path() {
        let lines = render(&workspace("."), false, ListFormat::Text).unwrap();
        assert_eq!(
            lines,
            vec!["dir/other/proto/request.proto", "dir/proto/rpc.proto"]
        );
    }

    #[test]
    fn test_render_with_imports() {
        let only_targets = render(&workspace("proto"), false, ListFormat::Text).unwrap();
        assert_eq!(only_targets, vec!["dir/proto/rpc.proto"]);

        let with_imports = render(&workspace("proto"), true, ListFormat::Text).unwrap();
        assert_eq!(
            with_imports,
            vec!["dir/other/proto/request.proto", "dir/proto/rpc.proto"]
        );
    }

    #[test]
    fn test_render_json() {
        let lines = render(&workspace("proto"), true, ListFormat::Json).unwrap();
        assert_eq!(
            lines[0],
            r#"{"module_path":"request.proto","external_path":"dir/other/proto/request.proto","is_import":true}"#
        );
    }
}
