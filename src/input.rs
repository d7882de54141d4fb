//! Opening build inputs.
//!
//! An [`InputRef`] names a directory, an archive file or a git repository.
//! [`open`] turns it into an [`OpenedInput`]: a bucket plus the
//! sub-directory of that bucket the user asked for.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::defaults::WORKSPACE_FILE;
use crate::error::{Error, Result};
use crate::path::{clean, normalize_and_validate, NormalizedPath};
use crate::storage::{archive, git, ArchiveFormat, OsBucket, ReadBucket};

/// What kind of source an input is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// A directory on disk.
    Dir,
    /// A tarball, optionally dropping leading path segments of each entry.
    Archive {
        format: ArchiveFormat,
        strip_components: usize,
    },
    /// A git repository checked out at `reference`.
    Git { reference: String },
}

/// A parsed build input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRef {
    pub kind: InputKind,
    /// Path or URL as the user wrote it.
    pub path: String,
    /// Directory inside the input to build, if not its root.
    pub subdir: Option<String>,
    /// Follow symlinks when reading a directory input.
    pub follow_symlinks: bool,
}

impl InputRef {
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Dir,
            path: path.into(),
            subdir: None,
            follow_symlinks: false,
        }
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = Some(subdir.into());
        self
    }
}

/// An input ready to build.
pub struct OpenedInput {
    bucket: Box<dyn ReadBucket>,
    subdir: NormalizedPath,
}

impl OpenedInput {
    pub fn new(bucket: Box<dyn ReadBucket>, subdir: NormalizedPath) -> Self {
        Self { bucket, subdir }
    }

    pub fn bucket(&self) -> &dyn ReadBucket {
        self.bucket.as_ref()
    }

    /// The requested directory, relative to the bucket root.
    pub fn subdir(&self) -> &NormalizedPath {
        &self.subdir
    }
}

/// Opens `input`, resolving relative paths against `working_dir`.
pub fn open(input: &InputRef, working_dir: &Path, cancel: &CancellationToken) -> Result<OpenedInput> {
    match &input.kind {
        InputKind::Dir => open_dir(input, working_dir),
        InputKind::Archive {
            format,
            strip_components,
        } => {
            let file = File::open(working_dir.join(&input.path)).map_err(|e| {
                not_found_or(e, &input.path)
            })?;
            let bucket = archive::unpack(file, *format, *strip_components, cancel)?
                .with_external_root(input.path.clone());
            Ok(OpenedInput::new(Box::new(bucket), subdir(input)?))
        }
        InputKind::Git { reference } => {
            let url = git_url(&input.path, working_dir);
            let bucket = git::checkout(&url, reference, cancel)?;
            Ok(OpenedInput::new(Box::new(bucket), subdir(input)?))
        }
    }
}

fn subdir(input: &InputRef) -> Result<NormalizedPath> {
    match &input.subdir {
        Some(subdir) => normalize_and_validate(subdir),
        None => Ok(NormalizedPath::root()),
    }
}

/// Opens a directory input.
///
/// If a directory at or above the input holds a workspace file, the bucket
/// is rooted there and the input becomes a sub-directory of it. External
/// paths stay relative to what the user typed.
fn open_dir(input: &InputRef, working_dir: &Path) -> Result<OpenedInput> {
    let display = match &input.subdir {
        Some(subdir) => clean(&format!("{}/{}", input.path, subdir)),
        None => clean(&input.path),
    };
    let dir = working_dir.join(&display);
    let metadata = fs::metadata(&dir).map_err(|e| not_found_or(e, &display))?;
    if !metadata.is_dir() {
        return Err(Error::NotADirectory { path: display });
    }
    let dir = fs::canonicalize(&dir)?;

    let (root, depth) = find_workspace_root(&dir);
    let external_root = clean(&format!("{}{}", display, "/..".repeat(depth)));
    let subdir = trailing_components(&dir, depth)?;
    debug!(
        "Opened directory input {} (bucket root {}, subdir {})",
        display, external_root, subdir
    );
    let bucket = OsBucket::new(&root)?
        .with_external_root(external_root)
        .with_symlinks(input.follow_symlinks);
    Ok(OpenedInput::new(Box::new(bucket), subdir))
}

/// The nearest directory at or above `dir` holding a workspace file, and how
/// many levels up it is. `dir` itself when there is none.
fn find_workspace_root(dir: &Path) -> (PathBuf, usize) {
    for (depth, ancestor) in dir.ancestors().enumerate() {
        if ancestor.join(WORKSPACE_FILE).is_file() {
            debug!("Found {} in {}", WORKSPACE_FILE, ancestor.display());
            return (ancestor.to_path_buf(), depth);
        }
    }
    (dir.to_path_buf(), 0)
}

fn trailing_components(dir: &Path, depth: usize) -> Result<NormalizedPath> {
    let names: Vec<String> = dir
        .components()
        .rev()
        .take(depth)
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    let joined: Vec<&str> = names.iter().rev().map(String::as_str).collect();
    normalize_and_validate(&joined.join("/"))
}

fn git_url(path: &str, working_dir: &Path) -> String {
    if path.contains("://") || path.contains('@') {
        return path.to_string();
    }
    working_dir.join(path).display().to_string()
}

fn not_found_or(error: io::Error, path: &str) -> Error {
    match error.kind() {
        io::ErrorKind::NotFound => Error::NotFound {
            path: path.to_string(),
        },
        _ => Error::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBucket;
    use tempfile::TempDir;

    fn external_paths(opened: &OpenedInput) -> Vec<String> {
        let mut paths: Vec<String> = opened
            .bucket()
            .walk(&NormalizedPath::root())
            .map(|info| info.unwrap().external_path)
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_open_plain_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("proto/acme")).unwrap();
        fs::write(temp.path().join("proto/acme/a.proto"), "").unwrap();

        let opened = open(&InputRef::dir("proto"), temp.path(), &CancellationToken::new()).unwrap();
        assert!(opened.subdir().is_root());
        assert_eq!(external_paths(&opened), vec!["proto/acme/a.proto"]);
    }

    #[test]
    fn test_open_directory_inside_workspace() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("ws/proto")).unwrap();
        fs::write(temp.path().join("ws/proto/a.proto"), "").unwrap();
        fs::write(
            temp.path().join("ws").join(WORKSPACE_FILE),
            "version: v1\ndirectories:\n  - proto\n",
        )
        .unwrap();

        let opened = open(
            &InputRef::dir("ws").with_subdir("proto"),
            temp.path(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(opened.subdir().as_str(), "proto");
        assert!(external_paths(&opened).contains(&"ws/proto/a.proto".to_string()));
    }

    #[test]
    fn test_open_current_directory_inside_workspace() {
        let temp = TempDir::new().unwrap();
        let member = temp.path().join("proto");
        fs::create_dir_all(&member).unwrap();
        fs::write(member.join("a.proto"), "").unwrap();
        fs::write(
            temp.path().join(WORKSPACE_FILE),
            "version: v1\ndirectories:\n  - proto\n",
        )
        .unwrap();

        let opened = open(&InputRef::dir("."), &member, &CancellationToken::new()).unwrap();
        assert_eq!(opened.subdir().as_str(), "proto");
        assert!(external_paths(&opened).contains(&"../proto/a.proto".to_string()));
    }

    #[test]
    fn test_open_regular_file_is_not_a_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("rpc.proto"), "").unwrap();
        let error = open(&InputRef::dir("rpc.proto"), temp.path(), &CancellationToken::new())
            .err()
            .unwrap();
        assert_eq!(error.to_string(), "rpc.proto: not a directory");
    }

    #[test]
    fn test_open_missing_directory() {
        let temp = TempDir::new().unwrap();
        let error = open(&InputRef::dir("missing"), temp.path(), &CancellationToken::new())
            .err()
            .unwrap();
        assert!(matches!(error, Error::NotFound { path } if path == "missing"));
    }

    #[test]
    fn test_open_archive() {
        let temp = TempDir::new().unwrap();
        let source = MemoryBucket::new();
        source.add_file_string("repo/proto/a.proto", "syntax = \"proto3\";").unwrap();
        let mut tarball = Vec::new();
        archive::pack(&source, &mut tarball, ArchiveFormat::TarGz, &CancellationToken::new()).unwrap();
        fs::write(temp.path().join("bundle.tar.gz"), tarball).unwrap();

        let input = InputRef {
            kind: InputKind::Archive {
                format: ArchiveFormat::TarGz,
                strip_components: 1,
            },
            path: "bundle.tar.gz".to_string(),
            subdir: Some("proto".to_string()),
            follow_symlinks: false,
        };
        let opened = open(&input, temp.path(), &CancellationToken::new()).unwrap();
        assert_eq!(opened.subdir().as_str(), "proto");
        assert_eq!(external_paths(&opened), vec!["bundle.tar.gz/proto/a.proto"]);
    }

    #[test]
    fn test_open_missing_archive() {
        let temp = TempDir::new().unwrap();
        let input = InputRef {
            kind: InputKind::Archive {
                format: ArchiveFormat::Tar,
                strip_components: 0,
            },
            path: "nope.tar".to_string(),
            subdir: None,
            follow_symlinks: false,
        };
        assert!(matches!(
            open(&input, temp.path(), &CancellationToken::new()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_git_url() {
        let dir = Path::new("/work");
        assert_eq!(git_url("https://example.com/x.git", dir), "https://example.com/x.git");
        assert_eq!(git_url("git@example.com:x.git", dir), "git@example.com:x.git");
        assert_eq!(git_url("repo", dir), "/work/repo");
    }
}
