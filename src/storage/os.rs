//! OS directory bucket
//!
//! Walks a real directory with `walkdir`. Symlinks are not followed unless
//! enabled; when they are, each followed directory link pushes a new walk
//! frame that carries the real directories already entered, so a link back
//! into its own ancestry is reported instead of looping.
//!
//! Every component of a requested path gets the same treatment as a walked
//! entry: a symlinked prefix is hidden when links are disabled and must stay
//! inside the root when they are enabled.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use super::{join_external, ObjectInfo, ReadBucket, Walk, WriteBucket};
use crate::error::{Error, PathErrorKind, Result};
use crate::path::{normalize_and_validate, NormalizedPath};

/// A read/write bucket rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct OsBucket {
    root: PathBuf,
    real_root: PathBuf,
    external_root: String,
    follow_symlinks: bool,
}

impl OsBucket {
    /// Opens the directory at `root`.
    ///
    /// Fails with [`Error::NotFound`] if it does not exist and
    /// [`Error::NotADirectory`] if it is a regular file.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let display = root.display().to_string();
        let metadata = fs::metadata(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: display.clone(),
            },
            _ => Error::Io(e),
        })?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory { path: display });
        }
        Ok(Self {
            real_root: fs::canonicalize(root)?,
            root: root.to_path_buf(),
            external_root: display,
            follow_symlinks: false,
        })
    }

    /// Shows external paths below `root` instead of the directory path.
    pub fn with_external_root(mut self, root: impl Into<String>) -> Self {
        self.external_root = root.into();
        self
    }

    /// Enables or disables following symlinks.
    pub fn with_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// The directory this bucket reads.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_path(&self, path: &NormalizedPath) -> PathBuf {
        path.components()
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    /// Resolves a symlink to its canonical target, checking it stays inside
    /// the bucket. `Ok(None)` means the link is broken.
    fn resolve_link(&self, io_path: &Path, path: &NormalizedPath) -> Result<Option<PathBuf>> {
        let target = match fs::canonicalize(io_path) {
            Ok(target) => target,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        if !target.starts_with(&self.real_root) {
            return Err(Error::SymlinkEscape {
                path: self.external_path(path),
                target: target.display().to_string(),
            });
        }
        Ok(Some(target))
    }

    /// Checks the first `count` components of `path` for symlinks.
    ///
    /// `Ok(None)` means the path is hidden: a component is missing, is a
    /// link while links are disabled, or is a broken link. Otherwise returns
    /// whether any component was a followed link.
    fn check_components(&self, path: &NormalizedPath, count: usize) -> Result<Option<bool>> {
        let mut io_path = self.root.clone();
        let mut logical = NormalizedPath::root();
        let mut linked = false;
        for segment in path.components().take(count) {
            io_path.push(segment);
            logical = logical.join(&normalize_and_validate(segment)?);
            let metadata = match fs::symlink_metadata(&io_path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(Error::Io(e)),
            };
            if !metadata.file_type().is_symlink() {
                continue;
            }
            if !self.follow_symlinks {
                debug!("Skipping symlink {}", io_path.display());
                return Ok(None);
            }
            if self.resolve_link(&io_path, &logical)?.is_none() {
                return Ok(None);
            }
            linked = true;
        }
        Ok(Some(linked))
    }

    fn object(&self, path: NormalizedPath, is_symlink: bool) -> ObjectInfo {
        ObjectInfo {
            external_path: self.external_path(&path),
            path,
            is_symlink,
        }
    }
}

impl ReadBucket for OsBucket {
    fn walk(&self, prefix: &NormalizedPath) -> Walk<'_> {
        let depth = prefix.components().count();
        let linked = match self.check_components(prefix, depth) {
            Ok(Some(linked)) => linked,
            Ok(None) => return Box::new(std::iter::empty()),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let start = self.io_path(prefix);
        let metadata = match fs::metadata(&start) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Box::new(std::iter::empty()),
            Err(e) => return Box::new(std::iter::once(Err(Error::Io(e)))),
        };
        if metadata.is_file() {
            let info = self.stat(prefix);
            return Box::new(std::iter::once(info));
        }
        let real_start = match fs::canonicalize(&start) {
            Ok(real) => real,
            Err(e) => return Box::new(std::iter::once(Err(Error::Io(e)))),
        };
        let mut ancestors = HashSet::new();
        ancestors.insert(self.real_root.clone());
        // A linked prefix is walked at its checked target.
        let io_root = if linked { real_start.clone() } else { start };
        Box::new(OsWalk {
            bucket: self,
            stack: vec![Frame::new(io_root, real_start, prefix.clone(), ancestors, linked)],
        })
    }

    fn get(&self, path: &NormalizedPath) -> Result<Box<dyn Read + '_>> {
        self.stat(path)?;
        let file = fs::File::open(self.io_path(path))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn stat(&self, path: &NormalizedPath) -> Result<ObjectInfo> {
        let io_path = self.io_path(path);
        let not_found = || Error::NotFound {
            path: self.external_path(path),
        };
        let parents = path.components().count().saturating_sub(1);
        let linked_parent = match self.check_components(path, parents)? {
            Some(linked) => linked,
            None => return Err(not_found()),
        };
        let metadata = match fs::symlink_metadata(&io_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(Error::Io(e)),
        };
        if metadata.file_type().is_symlink() {
            if !self.follow_symlinks {
                debug!("Skipping symlink {}", io_path.display());
                return Err(not_found());
            }
            return match self.resolve_link(&io_path, path)? {
                None => Err(Error::BrokenSymlink {
                    path: self.external_path(path),
                }),
                Some(target) if target.is_file() => Ok(self.object(path.clone(), true)),
                Some(_) => Err(not_found()),
            };
        }
        if metadata.is_file() {
            Ok(self.object(path.clone(), linked_parent))
        } else {
            Err(not_found())
        }
    }

    fn external_path(&self, path: &NormalizedPath) -> String {
        join_external(&self.external_root, path)
    }
}

impl WriteBucket for OsBucket {
    fn put(
        &self,
        path: &NormalizedPath,
        write: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()> {
        if path.is_root() {
            return Err(Error::path(path.as_str(), PathErrorKind::Malformed));
        }
        let target = self.io_path(path);
        let parent = target.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)?;

        // The temporary file is removed on drop if anything below fails.
        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        {
            let mut writer = io::BufWriter::new(staged.as_file_mut());
            write(&mut writer)?;
            writer.flush()?;
        }
        staged.persist(&target).map_err(|e| Error::Io(e.error))?;
        debug!("Wrote {}", target.display());
        Ok(())
    }
}

struct Frame {
    iter: walkdir::IntoIter,
    io_root: PathBuf,
    real_root: PathBuf,
    logical_root: NormalizedPath,
    ancestors: HashSet<PathBuf>,
    /// Whether this frame was entered through a symlink.
    linked: bool,
}

impl Frame {
    fn new(
        io_root: PathBuf,
        real_root: PathBuf,
        logical_root: NormalizedPath,
        ancestors: HashSet<PathBuf>,
        linked: bool,
    ) -> Self {
        let iter = WalkDir::new(&io_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self {
            iter,
            io_root,
            real_root,
            logical_root,
            ancestors,
            linked,
        }
    }
}

struct OsWalk<'a> {
    bucket: &'a OsBucket,
    stack: Vec<Frame>,
}

impl OsWalk<'_> {
    /// Handles one entry of the top frame. `Ok(None)` means skip it.
    fn visit(&mut self, entry: walkdir::DirEntry) -> Result<Option<ObjectInfo>> {
        let frame = match self.stack.last() {
            Some(frame) => frame,
            None => return Ok(None),
        };
        if entry.depth() == 0 {
            return Ok(None);
        }
        let relative = entry
            .path()
            .strip_prefix(&frame.io_root)
            .map_err(|_| Error::path(entry.path().display().to_string(), PathErrorKind::Malformed))?;
        let relative_str = relative
            .to_str()
            .ok_or_else(|| Error::path(relative.display().to_string(), PathErrorKind::Malformed))?;
        let path = frame.logical_root.join(&normalize_and_validate(relative_str)?);

        let file_type = entry.file_type();
        if file_type.is_file() {
            return Ok(Some(self.bucket.object(path, frame.linked)));
        }
        if !file_type.is_symlink() {
            return Ok(None);
        }
        if !self.bucket.follow_symlinks {
            debug!("Skipping symlink {}", entry.path().display());
            return Ok(None);
        }

        let target = match self.bucket.resolve_link(entry.path(), &path)? {
            Some(target) => target,
            None => {
                warn!(
                    "Skipping broken symlink {}",
                    self.bucket.external_path(&path)
                );
                return Ok(None);
            }
        };
        if target.is_file() {
            return Ok(Some(self.bucket.object(path, true)));
        }

        let real_parent = frame
            .real_root
            .join(relative)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| frame.real_root.clone());
        let cycles = frame
            .ancestors
            .iter()
            .chain(std::iter::once(&real_parent))
            .any(|ancestor| ancestor.starts_with(&target));
        if cycles {
            return Err(Error::SymlinkCycle {
                path: self.bucket.external_path(&path),
            });
        }

        let mut ancestors = frame.ancestors.clone();
        ancestors.insert(real_parent);
        ancestors.insert(target.clone());
        debug!("Following symlink {} -> {}", path, target.display());
        self.stack
            .push(Frame::new(target.clone(), target, path, ancestors, true));
        Ok(None)
    }
}

impl Iterator for OsWalk<'_> {
    type Item = Result<ObjectInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.stack.last_mut()?.iter.next();
            let entry = match next {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => return Some(Err(Error::Io(io::Error::from(e)))),
                None => {
                    self.stack.pop();
                    continue;
                }
            };
            match self.visit(entry) {
                Ok(Some(info)) => return Some(Ok(info)),
                Ok(None) => continue,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
