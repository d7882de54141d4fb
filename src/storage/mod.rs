//! # Storage Buckets
//!
//! A bucket is a tree of objects addressed by [`NormalizedPath`]. Every
//! backend (an OS directory, an in-memory map, an unpacked archive, a git
//! checkout) exposes the same capabilities so the module and workspace
//! builders never care where files came from.
//!
//! ## Capabilities
//!
//! - **`walk`**: a lazy, restartable listing of every object below a prefix.
//!   Each call walks from scratch; nothing is cached between calls.
//! - **`get`**: a readable stream for one object.
//! - **`stat`**: metadata for one object, including its external path.
//! - **`put`** (read/write buckets only): scoped write access to one object.
//!   The bucket owns opening, flushing and closing; the caller only writes.
//!
//! Every path a backend yields has been through the normalizer. A backend
//! yielding an un-normalizable path is a bug in the backend.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::path::NormalizedPath;

pub mod archive;
pub mod git;
pub mod mem;
pub mod os;

pub use archive::ArchiveFormat;
pub use git::GitBucket;
pub use mem::MemoryBucket;
pub use os::OsBucket;

/// Metadata for one object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket-relative path.
    pub path: NormalizedPath,
    /// Path shown to users in diagnostics.
    pub external_path: String,
    /// Whether the object was reached through a symlink.
    pub is_symlink: bool,
}

/// A lazy sequence of objects produced by [`ReadBucket::walk`].
pub type Walk<'a> = Box<dyn Iterator<Item = Result<ObjectInfo>> + 'a>;

/// Read access to a bucket.
pub trait ReadBucket: Send + Sync {
    /// Walks every object at or below `prefix`. A prefix that does not exist
    /// yields nothing.
    fn walk(&self, prefix: &NormalizedPath) -> Walk<'_>;

    /// Opens one object for reading.
    fn get(&self, path: &NormalizedPath) -> Result<Box<dyn Read + '_>>;

    /// Returns the metadata of one object. Directories are not objects.
    fn stat(&self, path: &NormalizedPath) -> Result<ObjectInfo>;

    /// The path users see for `path`.
    fn external_path(&self, path: &NormalizedPath) -> String;

    /// Reads one object fully into memory.
    fn read_to_vec(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        self.get(path)?.read_to_end(&mut contents)?;
        Ok(contents)
    }

    /// Returns the object at `path`, or `None` if there is none.
    fn read_if_exists(&self, path: &NormalizedPath) -> Result<Option<Vec<u8>>> {
        match self.read_to_vec(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Write access to a bucket.
pub trait WriteBucket {
    /// Writes the object at `path` through `write`.
    ///
    /// The bucket opens the object, hands the writer to the closure, then
    /// flushes and closes it on every exit path. When the closure fails no
    /// object is left behind.
    fn put(
        &self,
        path: &NormalizedPath,
        write: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()>;

    /// Writes `contents` as the object at `path`.
    fn put_bytes(&self, path: &NormalizedPath, contents: &[u8]) -> Result<()> {
        self.put(path, &mut |writer: &mut dyn Write| {
            writer.write_all(contents)?;
            Ok(())
        })
    }
}

/// Copies every object of `from` into `to`, returning the number copied.
pub fn copy(from: &dyn ReadBucket, to: &dyn WriteBucket) -> Result<usize> {
    let mut count = 0;
    for info in from.walk(&NormalizedPath::root()) {
        let info = info?;
        let contents = from.read_to_vec(&info.path)?;
        to.put_bytes(&info.path, &contents)?;
        count += 1;
    }
    Ok(count)
}

/// A read-only view of the subtree of another bucket.
///
/// Paths are re-keyed relative to the prefix; external paths are those of
/// the underlying bucket.
pub struct SubBucket<'a> {
    inner: &'a dyn ReadBucket,
    prefix: NormalizedPath,
}

impl<'a> SubBucket<'a> {
    pub fn new(inner: &'a dyn ReadBucket, prefix: NormalizedPath) -> Self {
        Self { inner, prefix }
    }

    pub fn prefix(&self) -> &NormalizedPath {
        &self.prefix
    }
}

impl ReadBucket for SubBucket<'_> {
    fn walk(&self, prefix: &NormalizedPath) -> Walk<'_> {
        let full = self.prefix.join(prefix);
        let own_prefix = self.prefix.clone();
        Box::new(self.inner.walk(&full).filter_map(move |info| match info {
            Ok(info) => info.path.strip_prefix(&own_prefix).map(|path| {
                Ok(ObjectInfo {
                    path,
                    external_path: info.external_path,
                    is_symlink: info.is_symlink,
                })
            }),
            Err(e) => Some(Err(e)),
        }))
    }

    fn get(&self, path: &NormalizedPath) -> Result<Box<dyn Read + '_>> {
        self.inner.get(&self.prefix.join(path))
    }

    fn stat(&self, path: &NormalizedPath) -> Result<ObjectInfo> {
        let mut info = self.inner.stat(&self.prefix.join(path))?;
        info.path = path.clone();
        Ok(info)
    }

    fn external_path(&self, path: &NormalizedPath) -> String {
        self.inner.external_path(&self.prefix.join(path))
    }
}

/// Joins an external root and a bucket-relative path for display.
pub(crate) fn join_external(root: &str, path: &NormalizedPath) -> String {
    match (root, path.is_root()) {
        ("" | ".", _) => path.to_string(),
        (root, true) => root.to_string(),
        (root, false) if root.ends_with('/') => format!("{}{}", root, path),
        (root, false) => format!("{}/{}", root, path),
    }
}
