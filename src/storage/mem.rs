//! In-memory bucket implementation
//!
//! Backs unpacked archives and serves as a scratch bucket in tests. Objects
//! live in a sorted map, so walks come out in path order.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::RwLock;

use super::{join_external, ObjectInfo, ReadBucket, Walk, WriteBucket};
use crate::error::{Error, Result};
use crate::path::{normalize_and_validate, NormalizedPath};

/// Represents a file with content and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// File content as bytes
    pub content: Vec<u8>,
    /// File permissions (simplified as u32)
    pub permissions: u32,
}

impl File {
    /// Create a new file with content
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            permissions: 0o644,
        }
    }

    /// Create a new file from string content
    pub fn from_string(content: &str) -> Self {
        Self::new(content.as_bytes().to_vec())
    }

    /// Get file size in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// In-memory read/write bucket
#[derive(Debug, Default)]
pub struct MemoryBucket {
    files: RwLock<BTreeMap<NormalizedPath, File>>,
    external_root: String,
}

impl MemoryBucket {
    /// Create a new empty bucket
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix external paths with `root` in diagnostics.
    pub fn with_external_root(mut self, root: impl Into<String>) -> Self {
        self.external_root = root.into();
        self
    }

    /// Add or replace a file
    pub fn add_file(&self, path: &NormalizedPath, file: File) -> Result<()> {
        self.files
            .write()
            .map_err(|_| Error::LockPoisoned {
                context: "memory bucket".to_string(),
            })?
            .insert(path.clone(), file);
        Ok(())
    }

    /// Add a file with string content, validating the raw path
    pub fn add_file_string(&self, path: &str, content: &str) -> Result<()> {
        let path = normalize_and_validate(path)?;
        self.add_file(&path, File::from_string(content))
    }

    /// Get a copy of a file by path
    pub fn get_file(&self, path: &NormalizedPath) -> Result<Option<File>> {
        Ok(self.read_files()?.get(path).cloned())
    }

    /// Check if a file exists
    pub fn exists(&self, path: &NormalizedPath) -> bool {
        self.read_files()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    /// List all paths in sorted order
    pub fn list_files(&self) -> Result<Vec<NormalizedPath>> {
        Ok(self.read_files()?.keys().cloned().collect())
    }

    /// Get the number of files
    pub fn len(&self) -> usize {
        self.read_files().map(|files| files.len()).unwrap_or(0)
    }

    /// Check if the bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_files(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<NormalizedPath, File>>> {
        self.files.read().map_err(|_| Error::LockPoisoned {
            context: "memory bucket".to_string(),
        })
    }
}

impl ReadBucket for MemoryBucket {
    fn walk(&self, prefix: &NormalizedPath) -> Walk<'_> {
        let snapshot = match self.read_files() {
            Ok(files) => files
                .iter()
                .filter(|(path, _)| prefix.contains(path))
                .map(|(path, _)| {
                    Ok(ObjectInfo {
                        path: path.clone(),
                        external_path: self.external_path(path),
                        is_symlink: false,
                    })
                })
                .collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        };
        Box::new(snapshot.into_iter())
    }

    fn get(&self, path: &NormalizedPath) -> Result<Box<dyn Read + '_>> {
        match self.get_file(path)? {
            Some(file) => Ok(Box::new(Cursor::new(file.content))),
            None => Err(Error::NotFound {
                path: self.external_path(path),
            }),
        }
    }

    fn stat(&self, path: &NormalizedPath) -> Result<ObjectInfo> {
        if self.exists(path) {
            Ok(ObjectInfo {
                path: path.clone(),
                external_path: self.external_path(path),
                is_symlink: false,
            })
        } else {
            Err(Error::NotFound {
                path: self.external_path(path),
            })
        }
    }

    fn external_path(&self, path: &NormalizedPath) -> String {
        join_external(&self.external_root, path)
    }
}

impl WriteBucket for MemoryBucket {
    fn put(
        &self,
        path: &NormalizedPath,
        write: &mut dyn FnMut(&mut dyn Write) -> Result<()>,
    ) -> Result<()> {
        let mut buffer = Vec::new();
        write(&mut buffer)?;
        self.add_file(path, File::new(buffer))
    }
}
