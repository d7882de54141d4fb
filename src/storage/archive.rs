//! Tar and gzip-compressed tar buckets.
//!
//! Archives are read completely at open time into a [`MemoryBucket`]; there is
//! no lazy archive index. Packing writes objects in path order with a fixed
//! mode and a zero mtime so the same bucket always produces the same bytes.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, trace};
use tar::{Archive, Builder, Header};
use tokio_util::sync::CancellationToken;

use super::{MemoryBucket, ReadBucket};
use crate::error::{Error, PathErrorKind, Result};
use crate::path::{is_absolute, normalize_and_validate, NormalizedPath};

/// Supported archive encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// Guesses the format from a file name.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if path.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Tar => f.write_str("tar"),
            ArchiveFormat::TarGz => f.write_str("targz"),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tar" => Ok(ArchiveFormat::Tar),
            "targz" | "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            other => Err(Error::Archive {
                message: format!("unknown archive format \"{}\", expected tar or targz", other),
            }),
        }
    }
}

fn check_cancelled(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled {
            operation: operation.to_string(),
        });
    }
    Ok(())
}

/// Strips the first `count` segments from an entry path.
///
/// Returns `None` when nothing is left.
fn strip_components(path: &NormalizedPath, count: usize) -> Result<Option<NormalizedPath>> {
    let rest: Vec<&str> = path.components().skip(count).collect();
    if rest.is_empty() {
        return Ok(None);
    }
    normalize_and_validate(&rest.join("/")).map(Some)
}

/// Reads every file entry of an archive into a new in-memory bucket.
///
/// Non-file entries are skipped. Entry names that are absolute or escape the
/// archive root fail the whole unpack.
pub fn unpack<R: Read>(
    reader: R,
    format: ArchiveFormat,
    strip: usize,
    cancel: &CancellationToken,
) -> Result<MemoryBucket> {
    match format {
        ArchiveFormat::Tar => unpack_entries(Archive::new(reader), strip, cancel),
        ArchiveFormat::TarGz => unpack_entries(Archive::new(GzDecoder::new(reader)), strip, cancel),
    }
}

fn unpack_entries<R: Read>(
    mut archive: Archive<R>,
    strip: usize,
    cancel: &CancellationToken,
) -> Result<MemoryBucket> {
    let bucket = MemoryBucket::new();
    let entries = archive.entries().map_err(archive_error)?;
    for entry in entries {
        check_cancelled(cancel, "archive unpack")?;
        let mut entry = entry.map_err(archive_error)?;
        let raw = {
            let name = entry.path().map_err(archive_error)?;
            name.to_str()
                .ok_or_else(|| Error::path(name.display().to_string(), PathErrorKind::Malformed))?
                .to_string()
        };

        if !entry.header().entry_type().is_file() {
            trace!("Skipping non-file archive entry {}", raw);
            continue;
        }
        if is_absolute(&raw) {
            return Err(Error::path(raw, PathErrorKind::Absolute));
        }
        let path = match strip_components(&normalize_and_validate(&raw)?, strip)? {
            Some(path) => path,
            None => continue,
        };

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        bucket.add_file(&path, super::mem::File::new(content))?;
    }
    debug!("Unpacked {} files from archive", bucket.len());
    Ok(bucket)
}

/// Writes every object of `bucket` to `writer` as an archive.
pub fn pack<W: Write>(
    bucket: &dyn ReadBucket,
    writer: W,
    format: ArchiveFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    match format {
        ArchiveFormat::Tar => {
            let mut builder = Builder::new(writer);
            append_all(&mut builder, bucket, cancel)?;
            builder.into_inner().map_err(archive_error)?;
        }
        ArchiveFormat::TarGz => {
            let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));
            append_all(&mut builder, bucket, cancel)?;
            builder
                .into_inner()
                .map_err(archive_error)?
                .finish()
                .map_err(archive_error)?;
        }
    }
    Ok(())
}

fn append_all<W: Write>(
    builder: &mut Builder<W>,
    bucket: &dyn ReadBucket,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut objects = bucket
        .walk(&NormalizedPath::root())
        .collect::<Result<Vec<_>>>()?;
    objects.sort_by(|a, b| a.path.cmp(&b.path));

    for object in objects {
        check_cancelled(cancel, "archive pack")?;
        let content = bucket.read_to_vec(&object.path)?;
        let mut header = Header::new_gnu();
        header.set_path(object.path.as_str()).map_err(archive_error)?;
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append(&header, content.as_slice())
            .map_err(archive_error)?;
    }
    Ok(())
}

fn archive_error(e: std::io::Error) -> Error {
    Error::Archive {
        message: e.to_string(),
    }
}
