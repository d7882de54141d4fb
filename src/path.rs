//! Path normalization and validation for protomod
//!
//! Every path that enters a bucket, a module, or a workspace descriptor goes
//! through [`normalize_and_validate`] first. The resulting [`NormalizedPath`]
//! is forward-slash separated, relative, and free of `.`, `..` and empty
//! segments. The bucket root is spelled `.`.

use std::fmt;

use crate::error::{Error, PathErrorKind, Result};

/// A validated, relative, forward-slash separated path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// The root of a bucket.
    pub fn root() -> Self {
        NormalizedPath(".".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }

    /// Iterates over the path segments. The root has none.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        let segments = if self.is_root() { "" } else { self.0.as_str() };
        segments.split('/').filter(|segment| !segment.is_empty())
    }

    /// Appends `other` below this path.
    pub fn join(&self, other: &NormalizedPath) -> NormalizedPath {
        match (self.is_root(), other.is_root()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => NormalizedPath(format!("{}/{}", self.0, other.0)),
        }
    }

    /// The parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<NormalizedPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(index) => Some(NormalizedPath(self.0[..index].to_string())),
            None => Some(NormalizedPath::root()),
        }
    }

    /// Whether `other` is this path or lives below it.
    pub fn contains(&self, other: &NormalizedPath) -> bool {
        other.strip_prefix(self).is_some()
    }

    /// Returns `self` relative to `prefix` when `prefix` contains `self`.
    ///
    /// Stripping a path from itself yields the root.
    pub fn strip_prefix(&self, prefix: &NormalizedPath) -> Option<NormalizedPath> {
        if prefix.is_root() {
            return Some(self.clone());
        }
        if self.0 == prefix.0 {
            return Some(NormalizedPath::root());
        }
        self.0
            .strip_prefix(prefix.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| NormalizedPath(rest.to_string()))
    }

    /// The extension of the final segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.components().last()?;
        let index = name.rfind('.')?;
        if index == 0 {
            return None;
        }
        Some(&name[index + 1..])
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `raw` is absolute on any platform protomod runs on.
pub fn is_absolute(raw: &str) -> bool {
    if raw.starts_with('/') || raw.starts_with('\\') {
        return true;
    }
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Lexically cleans a path without validating it.
///
/// Separators become `/`, empty and `.` segments are dropped, and `..`
/// cancels the preceding segment. A leading `/` is kept, as are leading `..`
/// segments of a relative path. The empty path cleans to `.`.
pub fn clean(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !absolute {
                    // The parent of `/` is `/`.
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Normalizes `raw` and validates that it is a relative path that stays
/// inside its root.
pub fn normalize_and_validate(raw: &str) -> Result<NormalizedPath> {
    if raw.contains('\0') {
        return Err(Error::path(raw.replace('\0', "\\0"), PathErrorKind::Malformed));
    }
    if is_absolute(raw) {
        return Err(Error::path(raw, PathErrorKind::Absolute));
    }
    let cleaned = clean(raw);
    if cleaned == ".." || cleaned.starts_with("../") {
        return Err(Error::path(raw, PathErrorKind::Escapes));
    }
    Ok(NormalizedPath(cleaned))
}

/// Computes `target` relative to `base` and validates the result.
///
/// Both paths are cleaned first and must agree on being absolute or
/// relative. A target outside `base` fails with an escape error.
pub fn rel(base: &str, target: &str) -> Result<NormalizedPath> {
    let base_clean = clean(base);
    let target_clean = clean(target);
    if is_absolute(&base_clean) != is_absolute(&target_clean) {
        return Err(Error::path(target, PathErrorKind::Malformed));
    }
    let split = |path: &str| -> Vec<String> {
        path.split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .map(str::to_string)
            .collect()
    };
    let base_segments = split(&base_clean);
    let target_segments = split(&target_clean);
    let common = base_segments
        .iter()
        .zip(target_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut relative: Vec<&str> = Vec::new();
    for _ in common..base_segments.len() {
        relative.push("..");
    }
    for segment in &target_segments[common..] {
        relative.push(segment);
    }
    let joined = relative.join("/");
    normalize_and_validate(&joined).map_err(|_| Error::path(target, PathErrorKind::Escapes))
}
