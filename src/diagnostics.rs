//! # Diagnostics
//!
//! Rendering of problems located in a file, and the exit codes the
//! `protomod` binary reports.
//!
//! A [`FileAnnotation`] renders as `<path>:<line>:<column>:<message>`, one per
//! line, sorted. The JSON form is one object per line.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// A problem at a position in a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FileAnnotation {
    /// External path of the file.
    pub path: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl FileAnnotation {
    pub fn new(
        path: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            line,
            column,
            message: message.into(),
        }
    }

    /// The annotations carried by `error`, if it has a file position.
    pub fn from_error(error: &Error) -> Option<Vec<FileAnnotation>> {
        match error {
            Error::ConfigSyntax {
                path,
                line,
                column,
                message,
            } => Some(vec![FileAnnotation::new(
                path.clone(),
                *line,
                *column,
                message.clone(),
            )]),
            _ => None,
        }
    }
}

impl fmt::Display for FileAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.path, self.line, self.column, self.message
        )
    }
}

/// How annotations are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationFormat {
    #[default]
    Text,
    Json,
}

/// Sorts `annotations` and renders them, one per line.
pub fn format_annotations(annotations: &[FileAnnotation], format: AnnotationFormat) -> Result<String> {
    let mut sorted = annotations.to_vec();
    sorted.sort();
    let lines = match format {
        AnnotationFormat::Text => sorted.iter().map(ToString::to_string).collect::<Vec<_>>(),
        AnnotationFormat::Json => sorted
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(lines.join("\n"))
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    /// The command finished and reported file annotations.
    FileAnnotation,
    Error,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::FileAnnotation => 100,
            ExitCode::Error => 1,
        }
    }
}

/// The message printed when `command` fails.
pub fn failure_message(command: &str, error: &dyn fmt::Display) -> String {
    format!("Failed to \"{}\": {}", command, error)
}
