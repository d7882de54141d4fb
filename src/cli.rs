//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::commands;
use protomod::defaults::{default_cache_root, CACHE_DIR_ENV};
use protomod::diagnostics::{AnnotationFormat, ExitCode};

/// protomod - Resolve schema modules and workspaces
#[derive(Parser, Debug)]
#[command(name = "protomod")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,

    /// The directory holding cached external modules.
    ///
    /// Defaults to the system cache directory (`~/.cache/protomod` on Linux,
    /// `~/Library/Caches/protomod` on macOS).
    #[arg(long, global = true, value_name = "DIR", env = CACHE_DIR_ENV)]
    cache_dir: Option<PathBuf>,

    /// How file annotations are printed.
    #[arg(long, global = true, value_enum, default_value = "text")]
    error_format: ErrorFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build and validate the workspace of an input
    Build(commands::build::BuildArgs),
    /// List the files of an input
    LsFiles(commands::ls_files::LsFilesArgs),
}

/// Annotation output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ErrorFormat {
    Text,
    Json,
}

impl Cli {
    /// Name of the subcommand, as used in failure messages.
    pub fn command_name(&self) -> &'static str {
        match self.command {
            Commands::Build(_) => "build",
            Commands::LsFiles(_) => "ls-files",
        }
    }

    pub fn annotation_format(&self) -> AnnotationFormat {
        match self.error_format {
            ErrorFormat::Text => AnnotationFormat::Text,
            ErrorFormat::Json => AnnotationFormat::Json,
        }
    }

    /// Execute the CLI command
    pub fn execute(self) -> Result<ExitCode> {
        // A logger may already be installed when running under a test harness.
        let _ = env_logger::Builder::new()
            .parse_filters(&self.log_level)
            .format_timestamp(None)
            .try_init();

        let cache_dir = self.cache_dir.unwrap_or_else(default_cache_root);
        match self.command {
            Commands::Build(args) => commands::build::execute(args, cache_dir),
            Commands::LsFiles(args) => commands::ls_files::execute(args, cache_dir),
        }
    }
}
