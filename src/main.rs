//! # protomod CLI
//!
//! This is the binary entry point for the `protomod` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Executing the appropriate command based on the parsed arguments.
//! - Translating the outcome into output and an exit code: file annotations
//!   go to stdout with exit code 100, other failures to stderr as
//!   `Failed to "<command>": <error>` with exit code 1.
//!
//! The core logic lives in the library crate; the binary is a thin wrapper.

mod cli;
mod commands;

use clap::Parser;

use protomod::diagnostics::{failure_message, format_annotations, ExitCode, FileAnnotation};
use protomod::error::Error;

fn main() {
    let cli = cli::Cli::parse();
    let command = cli.command_name();
    let format = cli.annotation_format();

    let code = match cli.execute() {
        Ok(code) => code,
        Err(e) => {
            let annotations = e.downcast_ref::<Error>().and_then(FileAnnotation::from_error);
            match annotations.map(|annotations| format_annotations(&annotations, format)) {
                Some(Ok(rendered)) => {
                    println!("{}", rendered);
                    ExitCode::FileAnnotation
                }
                _ => {
                    eprintln!("{}", failure_message(command, &e));
                    ExitCode::Error
                }
            }
        }
    };
    std::process::exit(code.code());
}
