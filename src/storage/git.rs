//! Version-control reference buckets.
//!
//! A reference is checked out with the system `git` command into a temporary
//! staging directory, which is then read as an [`OsBucket`]. Using the system
//! command picks up whatever authentication the user already has configured
//! (SSH keys, credential helpers, tokens in `~/.gitconfig`).

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use log::debug;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{ObjectInfo, OsBucket, ReadBucket, Walk};
use crate::error::{Error, Result};
use crate::path::NormalizedPath;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A checked-out reference. The staging directory is removed when the bucket
/// is closed or dropped.
#[derive(Debug)]
pub struct GitBucket {
    bucket: OsBucket,
    staging: TempDir,
}

impl GitBucket {
    /// The staging directory holding the checkout.
    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }

    /// Removes the staging directory, reporting any failure.
    pub fn close(self) -> Result<()> {
        self.staging.close()?;
        Ok(())
    }
}

impl ReadBucket for GitBucket {
    fn walk(&self, prefix: &NormalizedPath) -> Walk<'_> {
        self.bucket.walk(prefix)
    }

    fn get(&self, path: &NormalizedPath) -> Result<Box<dyn Read + '_>> {
        self.bucket.get(path)
    }

    fn stat(&self, path: &NormalizedPath) -> Result<ObjectInfo> {
        self.bucket.stat(path)
    }

    fn external_path(&self, path: &NormalizedPath) -> String {
        self.bucket.external_path(path)
    }
}

/// Checks out `reference` of the repository at `url`.
///
/// Only the requested reference is fetched (`--depth=1`). External paths of
/// the returned bucket are relative to the repository root.
pub fn checkout(url: &str, reference: &str, cancel: &CancellationToken) -> Result<GitBucket> {
    let staging = tempfile::Builder::new().prefix("protomod-git-").tempdir()?;
    debug!(
        "Checking out {}@{} into {}",
        url,
        reference,
        staging.path().display()
    );

    let git = GitRunner {
        url,
        reference,
        dir: staging.path(),
        cancel,
    };
    git.run(&["init", "--quiet"])?;
    git.run(&["fetch", "--quiet", "--depth=1", url, reference])?;
    git.run(&["checkout", "--quiet", "FETCH_HEAD"])?;
    fs::remove_dir_all(staging.path().join(".git"))?;

    let bucket = OsBucket::new(staging.path())?.with_external_root("");
    Ok(GitBucket { bucket, staging })
}

struct GitRunner<'a> {
    url: &'a str,
    reference: &'a str,
    dir: &'a Path,
    cancel: &'a CancellationToken,
}

impl GitRunner<'_> {
    fn run(&self, args: &[&str]) -> Result<()> {
        let command = args.first().copied().unwrap_or_default().to_string();
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        let mut child = Command::new("git")
            .args(args)
            .current_dir(self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Git {
                url: self.url.to_string(),
                reference: self.reference.to_string(),
                message: e.to_string(),
            })?;

        // Drained on a thread so a chatty child cannot fill the pipe and stall.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        let status = self.wait(&mut child)?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(Error::GitCommand {
                command,
                url: self.url.to_string(),
                stderr: describe_failure(&stderr),
            });
        }
        Ok(())
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        loop {
            if self.cancel.is_cancelled() {
                debug!("Killing git after cancellation");
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.cancelled());
            }
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn cancelled(&self) -> Error {
        Error::Cancelled {
            operation: format!("git checkout of {}@{}", self.url, self.reference),
        }
    }
}

fn describe_failure(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        format!(
            "Authentication failed. Make sure you have access to the repository.\n\
             Error: {}",
            stderr
        )
    } else {
        stderr.to_string()
    }
}

/// Whether a `git` executable can be run.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
