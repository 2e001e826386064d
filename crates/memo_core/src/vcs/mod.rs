//! Version-control boundary for vault commits.
//!
//! # Responsibility
//! - Abstract the one-commit-per-proposal operation behind a trait.
//! - Provide the `git` command-line implementation.
//!
//! # Invariants
//! - `commit` either records every given path in one commit or fails with
//!   no commit created.

pub mod git;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub use git::GitCli;

/// Opaque commit identifier (a full hash for git).
pub type CommitId = String;

pub type VcsResult<T> = Result<T, VcsError>;

#[derive(Debug)]
pub enum VcsError {
    NotInitialized(PathBuf),
    /// The tool could not be started at all.
    Spawn { command: String, source: io::Error },
    CommandFailed { command: String, stderr: String },
}

impl Display for VcsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized(root) => {
                write!(f, "no repository initialized at `{}`", root.display())
            }
            Self::Spawn { command, source } => write!(f, "failed to run `{command}`: {source}"),
            Self::CommandFailed { command, stderr } => {
                write!(f, "`{command}` failed: {}", stderr.trim())
            }
        }
    }
}

impl Error for VcsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Repository operations the commit engine relies on.
///
/// Paths are workspace-relative with `/` separators.
pub trait VersionControl {
    fn is_initialized(&self) -> bool;
    fn init(&self, default_branch: &str) -> VcsResult<()>;
    /// Records exactly `paths` in one new commit.
    fn commit(&self, paths: &[String], message: &str) -> VcsResult<CommitId>;
    /// Porcelain status lines restricted to `paths`; empty means clean.
    fn status(&self, paths: &[String]) -> VcsResult<Vec<String>>;
    /// Newest commit whose message contains `marker` and that touches at
    /// least one of `paths`; with no paths, any commit naming `marker`.
    fn find_commit(&self, marker: &str, paths: &[String]) -> VcsResult<Option<CommitId>>;
    /// Current commit, or `None` before the first commit.
    fn head(&self) -> VcsResult<Option<CommitId>>;
}
