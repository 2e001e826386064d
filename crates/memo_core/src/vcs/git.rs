//! `git` command-line backend.

use super::{CommitId, VcsError, VcsResult, VersionControl};
use crate::config::GitConfig;
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Instant;

/// Runs blocking `git` commands inside the workspace root.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    author_name: Option<String>,
    author_email: Option<String>,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            author_name: None,
            author_email: None,
        }
    }

    /// Uses the optional author identity from the `git` config section.
    pub fn from_config(root: impl Into<PathBuf>, config: &GitConfig) -> Self {
        Self {
            root: root.into(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("git");
        if let Some(name) = &self.author_name {
            command.arg("-c").arg(format!("user.name={name}"));
        }
        if let Some(email) = &self.author_email {
            command.arg("-c").arg(format!("user.email={email}"));
        }
        command.args(args).current_dir(&self.root);
        command
    }

    fn output(&self, args: &[&str]) -> VcsResult<Output> {
        let label = format!("git {}", args.first().copied().unwrap_or_default());
        self.command(args)
            .output()
            .map_err(|source| VcsError::Spawn {
                command: label,
                source,
            })
    }

    /// Runs `git <args>` and returns stdout; non-zero exit is an error.
    fn run(&self, args: &[&str]) -> VcsResult<String> {
        let started_at = Instant::now();
        let label = format!("git {}", args.first().copied().unwrap_or_default());
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(
                "event=vcs_command module=vcs status=error duration_ms={} command={} exit_code={:?}",
                started_at.elapsed().as_millis(),
                label,
                output.status.code()
            );
            return Err(VcsError::CommandFailed {
                command: label,
                stderr,
            });
        }
        debug!(
            "event=vcs_command module=vcs status=ok duration_ms={} command={}",
            started_at.elapsed().as_millis(),
            label
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn ensure_initialized(&self) -> VcsResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(VcsError::NotInitialized(self.root.clone()))
        }
    }
}

fn with_paths<'a>(mut args: Vec<&'a str>, paths: &'a [String]) -> Vec<&'a str> {
    args.push("--");
    args.extend(paths.iter().map(String::as_str));
    args
}

impl VersionControl for GitCli {
    fn is_initialized(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn init(&self, default_branch: &str) -> VcsResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.run(&["init", "-b", default_branch])?;
        info!(
            "event=vcs_init module=vcs status=ok branch={}",
            default_branch
        );
        Ok(())
    }

    fn commit(&self, paths: &[String], message: &str) -> VcsResult<CommitId> {
        self.ensure_initialized()?;
        if paths.is_empty() {
            self.run(&["commit", "--allow-empty", "-m", message])?;
        } else {
            self.run(&with_paths(vec!["add"], paths))?;
            self.run(&with_paths(vec!["commit", "-m", message], paths))?;
        }

        let commit_id = self.run(&["rev-parse", "HEAD"])?.trim().to_string();
        info!(
            "event=vcs_commit module=vcs status=ok commit_id={} paths={}",
            commit_id,
            paths.len()
        );
        Ok(commit_id)
    }

    fn status(&self, paths: &[String]) -> VcsResult<Vec<String>> {
        self.ensure_initialized()?;
        let stdout = self.run(&with_paths(vec!["status", "--porcelain"], paths))?;
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn find_commit(&self, marker: &str, paths: &[String]) -> VcsResult<Option<CommitId>> {
        if self.head()?.is_none() {
            return Ok(None);
        }
        let grep = format!("--grep={marker}");
        let mut args = vec!["log", "-1", "--format=%H", "--fixed-strings", grep.as_str()];
        if !paths.is_empty() {
            args = with_paths(args, paths);
        }
        let found = self.run(&args)?.trim().to_string();
        debug!(
            "event=vcs_find_commit module=vcs status=ok found={}",
            !found.is_empty()
        );
        Ok((!found.is_empty()).then_some(found))
    }

    fn head(&self) -> VcsResult<Option<CommitId>> {
        self.ensure_initialized()?;
        let output = self.output(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let head = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!head.is_empty()).then_some(head))
    }
}
