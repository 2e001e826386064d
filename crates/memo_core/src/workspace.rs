//! Workspace layout bootstrap and file primitives.
//!
//! # Responsibility
//! - Resolve every pipeline path from one workspace root.
//! - Create the stage/vault/index/proposal directory layout before use.
//! - Provide write-temp-then-rename writes shared by stores and the vault.
//!
//! # Invariants
//! - Vault-relative paths always use `/` separators on the wire.
//! - A file written through `write_atomic` is either absent or complete at
//!   its final path.

use crate::model::category::Category;
use log::{error, info};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

const LAYOUT_DIRS: &[&str] = &[
    "configs",
    "stage/inbox",
    "stage/processed",
    "vault/ideas",
    "vault/todos",
    "vault/references",
    "vault/logs",
    "vault/summaries",
    "vault/index",
    ".memo/proposals",
];

/// Resolved paths for one memo workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wraps an existing root without touching disk.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens a workspace root and creates any missing layout directories.
    ///
    /// # Side effects
    /// - Creates directories under `root`.
    /// - Emits `workspace_open` logging events with duration and status.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let started_at = Instant::now();
        let workspace = Self::at(root);
        info!("event=workspace_open module=workspace status=start");

        for dir in LAYOUT_DIRS {
            let path = workspace.resolve(dir);
            if let Err(err) = fs::create_dir_all(&path) {
                error!(
                    "event=workspace_open module=workspace status=error duration_ms={} error_code=layout_create_failed dir={} error={}",
                    started_at.elapsed().as_millis(),
                    dir,
                    err
                );
                return Err(err);
            }
        }

        info!(
            "event=workspace_open module=workspace status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_inbox(&self) -> PathBuf {
        self.root.join("stage").join("inbox")
    }

    pub fn stage_processed(&self) -> PathBuf {
        self.root.join("stage").join("processed")
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.root.join("vault")
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.vault_dir().join(category.folder())
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.vault_dir().join("summaries")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.vault_dir().join("index")
    }

    pub fn entries_index(&self) -> PathBuf {
        self.index_dir().join("entries.jsonl")
    }

    pub fn commits_index(&self) -> PathBuf {
        self.index_dir().join("commits.jsonl")
    }

    /// Lock file guarding the commit critical section.
    pub fn lock_path(&self) -> PathBuf {
        self.index_dir().join(".lock")
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.root.join(".memo").join("proposals")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("configs").join("memo.yaml")
    }

    /// Resolves a `/`-separated workspace-relative path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Converts a path under the root back to `/`-separated form.
    ///
    /// Returns `None` when `path` is outside the workspace root.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let stripped = path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }
}

/// Writes `bytes` to `path` via a sibling temp file, fsync and rename.
///
/// The temp file lives in the destination directory so the final rename
/// never crosses filesystems.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
