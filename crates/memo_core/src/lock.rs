//! Exclusive vault lock for the commit critical section.
//!
//! # Responsibility
//! - Serialize commits and ledger appends across processes.
//!
//! # Invariants
//! - At most one `VaultLock` per workspace is alive at a time.
//! - Acquisition never waits; a held lock is reported immediately.
//! - The OS releases the lock when the holder exits, even after a crash.

use crate::workspace::Workspace;
use fs2::FileExt;
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum LockError {
    /// Another holder owns the lock.
    Held(PathBuf),
    Io { path: PathBuf, source: io::Error },
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Held(path) => write!(f, "vault lock is held: {}", path.display()),
            Self::Io { path, source } => {
                write!(f, "vault lock I/O failed for `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for LockError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Held(_) => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Guard over `vault/index/.lock`; released on drop.
#[derive(Debug)]
pub struct VaultLock {
    file: File,
    path: PathBuf,
}

impl VaultLock {
    /// Takes the exclusive lock or fails fast with `LockError::Held`.
    pub fn acquire(workspace: &Workspace) -> Result<Self, LockError> {
        let path = workspace.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("event=vault_lock module=lock status=acquired");
                Ok(Self { file, path })
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                warn!("event=vault_lock module=lock status=contended");
                Err(LockError::Held(path))
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!("event=vault_lock module=lock status=error error_code=unlock_failed error={err}");
        } else {
            debug!("event=vault_lock module=lock status=released");
        }
    }
}
