//! Staging area file operations.
//!
//! # Responsibility
//! - List and load raw notes waiting in `stage/inbox`.
//! - Copy new files into the inbox and move committed ones to `stage/processed`.
//!
//! # Invariants
//! - Staged files are never modified in place.
//! - A staged file leaves the inbox only through `move_to_processed`.
//! - The processed name is derived from the proposal id, so a repeated move is
//!   detected as already done.

use crate::model::note::{entry_id_for_hash, StagedNote};
use crate::workspace::Workspace;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const INBOX_PREFIX: &str = "stage/inbox/";

static FRONTMATTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|\z)")
        .expect("valid frontmatter regex")
});

pub type StageResult<T> = Result<T, StageError>;

#[derive(Debug)]
pub enum StageError {
    Io { path: PathBuf, source: io::Error },
    /// Neither the staged file nor its processed counterpart exists.
    SourceMissing(String),
    /// Path is outside the workspace or not valid UTF-8.
    InvalidPath(PathBuf),
}

impl Display for StageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "staging I/O failed for `{}`: {source}", path.display())
            }
            Self::SourceMissing(rel) => write!(f, "staged file is missing: {rel}"),
            Self::InvalidPath(path) => write!(f, "unsupported staging path `{}`", path.display()),
        }
    }
}

impl Error for StageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StageError + '_ {
    move |source| StageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Lists pending inbox files, recursively, in sorted path order.
///
/// Hidden files (leading `.`) are skipped.
pub fn list_pending(workspace: &Workspace) -> StageResult<Vec<PathBuf>> {
    let inbox = workspace.stage_inbox();
    let mut files = Vec::new();
    if inbox.is_dir() {
        collect_files(&inbox, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> StageResult<()> {
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

/// Loads every pending inbox file as a `StagedNote`.
pub fn load_pending(workspace: &Workspace) -> StageResult<Vec<StagedNote>> {
    list_pending(workspace)?
        .iter()
        .map(|path| load_staged_note(workspace, path))
        .collect()
}

/// Reads one staged file and derives its stable identity.
pub fn load_staged_note(workspace: &Workspace, path: &Path) -> StageResult<StagedNote> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(io_error(path))?;
    let source_rel_path = workspace
        .relative(path)
        .ok_or_else(|| StageError::InvalidPath(path.to_path_buf()))?;

    let (frontmatter, body, mut warnings) = parse_frontmatter(&content);
    let body = body.trim().to_string();
    if body.is_empty() {
        warnings.push("body is empty".to_string());
    }

    let content_hash = sha256_hex(&content);
    debug!(
        "event=stage_load module=stage status=ok source={} warnings={}",
        source_rel_path,
        warnings.len()
    );

    Ok(StagedNote {
        entry_id: entry_id_for_hash(&content_hash),
        source_rel_path,
        content_hash,
        created_at: DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Secs, true),
        frontmatter,
        body,
        warnings,
        content,
    })
}

/// Copies `source` into the inbox as `<timestamp>_<name>`.
///
/// A counter is inserted when the name is already taken.
pub fn stage_add(workspace: &Workspace, source: &Path) -> StageResult<PathBuf> {
    if !source.is_file() {
        return Err(StageError::SourceMissing(source.display().to_string()));
    }
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StageError::InvalidPath(source.to_path_buf()))?;

    let inbox = workspace.stage_inbox();
    fs::create_dir_all(&inbox).map_err(io_error(&inbox))?;

    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut destination = inbox.join(format!("{timestamp}_{file_name}"));
    let mut counter = 1;
    while destination.exists() {
        destination = inbox.join(format!("{timestamp}_{counter}_{file_name}"));
        counter += 1;
    }

    fs::copy(source, &destination).map_err(io_error(&destination))?;
    Ok(destination)
}

/// Processed location for a staged file under a given proposal.
///
/// Inbox subfolders are folded into the name with `__`, so `a/note.md`
/// and `b/note.md` never share a destination.
pub fn processed_destination(
    workspace: &Workspace,
    source_rel_path: &str,
    proposal_id: &str,
) -> PathBuf {
    let relative = source_rel_path
        .strip_prefix(INBOX_PREFIX)
        .unwrap_or(source_rel_path);
    let flattened = relative
        .split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("__");
    workspace
        .stage_processed()
        .join(format!("{proposal_id}_{flattened}"))
}

/// Whether the staged source is still pending or was already moved.
pub fn source_available(workspace: &Workspace, source_rel_path: &str, proposal_id: &str) -> bool {
    workspace.resolve(source_rel_path).is_file()
        || processed_destination(workspace, source_rel_path, proposal_id).is_file()
}

/// Moves one staged file into `stage/processed`.
///
/// Returns the destination. Calling it again after a successful move is a
/// no-op that returns the same destination.
pub fn move_to_processed(
    workspace: &Workspace,
    source_rel_path: &str,
    proposal_id: &str,
) -> StageResult<PathBuf> {
    let source = workspace.resolve(source_rel_path);
    let destination = processed_destination(workspace, source_rel_path, proposal_id);

    if !source.is_file() {
        if destination.is_file() {
            debug!(
                "event=stage_move module=stage status=skipped reason=already_moved source={}",
                source_rel_path
            );
            return Ok(destination);
        }
        return Err(StageError::SourceMissing(source_rel_path.to_string()));
    }

    move_file(&source, &destination)?;
    Ok(destination)
}

fn move_file(from: &Path, to: &Path) -> StageResult<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) if rename_err.kind() == io::ErrorKind::CrossesDevices => {
            warn!("event=stage_move module=stage status=fallback reason=cross_device");
            fs::copy(from, to).map_err(io_error(to))?;
            fs::remove_file(from).map_err(io_error(from))
        }
        Err(source) => Err(StageError::Io {
            path: from.to_path_buf(),
            source,
        }),
    }
}

/// Splits `key: value` frontmatter from the body.
///
/// Lines without a colon are dropped with a warning; `#` lines are comments.
fn parse_frontmatter(content: &str) -> (BTreeMap<String, String>, &str, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(captures) = FRONTMATTER_RE.captures(content) else {
        return (BTreeMap::new(), content, warnings);
    };
    let (Some(whole), Some(raw)) = (captures.get(0), captures.get(1)) else {
        return (BTreeMap::new(), content, warnings);
    };

    let mut frontmatter = BTreeMap::new();
    for line in raw.as_str().lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        match stripped.split_once(':') {
            Some((key, value)) => {
                frontmatter.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
            None => warnings.push(format!("frontmatter line ignored (missing ':'): {stripped}")),
        }
    }

    (frontmatter, &content[whole.end()..], warnings)
}

pub(crate) fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{
        list_pending, move_to_processed, parse_frontmatter, sha256_hex, source_available,
        stage_add, StageError,
    };
    use crate::workspace::Workspace;
    use std::fs;

    #[test]
    fn frontmatter_is_split_from_body() {
        let (frontmatter, body, warnings) =
            parse_frontmatter("---\ntitle: \"Plan\"\nbogus line\n# comment\n---\nBody text\n");
        assert_eq!(frontmatter.get("title").map(String::as_str), Some("Plan"));
        assert_eq!(body, "Body text\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bogus line"));
    }

    #[test]
    fn content_without_frontmatter_is_body() {
        let (frontmatter, body, warnings) = parse_frontmatter("just text\n---\n");
        assert!(frontmatter.is_empty());
        assert_eq!(body, "just text\n---\n");
        assert!(warnings.is_empty());
    }

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let digest = sha256_hex("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stage_add_never_overwrites_an_inbox_file() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path().join("ws")).unwrap();
        let source = dir.path().join("note.md");
        fs::write(&source, "raw note").unwrap();

        let first = stage_add(&workspace, &source).unwrap();
        let second = stage_add(&workspace, &source).unwrap();

        assert_ne!(first, second);
        assert_eq!(list_pending(&workspace).unwrap().len(), 2);
        for staged in [&first, &second] {
            assert!(staged.to_string_lossy().ends_with("_note.md"));
            assert_eq!(fs::read_to_string(staged).unwrap(), "raw note");
        }
        assert!(source.is_file());
        assert!(matches!(
            stage_add(&workspace, &dir.path().join("absent.md")),
            Err(StageError::SourceMissing(_))
        ));
    }

    #[test]
    fn same_file_name_in_two_folders_keeps_both_originals() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        for (folder, body) in [("a", "first body"), ("b", "second body")] {
            let folder = workspace.stage_inbox().join(folder);
            fs::create_dir_all(&folder).unwrap();
            fs::write(folder.join("note.md"), body).unwrap();
        }

        let first = move_to_processed(&workspace, "stage/inbox/a/note.md", "p1").unwrap();
        let second = move_to_processed(&workspace, "stage/inbox/b/note.md", "p1").unwrap();

        assert_eq!(first, workspace.stage_processed().join("p1_a__note.md"));
        assert_eq!(second, workspace.stage_processed().join("p1_b__note.md"));
        assert_eq!(fs::read_to_string(first).unwrap(), "first body");
        assert_eq!(fs::read_to_string(second).unwrap(), "second body");
        assert!(source_available(&workspace, "stage/inbox/a/note.md", "p1"));
        assert!(source_available(&workspace, "stage/inbox/b/note.md", "p1"));
    }

    #[test]
    fn move_to_processed_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        fs::write(workspace.stage_inbox().join("a.md"), "body").unwrap();

        let moved = move_to_processed(&workspace, "stage/inbox/a.md", "p1").unwrap();
        assert_eq!(moved, workspace.stage_processed().join("p1_a.md"));
        assert!(!workspace.stage_inbox().join("a.md").exists());
        assert!(source_available(&workspace, "stage/inbox/a.md", "p1"));

        let again = move_to_processed(&workspace, "stage/inbox/a.md", "p1").unwrap();
        assert_eq!(again, moved);
        assert!(matches!(
            move_to_processed(&workspace, "stage/inbox/a.md", "p2"),
            Err(StageError::SourceMissing(_))
        ));
    }
}
