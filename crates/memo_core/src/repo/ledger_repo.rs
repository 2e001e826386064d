//! Append-only JSONL ledgers for committed vault state.
//!
//! # Responsibility
//! - Read `entries.jsonl` and `commits.jsonl` lazily, one record per line.
//! - Append index and commit records through one locked transaction.
//!
//! # Invariants
//! - Existing bytes are never rewritten; every append lands after them.
//! - A vault path appears in at most one `IndexRecord`.
//! - A proposal id appears in at most one `CommitRecord`.
//! - A malformed line fails the read instead of being skipped.

use crate::lock::VaultLock;
use crate::model::ledger::{CommitRecord, IndexRecord, RecordKind};
use crate::workspace::Workspace;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Lines, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug)]
pub enum LedgerError {
    Io { path: PathBuf, source: io::Error },
    /// Line `line` (1-based) is not a valid record.
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
    DuplicatePath(String),
    DuplicateProposal(String),
    /// The supplied lock guard does not cover this ledger directory.
    Locked(PathBuf),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "ledger I/O failed for `{}`: {source}", path.display())
            }
            Self::Malformed {
                path,
                line,
                message,
            } => write!(
                f,
                "malformed ledger line {line} in `{}`: {message}",
                path.display()
            ),
            Self::DuplicatePath(path) => write!(f, "vault path already indexed: {path}"),
            Self::DuplicateProposal(id) => write!(f, "proposal already recorded: {id}"),
            Self::Locked(path) => {
                write!(f, "ledger append requires the lock at `{}`", path.display())
            }
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One JSONL file of `T` records.
#[derive(Debug, Clone)]
pub struct JsonlLedger<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonlLedger<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: DeserializeOwned> JsonlLedger<T> {
    /// Opens a fresh pass over the file; a missing file yields no records.
    pub fn iter(&self) -> LedgerResult<LedgerIter<T>> {
        let lines = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(LedgerIter {
            path: self.path.clone(),
            lines,
            line_no: 0,
            _record: PhantomData,
        })
    }

    pub fn read_all(&self) -> LedgerResult<Vec<T>> {
        self.iter()?.collect()
    }
}

impl<T: Serialize> JsonlLedger<T> {
    /// Appends every record in one buffered write followed by fsync.
    fn append_all(&self, records: &[T]) -> LedgerResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buffer = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|err| LedgerError::Io {
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, err),
            })?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let io_error = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_error)?;
        file.write_all(buffer.as_bytes()).map_err(io_error)?;
        file.sync_all().map_err(io_error)
    }
}

/// Lazy line-by-line reader returned by [`JsonlLedger::iter`].
pub struct LedgerIter<T> {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for LedgerIter<T> {
    type Item = LedgerResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    self.lines = None;
                    return Some(Err(LedgerError::Io {
                        path: self.path.clone(),
                        source,
                    }));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str(&line).map_err(|err| LedgerError::Malformed {
                path: self.path.clone(),
                line: self.line_no,
                message: err.to_string(),
            });
            if parsed.is_err() {
                self.lines = None;
            }
            return Some(parsed);
        }
    }
}

/// Read access to both ledgers plus the only append path.
#[derive(Debug, Clone)]
pub struct Indexer {
    entries: JsonlLedger<IndexRecord>,
    commits: JsonlLedger<CommitRecord>,
    lock_path: PathBuf,
}

impl Indexer {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            entries: JsonlLedger::new(workspace.entries_index()),
            commits: JsonlLedger::new(workspace.commits_index()),
            lock_path: workspace.lock_path(),
        }
    }

    pub fn entries(&self) -> &JsonlLedger<IndexRecord> {
        &self.entries
    }

    pub fn commits(&self) -> &JsonlLedger<CommitRecord> {
        &self.commits
    }

    /// Index records keyed by vault path.
    pub fn records_by_path(&self) -> LedgerResult<BTreeMap<String, IndexRecord>> {
        let mut by_path = BTreeMap::new();
        for record in self.entries.iter()? {
            let record = record?;
            by_path.insert(record.path.clone(), record);
        }
        Ok(by_path)
    }

    /// Content hashes of every committed note entry.
    pub fn entry_hashes(&self) -> LedgerResult<BTreeSet<String>> {
        let mut hashes = BTreeSet::new();
        for record in self.entries.iter()? {
            let record = record?;
            if record.kind == RecordKind::Entry {
                if let Some(hash) = record.content_hash {
                    hashes.insert(hash);
                }
            }
        }
        Ok(hashes)
    }

    pub fn find_commit(&self, proposal_id: &str) -> LedgerResult<Option<CommitRecord>> {
        for record in self.commits.iter()? {
            let record = record?;
            if record.proposal_id == proposal_id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Most recently appended commit record.
    pub fn last_commit(&self) -> LedgerResult<Option<CommitRecord>> {
        let mut last = None;
        for record in self.commits.iter()? {
            last = Some(record?);
        }
        Ok(last)
    }

    /// Starts an append transaction under the held vault lock.
    ///
    /// Existing paths and proposal ids are loaded once here; every staged
    /// record is checked against them and against the rest of the batch.
    ///
    /// # Errors
    /// - `Locked` when `lock` guards a different workspace.
    /// - `Malformed`/`Io` when an existing ledger cannot be read.
    pub fn begin<'a>(&'a self, lock: &'a VaultLock) -> LedgerResult<LedgerTransaction<'a>> {
        if lock.path() != self.lock_path {
            return Err(LedgerError::Locked(self.lock_path.clone()));
        }

        let mut known_paths = BTreeSet::new();
        for record in self.entries.iter()? {
            known_paths.insert(record?.path);
        }
        let mut known_proposals = BTreeSet::new();
        for record in self.commits.iter()? {
            known_proposals.insert(record?.proposal_id);
        }

        Ok(LedgerTransaction {
            indexer: self,
            _lock: lock,
            known_paths,
            known_proposals,
            index_records: Vec::new(),
            commit_records: Vec::new(),
        })
    }
}

/// Pending appends validated for uniqueness; nothing hits disk until `apply`.
pub struct LedgerTransaction<'a> {
    indexer: &'a Indexer,
    _lock: &'a VaultLock,
    known_paths: BTreeSet<String>,
    known_proposals: BTreeSet<String>,
    index_records: Vec<IndexRecord>,
    commit_records: Vec<CommitRecord>,
}

impl LedgerTransaction<'_> {
    pub fn is_indexed(&self, path: &str) -> bool {
        self.known_paths.contains(path)
    }

    pub fn push_index(&mut self, record: IndexRecord) -> LedgerResult<()> {
        if !self.known_paths.insert(record.path.clone()) {
            return Err(LedgerError::DuplicatePath(record.path));
        }
        self.index_records.push(record);
        Ok(())
    }

    pub fn push_commit(&mut self, record: CommitRecord) -> LedgerResult<()> {
        if !self.known_proposals.insert(record.proposal_id.clone()) {
            return Err(LedgerError::DuplicateProposal(record.proposal_id));
        }
        self.commit_records.push(record);
        Ok(())
    }

    /// Appends index records, then commit records.
    ///
    /// The commit record lands last so its presence implies the index
    /// records for that proposal are durable.
    pub fn apply(self) -> LedgerResult<(usize, usize)> {
        let started_at = Instant::now();
        let counts = (self.index_records.len(), self.commit_records.len());

        let result = self
            .indexer
            .entries
            .append_all(&self.index_records)
            .and_then(|()| self.indexer.commits.append_all(&self.commit_records));

        match &result {
            Ok(()) => info!(
                "event=ledger_append module=repo status=ok duration_ms={} index_records={} commit_records={}",
                started_at.elapsed().as_millis(),
                counts.0,
                counts.1
            ),
            Err(err) => error!(
                "event=ledger_append module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result.map(|()| counts)
    }
}
