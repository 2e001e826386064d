//! Proposal commit use-case.
//!
//! # Responsibility
//! - Apply one approved proposal to the vault under the exclusive vault lock.
//! - Produce exactly one version-control commit and one ledger record set
//!   per proposal, healing partially applied attempts on retry.
//!
//! # Invariants
//! - Every precondition and conflict check runs before the first write.
//! - Ledger records are appended only after the version-control commit
//!   succeeded; the commit record lands after its index records.
//! - A committed proposal is never applied again; a retry is a no-op.
//!
//! # Recovery
//! Each step is detectable on retry, so an interrupted commit resumes:
//! - artifacts on disk equal to their rendering count as written;
//! - sources already in `stage/processed` count as moved;
//! - clean target paths reuse the commit whose message names the proposal,
//!   and get an empty commit of their own when no such commit exists;
//! - index records already present are not appended twice;
//! - a commit record without a committed proposal heals the proposal status.

use crate::config::AppConfig;
use crate::lock::{LockError, VaultLock};
use crate::model::ledger::{CommitRecord, IndexRecord, RecordKind};
use crate::model::note::EntryId;
use crate::model::proposal::{
    commit_message, EntryStatus, Proposal, ProposalEntry, ProposalValidationError,
};
use crate::repo::ledger_repo::{Indexer, LedgerError};
use crate::repo::proposal_repo::{FileProposalStore, ProposalStore, ProposalStoreError};
use crate::repo::vault_repo::{planned_artifacts, read_artifact, write_artifact, VaultArtifact};
use crate::stage::{self, StageError};
use crate::vcs::{CommitId, GitCli, VcsError, VersionControl};
use crate::workspace::Workspace;
use chrono::{SecondsFormat, Utc};
use log::{error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::time::Instant;

/// Coarse error classes shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitErrorKind {
    Validation,
    Conflict,
    Precondition,
    Noop,
    Io,
}

impl CommitErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Precondition => "precondition",
            Self::Noop => "noop",
            Self::Io => "io",
        }
    }
}

#[derive(Debug)]
pub enum CommitError {
    ProposalNotFound(String),
    AlreadyCommitted {
        proposal_id: String,
        commit_id: Option<String>,
    },
    /// A target path is owned by another proposal or holds foreign content.
    TargetConflict { path: String, reason: String },
    Validation(ProposalValidationError),
    RepoNotInitialized,
    VaultLocked,
    StagedSourceMissing(String),
    Vcs(VcsError),
    Ledger(LedgerError),
    Store(ProposalStoreError),
    Stage(StageError),
    Io(io::Error),
}

impl CommitError {
    /// Retrying a committed proposal reports this instead of failing.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::AlreadyCommitted { .. })
    }

    pub fn kind(&self) -> CommitErrorKind {
        match self {
            Self::Validation(_) => CommitErrorKind::Validation,
            Self::TargetConflict { .. } => CommitErrorKind::Conflict,
            Self::ProposalNotFound(_)
            | Self::RepoNotInitialized
            | Self::VaultLocked
            | Self::StagedSourceMissing(_) => CommitErrorKind::Precondition,
            Self::AlreadyCommitted { .. } => CommitErrorKind::Noop,
            Self::Vcs(_) | Self::Ledger(_) | Self::Store(_) | Self::Stage(_) | Self::Io(_) => {
                CommitErrorKind::Io
            }
        }
    }
}

impl Display for CommitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProposalNotFound(id) => write!(f, "proposal not found: {id}"),
            Self::AlreadyCommitted {
                proposal_id,
                commit_id,
            } => write!(
                f,
                "proposal {proposal_id} already committed as {}",
                commit_id.as_deref().unwrap_or("-")
            ),
            Self::TargetConflict { path, reason } => {
                write!(f, "target conflict at `{path}`: {reason}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::RepoNotInitialized => write!(f, "version-control repository is not initialized"),
            Self::VaultLocked => write!(f, "vault is locked by another commit"),
            Self::StagedSourceMissing(path) => write!(f, "staged source is missing: {path}"),
            Self::Vcs(err) => write!(f, "{err}"),
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Stage(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CommitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Vcs(err) => Some(err),
            Self::Ledger(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Stage(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProposalValidationError> for CommitError {
    fn from(value: ProposalValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<VcsError> for CommitError {
    fn from(value: VcsError) -> Self {
        match value {
            VcsError::NotInitialized(_) => Self::RepoNotInitialized,
            other => Self::Vcs(other),
        }
    }
}

impl From<LedgerError> for CommitError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ProposalStoreError> for CommitError {
    fn from(value: ProposalStoreError) -> Self {
        match value {
            ProposalStoreError::NotFound(id) => Self::ProposalNotFound(id),
            ProposalStoreError::NoProposals => Self::ProposalNotFound("latest".to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<StageError> for CommitError {
    fn from(value: StageError) -> Self {
        match value {
            StageError::SourceMissing(path) => Self::StagedSourceMissing(path),
            other => Self::Stage(other),
        }
    }
}

impl From<LockError> for CommitError {
    fn from(value: LockError) -> Self {
        match value {
            LockError::Held(_) => Self::VaultLocked,
            LockError::Io { source, .. } => Self::Io(source),
        }
    }
}

impl From<io::Error> for CommitError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub proposal_id: String,
    pub commit_id: CommitId,
    pub committed_entries: usize,
    pub skipped_duplicates: usize,
    pub invalid_entries: usize,
    /// Targets found already applied by an earlier interrupted attempt.
    pub reconciled_paths: Vec<String>,
    pub message: String,
}

/// Applies approved proposals to the vault.
pub struct CommitEngine<V: VersionControl, P: ProposalStore> {
    workspace: Workspace,
    config: AppConfig,
    vcs: V,
    store: P,
    indexer: Indexer,
}

/// Engine wired with `git` and the file proposal store.
pub type DefaultCommitEngine = CommitEngine<GitCli, FileProposalStore>;

impl DefaultCommitEngine {
    pub fn with_defaults(workspace: Workspace, config: AppConfig) -> Self {
        let vcs = GitCli::from_config(workspace.root(), &config.git);
        let store = FileProposalStore::new(&workspace);
        Self::new(workspace, config, vcs, store)
    }
}

/// Per-target outcome of reconciliation.
enum TargetState {
    /// Already indexed by this proposal.
    Indexed,
    /// On disk with the expected bytes but not indexed yet.
    Present,
    Missing,
}

impl<V: VersionControl, P: ProposalStore> CommitEngine<V, P> {
    pub fn new(workspace: Workspace, config: AppConfig, vcs: V, store: P) -> Self {
        let indexer = Indexer::new(&workspace);
        Self {
            workspace,
            config,
            vcs,
            store,
            indexer,
        }
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Commits the proposal named by `proposal_ref` (`latest` or an id).
    ///
    /// # Errors
    /// - `VaultLocked` when another commit holds the vault lock.
    /// - `AlreadyCommitted` when the proposal was committed before (no-op).
    /// - `TargetConflict` / `Validation` / precondition errors before any write.
    /// - `Vcs` when the commit fails; no ledger record is written then and a
    ///   retry resumes from the files already in place.
    pub fn commit(&self, proposal_ref: &str) -> Result<CommitReport, CommitError> {
        let started_at = Instant::now();
        info!(
            "event=commit_apply module=service status=start proposal_ref={}",
            proposal_ref
        );

        let result = self.commit_locked(proposal_ref);
        match &result {
            Ok(report) => info!(
                "event=commit_apply module=service status=ok duration_ms={} proposal_id={} commit_id={} entries={} duplicates={} invalid={} reconciled={}",
                started_at.elapsed().as_millis(),
                report.proposal_id,
                report.commit_id,
                report.committed_entries,
                report.skipped_duplicates,
                report.invalid_entries,
                report.reconciled_paths.len()
            ),
            Err(err) if err.is_noop() => info!(
                "event=commit_apply module=service status=noop duration_ms={} proposal_ref={}",
                started_at.elapsed().as_millis(),
                proposal_ref
            ),
            Err(err) => error!(
                "event=commit_apply module=service status=error duration_ms={} error_kind={} error={}",
                started_at.elapsed().as_millis(),
                err.kind().as_str(),
                err
            ),
        }
        result
    }

    fn commit_locked(&self, proposal_ref: &str) -> Result<CommitReport, CommitError> {
        let lock = VaultLock::acquire(&self.workspace)?;

        let proposal_id = self.store.resolve(proposal_ref)?;
        let proposal = self.store.load(&proposal_id)?;
        if proposal.is_committed() {
            return Err(CommitError::AlreadyCommitted {
                proposal_id,
                commit_id: proposal.commit_id,
            });
        }
        if let Some(record) = self.indexer.find_commit(&proposal_id)? {
            warn!(
                "event=commit_apply module=service status=healed proposal_id={} reason=ledger_ahead_of_store",
                proposal_id
            );
            self.store
                .mark_committed(&proposal_id, &record.commit_id, &record.committed_at)?;
            return Err(CommitError::AlreadyCommitted {
                proposal_id,
                commit_id: Some(record.commit_id),
            });
        }

        if !self.vcs.is_initialized() {
            return Err(CommitError::RepoNotInitialized);
        }
        proposal.validate()?;
        for entry in proposal.ready_entries() {
            if !stage::source_available(&self.workspace, &entry.source_stage_path, &proposal_id) {
                return Err(CommitError::StagedSourceMissing(
                    entry.source_stage_path.clone(),
                ));
            }
        }

        let late_duplicates = self.late_duplicates(&proposal)?;
        let artifacts = planned_artifacts(&proposal, |entry| {
            late_duplicates.contains(&entry.entry_id)
        });
        let states = self.reconcile(&proposal_id, &artifacts)?;

        // Point of no return: everything below mutates disk.
        for (artifact, state) in artifacts.iter().zip(&states) {
            if matches!(state, TargetState::Missing) {
                write_artifact(&self.workspace, artifact.path, &artifact.contents)?;
            }
        }
        for entry in proposal.ready_entries() {
            stage::move_to_processed(&self.workspace, &entry.source_stage_path, &proposal_id)?;
        }

        let entry_ids: Vec<String> = proposal
            .ready_entries()
            .filter(|entry| !late_duplicates.contains(&entry.entry_id))
            .map(|entry| entry.entry_id.to_string())
            .collect();
        let committed_entries = entry_ids.len();
        let skipped_duplicates =
            proposal.count_with_status(EntryStatus::Duplicate) + late_duplicates.len();
        let invalid_entries = proposal.count_with_status(EntryStatus::Invalid);
        let message = commit_message(
            &self.config.git.commit_prefix,
            &proposal_id,
            committed_entries,
            skipped_duplicates,
            invalid_entries,
        );

        let paths: Vec<String> = artifacts
            .iter()
            .map(|artifact| artifact.path.to_string())
            .collect();
        let commit_id = self.vcs_commit(&proposal_id, &paths, &message)?;
        let committed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut tx = self.indexer.begin(&lock)?;
        for artifact in &artifacts {
            if tx.is_indexed(artifact.path) {
                continue;
            }
            if artifact.kind == RecordKind::Summary && !self.config.summarization.index_summaries
            {
                continue;
            }
            tx.push_index(index_record(
                artifact,
                &proposal,
                &commit_id,
                &committed_at,
            ))?;
        }
        tx.push_commit(CommitRecord {
            proposal_id: proposal_id.clone(),
            commit_id: commit_id.clone(),
            committed_at: committed_at.clone(),
            entry_ids,
            message: message.clone(),
            committed_entries,
            skipped_duplicates,
            invalid_entries,
        })?;
        tx.apply()?;

        self.store
            .mark_committed(&proposal_id, &commit_id, &committed_at)?;

        let reconciled_paths = artifacts
            .iter()
            .zip(&states)
            .filter(|(_, state)| !matches!(state, TargetState::Missing))
            .map(|(artifact, _)| artifact.path.to_string())
            .collect();

        Ok(CommitReport {
            proposal_id,
            commit_id,
            committed_entries,
            skipped_duplicates,
            invalid_entries,
            reconciled_paths,
            message,
        })
    }

    /// Ready entries whose content another proposal committed after this
    /// one was built.
    fn late_duplicates(&self, proposal: &Proposal) -> Result<BTreeSet<EntryId>, CommitError> {
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        for record in self.indexer.entries().iter()? {
            let record = record?;
            if record.kind == RecordKind::Entry {
                if let Some(hash) = record.content_hash {
                    owners.entry(hash).or_insert(record.proposal_id);
                }
            }
        }

        Ok(proposal
            .ready_entries()
            .filter(|entry| {
                owners
                    .get(&entry.content_hash)
                    .is_some_and(|owner| owner != &proposal.proposal_id)
            })
            .map(|entry| entry.entry_id)
            .collect())
    }

    fn reconcile(
        &self,
        proposal_id: &str,
        artifacts: &[VaultArtifact<'_>],
    ) -> Result<Vec<TargetState>, CommitError> {
        let indexed = self.indexer.records_by_path()?;
        let mut states = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            if let Some(record) = indexed.get(artifact.path) {
                if record.proposal_id != proposal_id {
                    return Err(CommitError::TargetConflict {
                        path: artifact.path.to_string(),
                        reason: format!("indexed by proposal {}", record.proposal_id),
                    });
                }
                states.push(TargetState::Indexed);
                continue;
            }

            match read_artifact(&self.workspace, artifact.path)? {
                None => states.push(TargetState::Missing),
                Some(existing) if existing == artifact.contents => {
                    states.push(TargetState::Present);
                }
                Some(_) => {
                    return Err(CommitError::TargetConflict {
                        path: artifact.path.to_string(),
                        reason: "file exists with different content".to_string(),
                    });
                }
            }
        }
        Ok(states)
    }

    /// Reuses the commit an interrupted attempt already made for this
    /// proposal; otherwise records a new one.
    fn vcs_commit(
        &self,
        proposal_id: &str,
        paths: &[String],
        message: &str,
    ) -> Result<CommitId, CommitError> {
        let clean = paths.is_empty() || self.vcs.status(paths)?.is_empty();
        if clean {
            if let Some(found) = self.vcs.find_commit(proposal_id, paths)? {
                info!(
                    "event=commit_apply module=service status=reused_commit proposal_id={} commit_id={}",
                    proposal_id, found
                );
                return Ok(found);
            }
            if !paths.is_empty() {
                // Targets already tracked by a commit that is not ours.
                info!(
                    "event=commit_apply module=service status=empty_commit proposal_id={} paths={}",
                    proposal_id,
                    paths.len()
                );
                return Ok(self.vcs.commit(&[], message)?);
            }
        }
        Ok(self.vcs.commit(paths, message)?)
    }
}

fn index_record(
    artifact: &VaultArtifact<'_>,
    proposal: &Proposal,
    commit_id: &str,
    committed_at: &str,
) -> IndexRecord {
    let base = |entry_id: String| IndexRecord {
        entry_id,
        kind: artifact.kind,
        category: None,
        path: artifact.path.to_string(),
        commit_id: commit_id.to_string(),
        committed_at: committed_at.to_string(),
        proposal_id: proposal.proposal_id.clone(),
        content_hash: None,
        tags: Vec::new(),
        source_stage_path: None,
        summary_path: None,
    };

    match (artifact.kind, artifact.entry) {
        (RecordKind::Entry, Some(entry)) => IndexRecord {
            category: Some(entry.category()),
            content_hash: Some(entry.content_hash.clone()),
            tags: entry.classification.tags.clone(),
            source_stage_path: Some(entry.source_stage_path.clone()),
            summary_path: summary_path(entry),
            ..base(entry.entry_id.to_string())
        },
        (_, Some(entry)) => IndexRecord {
            category: Some(entry.category()),
            ..base(entry.entry_id.to_string())
        },
        (_, None) => {
            let summary_id = proposal
                .batch_summary
                .as_ref()
                .map(|batch| batch.summary_id.clone())
                .unwrap_or_default();
            base(summary_id)
        }
    }
}

fn summary_path(entry: &ProposalEntry) -> Option<String> {
    entry
        .summary
        .as_ref()
        .and(entry.target_summary_path.clone())
}
