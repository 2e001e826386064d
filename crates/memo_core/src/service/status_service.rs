//! Read-only workspace status snapshot.

use crate::repo::ledger_repo::{Indexer, LedgerError};
use crate::repo::proposal_repo::{ProposalStore, ProposalStoreError};
use crate::stage::{self, StageError};
use crate::vcs::VersionControl;
use crate::workspace::Workspace;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum StatusError {
    Stage(StageError),
    Store(ProposalStoreError),
    Ledger(LedgerError),
}

impl Display for StatusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Ledger(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StatusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Stage(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Ledger(err) => Some(err),
        }
    }
}

impl From<StageError> for StatusError {
    fn from(value: StageError) -> Self {
        Self::Stage(value)
    }
}

impl From<ProposalStoreError> for StatusError {
    fn from(value: ProposalStoreError) -> Self {
        Self::Store(value)
    }
}

impl From<LedgerError> for StatusError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceStatus {
    pub pending_stage_files: usize,
    pub saved_proposals: usize,
    pub latest_proposal_id: Option<String>,
    pub last_committed_proposal_id: Option<String>,
    pub last_commit_id: Option<String>,
    pub repo_initialized: bool,
}

/// Collects counts from the inbox, the proposal store and the commit ledger.
pub fn workspace_status(
    workspace: &Workspace,
    store: &impl ProposalStore,
    vcs: &impl VersionControl,
) -> Result<WorkspaceStatus, StatusError> {
    let pending_stage_files = stage::list_pending(workspace)?.len();
    let proposal_ids = store.list_ids()?;
    let last_commit = Indexer::new(workspace).last_commit()?;

    Ok(WorkspaceStatus {
        pending_stage_files,
        saved_proposals: proposal_ids.len(),
        latest_proposal_id: proposal_ids.last().cloned(),
        last_committed_proposal_id: last_commit.as_ref().map(|record| record.proposal_id.clone()),
        last_commit_id: last_commit.map(|record| record.commit_id),
        repo_initialized: vcs.is_initialized(),
    })
}

impl Display for WorkspaceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pending staged files: {}", self.pending_stage_files)?;
        writeln!(f, "Saved proposals: {}", self.saved_proposals)?;
        writeln!(
            f,
            "Latest proposal: {}",
            self.latest_proposal_id.as_deref().unwrap_or("-")
        )?;
        writeln!(
            f,
            "Last committed proposal: {}",
            self.last_committed_proposal_id.as_deref().unwrap_or("-")
        )?;
        writeln!(
            f,
            "Last commit: {}",
            self.last_commit_id.as_deref().unwrap_or("-")
        )?;
        write!(
            f,
            "Repository: {}",
            if self.repo_initialized {
                "initialized"
            } else {
                "missing"
            }
        )
    }
}
