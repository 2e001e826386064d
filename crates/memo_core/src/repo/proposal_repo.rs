//! Proposal persistence contracts and file-backed implementation.
//!
//! # Responsibility
//! - Persist pending proposals for human review as JSON plus markdown.
//! - Resolve `latest` and apply the single `pending -> committed` transition.
//!
//! # Invariants
//! - Proposal entries are never rewritten after `save`.
//! - `mark_committed` refuses an already committed proposal.
//! - Every write is temp-file-then-rename.

use crate::model::proposal::{EntryStatus, Proposal, ProposalStatus};
use crate::workspace::{write_atomic, Workspace};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Reference accepted by [`ProposalStore::resolve`] for the newest proposal.
pub const LATEST_REF: &str = "latest";

pub type StoreResult<T> = Result<T, ProposalStoreError>;

#[derive(Debug)]
pub enum ProposalStoreError {
    Io { path: PathBuf, source: io::Error },
    Malformed { path: PathBuf, message: String },
    NotFound(String),
    NoProposals,
    AlreadyCommitted(String),
}

impl Display for ProposalStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "proposal I/O failed for `{}`: {source}", path.display())
            }
            Self::Malformed { path, message } => {
                write!(f, "malformed proposal `{}`: {message}", path.display())
            }
            Self::NotFound(id) => write!(f, "proposal not found: {id}"),
            Self::NoProposals => write!(f, "no proposals found"),
            Self::AlreadyCommitted(id) => write!(f, "proposal already committed: {id}"),
        }
    }
}

impl Error for ProposalStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Review storage for proposals.
pub trait ProposalStore {
    fn save(&self, proposal: &Proposal) -> StoreResult<()>;
    fn load(&self, proposal_id: &str) -> StoreResult<Proposal>;
    /// All stored ids in ascending (creation) order.
    fn list_ids(&self) -> StoreResult<Vec<String>>;

    /// Records the commit outcome; the only mutation after `save`.
    fn mark_committed(
        &self,
        proposal_id: &str,
        commit_id: &str,
        committed_at: &str,
    ) -> StoreResult<Proposal>;

    fn latest_id(&self) -> StoreResult<Option<String>> {
        Ok(self.list_ids()?.pop())
    }

    fn load_latest(&self) -> StoreResult<Proposal> {
        let latest = self.latest_id()?.ok_or(ProposalStoreError::NoProposals)?;
        self.load(&latest)
    }

    /// Maps `latest` or a concrete id to a stored proposal id.
    fn resolve(&self, reference: &str) -> StoreResult<String> {
        if reference == LATEST_REF {
            return self.latest_id()?.ok_or(ProposalStoreError::NoProposals);
        }
        if self.list_ids()?.iter().any(|id| id == reference) {
            Ok(reference.to_string())
        } else {
            Err(ProposalStoreError::NotFound(reference.to_string()))
        }
    }
}

/// Stores proposals under `.memo/proposals/<id>.{json,md}`.
#[derive(Debug, Clone)]
pub struct FileProposalStore {
    dir: PathBuf,
}

impl FileProposalStore {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            dir: workspace.proposals_dir(),
        }
    }

    fn json_path(&self, proposal_id: &str) -> StoreResult<PathBuf> {
        if !is_valid_id(proposal_id) {
            return Err(ProposalStoreError::NotFound(proposal_id.to_string()));
        }
        Ok(self.dir.join(format!("{proposal_id}.json")))
    }

    fn write(&self, proposal: &Proposal) -> StoreResult<()> {
        let json_path = self.json_path(&proposal.proposal_id)?;
        let md_path = self.dir.join(format!("{}.md", proposal.proposal_id));

        let json = serde_json::to_string_pretty(proposal).map_err(|err| {
            ProposalStoreError::Malformed {
                path: json_path.clone(),
                message: err.to_string(),
            }
        })?;
        write_atomic(&json_path, format!("{json}\n").as_bytes()).map_err(|source| {
            ProposalStoreError::Io {
                path: json_path.clone(),
                source,
            }
        })?;
        write_atomic(&md_path, render_review(proposal).as_bytes())
            .map_err(|source| ProposalStoreError::Io {
                path: md_path,
                source,
            })
    }
}

impl ProposalStore for FileProposalStore {
    fn save(&self, proposal: &Proposal) -> StoreResult<()> {
        self.write(proposal)?;
        info!(
            "event=proposal_save module=repo status=ok proposal_id={} items={}",
            proposal.proposal_id, proposal.stats.total_items
        );
        Ok(())
    }

    fn load(&self, proposal_id: &str) -> StoreResult<Proposal> {
        let path = self.json_path(proposal_id)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ProposalStoreError::NotFound(proposal_id.to_string()));
            }
            Err(source) => return Err(ProposalStoreError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|err| ProposalStoreError::Malformed {
            path,
            message: err.to_string(),
        })
    }

    fn list_ids(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ProposalStoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ProposalStoreError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    if is_valid_id(stem) {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn mark_committed(
        &self,
        proposal_id: &str,
        commit_id: &str,
        committed_at: &str,
    ) -> StoreResult<Proposal> {
        let mut proposal = self.load(proposal_id)?;
        if proposal.is_committed() {
            return Err(ProposalStoreError::AlreadyCommitted(proposal_id.to_string()));
        }
        proposal.status = ProposalStatus::Committed;
        proposal.commit_id = Some(commit_id.to_string());
        proposal.committed_at = Some(committed_at.to_string());
        self.write(&proposal)?;
        info!(
            "event=proposal_mark_committed module=repo status=ok proposal_id={} commit_id={}",
            proposal_id, commit_id
        );
        Ok(proposal)
    }
}

fn is_valid_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Human-readable review page for one proposal.
pub fn render_review(proposal: &Proposal) -> String {
    let stats = &proposal.stats;
    let status = match proposal.status {
        ProposalStatus::Pending => "pending",
        ProposalStatus::Committed => "committed",
    };
    let mut lines = vec![
        format!("# Proposal {}", proposal.proposal_id),
        String::new(),
        format!("Created: {}", proposal.created_at),
        format!("Status: {status}"),
        format!("Total items: {}", stats.total_items),
        format!("Ready items: {}", stats.ready_items),
        format!("Invalid items: {}", stats.invalid_items),
        format!("Duplicate items: {}", stats.duplicate_items),
        format!("Summary items: {}", stats.summary_items),
        String::new(),
        format!("Commit preview: `{}`", proposal.commit_message_preview),
    ];
    if let Some(commit_id) = &proposal.commit_id {
        lines.push(format!("Commit: `{commit_id}`"));
    }
    if let Some(config) = &proposal.config_snapshot {
        let summarization = &config.summarization;
        lines.extend([
            String::new(),
            "## Policy".to_string(),
            String::new(),
            format!("- batch policy: {}", summarization.batch_policy.as_str()),
            format!("- index summaries: {}", summarization.index_summaries),
            format!("- summary min words: {}", summarization.min_words),
            format!("- batch trigger count: {}", summarization.batch_trigger_count),
            format!(
                "- redundancy threshold: {}",
                summarization.redundancy_similarity_threshold
            ),
        ]);
    }
    lines.push(String::new());
    lines.push("## Items".to_string());

    for entry in &proposal.entries {
        let entry_status = match entry.status {
            EntryStatus::Ready => "ready",
            EntryStatus::Invalid => "invalid",
            EntryStatus::Duplicate => "duplicate",
        };
        lines.extend([
            String::new(),
            format!("### {}", entry.entry_id),
            format!("- status: {entry_status}"),
            format!("- source: `{}`", entry.source_stage_path),
            format!("- category: `{}`", entry.category()),
            format!("- confidence: {}", entry.classification.confidence),
            format!("- tags: {}", entry.classification.tags.join(", ")),
            format!("- target entry: `{}`", entry.target_entry_path),
            format!(
                "- target summary: `{}`",
                entry.target_summary_path.as_deref().unwrap_or("-")
            ),
        ]);
        if let Some(reason) = &entry.invalid_reason {
            lines.push(format!("- invalid reason: {reason}"));
        }
        if !entry.warnings.is_empty() {
            lines.push(format!("- warnings: {}", entry.warnings.join("; ")));
        }
        if let Some(summary) = &entry.summary {
            let signals: Vec<&str> = summary.triggered_by.iter().map(|s| s.as_str()).collect();
            lines.push(format!("- summary trigger: {}", signals.join(", ")));
        }
    }

    if let Some(batch) = &proposal.batch_summary {
        lines.extend([
            String::new(),
            "## Batch summary".to_string(),
            String::new(),
            format!("- path: `{}`", batch.path),
            format!("- entries: {}", batch.entry_ids.len()),
        ]);
    }

    lines.push(String::new());
    lines.join("\n")
}
