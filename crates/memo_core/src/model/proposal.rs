//! Proposal domain model.
//!
//! # Responsibility
//! - Describe a reviewable, uncommitted set of vault writes.
//! - Validate declaration-level invariants before any side effect.
//!
//! # Invariants
//! - Entries are immutable after creation.
//! - `status` only moves `pending -> committed`; there is no way back.
//! - Target paths are unique within one proposal and live under `vault/`.

use super::category::Category;
use crate::config::AppConfig;
use super::note::{Classification, EntryId, Summary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Vault directory holding generated summaries.
pub const SUMMARY_FOLDER: &str = "summaries";

/// Persisted proposal lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Committed,
}

/// Per-entry readiness decided at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Will be written on commit.
    Ready,
    /// Rejected at build time (e.g. empty body); kept for review only.
    Invalid,
    /// Content hash already present in the entry index; skipped on commit.
    Duplicate,
}

/// One note's planned vault write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalEntry {
    pub entry_id: EntryId,
    pub source_stage_path: String,
    pub content_hash: String,
    pub created_at: String,
    pub body: String,
    #[serde(default)]
    pub frontmatter: BTreeMap<String, String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub classification: Classification,
    #[serde(default)]
    pub summary: Option<Summary>,
    pub target_entry_path: String,
    #[serde(default)]
    pub target_summary_path: Option<String>,
    pub status: EntryStatus,
    #[serde(default)]
    pub invalid_reason: Option<String>,
}

impl ProposalEntry {
    pub fn is_ready(&self) -> bool {
        self.status == EntryStatus::Ready
    }

    pub fn category(&self) -> Category {
        self.classification.category
    }
}

/// Digest covering every ready note of a batch-triggered run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// `batch-<12 hex>`, derived from the sorted entry ids.
    pub summary_id: String,
    pub path: String,
    pub entry_ids: Vec<EntryId>,
    pub summary: Summary,
}

/// Counters shown during review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalStats {
    pub total_items: usize,
    pub ready_items: usize,
    pub invalid_items: usize,
    pub duplicate_items: usize,
    pub summary_items: usize,
}

/// Reviewable description of what a commit will write to the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub created_at: String,
    pub entries: Vec<ProposalEntry>,
    #[serde(default)]
    pub batch_summary: Option<BatchSummary>,
    pub stats: ProposalStats,
    pub commit_message_preview: String,
    pub status: ProposalStatus,
    #[serde(default)]
    pub committed_at: Option<String>,
    #[serde(default)]
    pub commit_id: Option<String>,
    /// Configuration the proposal was built under.
    #[serde(default)]
    pub config_snapshot: Option<AppConfig>,
}

impl Proposal {
    pub fn is_committed(&self) -> bool {
        self.status == ProposalStatus::Committed
    }

    pub fn ready_entries(&self) -> impl Iterator<Item = &ProposalEntry> {
        self.entries.iter().filter(|entry| entry.is_ready())
    }

    pub fn count_with_status(&self, status: EntryStatus) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }

    /// Every vault path this proposal writes, in write order.
    pub fn write_targets(&self) -> Vec<&str> {
        let mut targets = Vec::new();
        for entry in self.ready_entries() {
            targets.push(entry.target_entry_path.as_str());
            if entry.summary.is_some() {
                if let Some(path) = entry.target_summary_path.as_deref() {
                    targets.push(path);
                }
            }
        }
        if let Some(batch) = &self.batch_summary {
            targets.push(batch.path.as_str());
        }
        targets
    }

    /// Checks declaration-level invariants without touching disk.
    ///
    /// # Errors
    /// - `InvalidTargetPath` when a target escapes `vault/` or has the wrong folder.
    /// - `DuplicateTarget` when two ready writes share one path.
    /// - `MissingSummary` when a summary path is declared without a summary.
    pub fn validate(&self) -> Result<(), ProposalValidationError> {
        if self.proposal_id.trim().is_empty() {
            return Err(ProposalValidationError::EmptyProposalId);
        }

        for entry in self.ready_entries() {
            let expected_folder = entry.category().folder();
            validate_vault_path(&entry.target_entry_path, expected_folder)?;
            match (&entry.summary, &entry.target_summary_path) {
                (Some(_), Some(path)) => validate_vault_path(path, SUMMARY_FOLDER)?,
                (None, Some(_)) => {
                    return Err(ProposalValidationError::MissingSummary(entry.entry_id));
                }
                _ => {}
            }
        }
        if let Some(batch) = &self.batch_summary {
            validate_vault_path(&batch.path, SUMMARY_FOLDER)?;
        }

        let mut seen = BTreeSet::new();
        for target in self.write_targets() {
            if !seen.insert(target) {
                return Err(ProposalValidationError::DuplicateTarget(target.to_string()));
            }
        }
        Ok(())
    }
}

/// Generates a sortable proposal id: `YYYYMMDDTHHMMSSZ_<8 hex>`.
pub fn new_proposal_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Commit message shared by the proposal preview and the final commit.
pub fn commit_message(
    prefix: &str,
    proposal_id: &str,
    entries: usize,
    duplicates: usize,
    invalid: usize,
) -> String {
    format!(
        "{prefix} apply proposal {proposal_id} ({entries} entries, {duplicates} duplicates, {invalid} invalid)"
    )
}

/// Vault-relative entry path: `vault/<folder>/<entry_id>.md`.
pub fn entry_target_path(entry_id: EntryId, category: Category) -> String {
    format!("vault/{}/{entry_id}.md", category.folder())
}

/// Vault-relative summary path: `vault/summaries/<name>.md`.
pub fn summary_target_path(name: &str) -> String {
    format!("vault/{SUMMARY_FOLDER}/{name}.md")
}

fn validate_vault_path(path: &str, folder: &str) -> Result<(), ProposalValidationError> {
    let mut parts = path.split('/');
    let well_formed = parts.next() == Some("vault")
        && parts.next() == Some(folder)
        && parts
            .next()
            .is_some_and(|name| name.ends_with(".md") && name.len() > 3 && !name.starts_with('.'))
        && parts.next().is_none();
    if !well_formed || path.contains('\\') {
        return Err(ProposalValidationError::InvalidTargetPath(path.to_string()));
    }
    Ok(())
}

/// Declaration-level proposal errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalValidationError {
    EmptyProposalId,
    InvalidTargetPath(String),
    DuplicateTarget(String),
    MissingSummary(EntryId),
}

impl Display for ProposalValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyProposalId => write!(f, "proposal id cannot be empty"),
            Self::InvalidTargetPath(path) => write!(f, "invalid vault target path `{path}`"),
            Self::DuplicateTarget(path) => {
                write!(f, "two proposal entries resolve to the same target `{path}`")
            }
            Self::MissingSummary(entry_id) => {
                write!(f, "entry {entry_id} declares a summary path without a summary")
            }
        }
    }
}

impl Error for ProposalValidationError {}
