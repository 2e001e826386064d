//! Append-only ledger record shapes.
//!
//! # Invariants
//! - One `IndexRecord` per committed vault path, never rewritten.
//! - One `CommitRecord` per committed proposal, written only after the
//!   version-control commit succeeded.

use super::category::Category;
use serde::{Deserialize, Serialize};

/// Which artifact an index record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Entry,
    Summary,
    BatchSummary,
}

/// One line of `vault/index/entries.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Entry UUID for notes and their summaries; `batch-<hex>` for digests.
    pub entry_id: String,
    pub kind: RecordKind,
    pub category: Option<Category>,
    /// Vault-relative path; unique across the ledger.
    pub path: String,
    pub commit_id: String,
    pub committed_at: String,
    pub proposal_id: String,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_stage_path: Option<String>,
    #[serde(default)]
    pub summary_path: Option<String>,
}

/// One line of `vault/index/commits.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Unique across the ledger.
    pub proposal_id: String,
    pub commit_id: String,
    pub committed_at: String,
    pub entry_ids: Vec<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub committed_entries: usize,
    #[serde(default)]
    pub skipped_duplicates: usize,
    #[serde(default)]
    pub invalid_entries: usize,
}
