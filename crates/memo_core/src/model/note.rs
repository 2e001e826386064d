//! Staged and classified note models.
//!
//! # Responsibility
//! - Represent raw staged notes and their per-run classification results.
//! - Carry generated summaries alongside the note they describe.
//!
//! # Invariants
//! - `entry_id` is derived from the raw content hash and is stable across runs.
//! - `StagedNote` is immutable until its proposal is committed.
//! - `ClassifiedNote` never outlives one processing run.

use super::category::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one note, derived from its content hash.
pub type EntryId = Uuid;

/// Derives the stable entry id from a SHA-256 content hash.
pub fn entry_id_for_hash(content_hash: &str) -> EntryId {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, content_hash.as_bytes())
}

/// Raw note read from `stage/inbox`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedNote {
    pub entry_id: EntryId,
    /// Workspace-relative path, e.g. `stage/inbox/20260101T000000Z_note.md`.
    pub source_rel_path: String,
    /// Lowercase hex SHA-256 of `content`.
    pub content_hash: String,
    /// Staged file mtime, RFC 3339 UTC.
    pub created_at: String,
    pub frontmatter: BTreeMap<String, String>,
    /// Trimmed body with frontmatter removed.
    pub body: String,
    pub warnings: Vec<String>,
    /// Raw file content, frontmatter included.
    pub content: String,
}

/// Classifier output for one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// Sorted, lowercase, deduplicated. Always contains the category name.
    pub tags: Vec<String>,
    /// Heuristic confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Condition that requested a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSignal {
    LongEntry,
    BatchThreshold,
    HighRedundancy,
}

impl TriggerSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LongEntry => "long_entry",
            Self::BatchThreshold => "batch_threshold",
            Self::HighRedundancy => "high_redundancy",
        }
    }
}

impl Display for TriggerSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condensed artifact produced by a summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub short_summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub triggered_by: Vec<TriggerSignal>,
    /// Highest similarity against existing summaries, rounded to 3 places.
    #[serde(default)]
    pub redundancy_score: Option<f64>,
}

/// Staged note with its classification and optional summary attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedNote {
    pub note: StagedNote,
    pub classification: Classification,
    pub summary: Option<Summary>,
}

#[cfg(test)]
mod tests {
    use super::entry_id_for_hash;

    #[test]
    fn entry_id_is_stable_for_same_hash() {
        let first = entry_id_for_hash("abc123");
        let second = entry_id_for_hash("abc123");
        assert_eq!(first, second);
        assert_ne!(first, entry_id_for_hash("abc124"));
    }
}
