//! Summary triggering and generation.
//!
//! # Responsibility
//! - Decide per note and per batch whether a summary artifact is required.
//! - Produce condensed summary artifacts through a pluggable `Summarizer`.
//! - Measure redundancy through a pluggable `Similarity`.
//!
//! # Invariants
//! - No trigger fired means no summary is produced or attached.
//! - Similarity is symmetric and bounded in `[0, 1]`.

pub mod extractive;
pub mod similarity;
pub mod trigger;

use crate::model::category::Category;
use crate::model::note::{EntryId, Summary, TriggerSignal};

pub use extractive::ExtractiveSummarizer;
pub use similarity::{Similarity, TokenOverlap};
pub use trigger::{load_existing_summaries, BatchDecision, SummaryTrigger, TriggerDecision};

/// One note handed to a batch digest.
#[derive(Debug, Clone, Copy)]
pub struct DigestItem<'a> {
    pub entry_id: EntryId,
    pub category: Category,
    pub body: &'a str,
}

/// Produces condensed text artifacts for triggered notes and batches.
pub trait Summarizer {
    /// Summarizes one note.
    fn summarize(
        &self,
        text: &str,
        category: Category,
        triggered_by: &[TriggerSignal],
        redundancy_score: f64,
    ) -> Summary;

    /// Summarizes a whole batch into one digest.
    fn digest(&self, items: &[DigestItem<'_>]) -> Summary;
}
