//! Proposal building from the staging inbox.
//!
//! # Responsibility
//! - Classify every pending note and attach summaries where triggered.
//! - Assemble a reviewable `Proposal` and persist it as `pending`.
//!
//! # Invariants
//! - Building never touches the vault or the ledgers.
//! - The same inbox and vault state yield identical entries; only the
//!   proposal id and timestamps differ between runs.
//! - A proposal whose entries collide on a target path is never persisted.

use crate::classify::{Classifier, KeywordClassifier};
use crate::config::AppConfig;
use crate::model::note::{ClassifiedNote, EntryId, StagedNote};
use crate::model::proposal::{
    commit_message, entry_target_path, new_proposal_id, summary_target_path, BatchSummary,
    EntryStatus, Proposal, ProposalEntry, ProposalStats, ProposalStatus, ProposalValidationError,
};
use crate::repo::ledger_repo::{Indexer, LedgerError};
use crate::repo::proposal_repo::{FileProposalStore, ProposalStore, ProposalStoreError};
use crate::stage::{self, sha256_hex, StageError};
use crate::summarize::{
    load_existing_summaries, DigestItem, ExtractiveSummarizer, Similarity, Summarizer,
    SummaryTrigger, TokenOverlap, TriggerDecision,
};
use crate::workspace::Workspace;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::time::Instant;

const EMPTY_BODY_REASON: &str = "empty body";

/// Service error for proposal building.
#[derive(Debug)]
pub enum ProcessError {
    Stage(StageError),
    Ledger(LedgerError),
    Store(ProposalStoreError),
    /// Two entries of one run resolve to the same vault path.
    DuplicateTarget(String),
    Validation(ProposalValidationError),
    Io(io::Error),
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage(err) => write!(f, "{err}"),
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::DuplicateTarget(path) => {
                write!(f, "two staged notes resolve to the same target `{path}`")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProcessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Stage(err) => Some(err),
            Self::Ledger(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::DuplicateTarget(_) => None,
            Self::Validation(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<StageError> for ProcessError {
    fn from(value: StageError) -> Self {
        Self::Stage(value)
    }
}

impl From<LedgerError> for ProcessError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ProposalStoreError> for ProcessError {
    fn from(value: ProposalStoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ProposalValidationError> for ProcessError {
    fn from(value: ProposalValidationError) -> Self {
        match value {
            ProposalValidationError::DuplicateTarget(path) => Self::DuplicateTarget(path),
            other => Self::Validation(other),
        }
    }
}

impl From<io::Error> for ProcessError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Builds proposals with pluggable classification and summarization.
pub struct ProcessService<C, S, M, P>
where
    C: Classifier,
    S: Summarizer,
    M: Similarity,
    P: ProposalStore,
{
    workspace: Workspace,
    config: AppConfig,
    classifier: C,
    summarizer: S,
    similarity: M,
    store: P,
}

/// Service wired with the default heuristics and file store.
pub type DefaultProcessService =
    ProcessService<KeywordClassifier, ExtractiveSummarizer, TokenOverlap, FileProposalStore>;

impl DefaultProcessService {
    pub fn with_defaults(workspace: Workspace, config: AppConfig) -> Self {
        let classifier = KeywordClassifier::new(config.taxonomy.clone());
        let store = FileProposalStore::new(&workspace);
        Self::new(
            workspace,
            config,
            classifier,
            ExtractiveSummarizer,
            TokenOverlap,
            store,
        )
    }
}

impl<C, S, M, P> ProcessService<C, S, M, P>
where
    C: Classifier,
    S: Summarizer,
    M: Similarity,
    P: ProposalStore,
{
    pub fn new(
        workspace: Workspace,
        config: AppConfig,
        classifier: C,
        summarizer: S,
        similarity: M,
        store: P,
    ) -> Self {
        Self {
            workspace,
            config,
            classifier,
            summarizer,
            similarity,
            store,
        }
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Builds and persists a pending proposal for the current inbox.
    ///
    /// Returns `Ok(None)` when the inbox is empty; nothing is written then.
    pub fn process(&self) -> Result<Option<Proposal>, ProcessError> {
        let started_at = Instant::now();
        info!("event=process_run module=service status=start");

        let result = self.build(Utc::now()).and_then(|proposal| {
            if let Some(proposal) = &proposal {
                self.store.save(proposal)?;
            }
            Ok(proposal)
        });

        match &result {
            Ok(Some(proposal)) => info!(
                "event=process_run module=service status=ok duration_ms={} proposal_id={} total={} ready={} invalid={} duplicates={} summaries={}",
                started_at.elapsed().as_millis(),
                proposal.proposal_id,
                proposal.stats.total_items,
                proposal.stats.ready_items,
                proposal.stats.invalid_items,
                proposal.stats.duplicate_items,
                proposal.stats.summary_items
            ),
            Ok(None) => info!(
                "event=process_run module=service status=ok duration_ms={} reason=empty_inbox",
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=process_run module=service status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Builds a proposal without persisting it.
    pub fn build(&self, now: DateTime<Utc>) -> Result<Option<Proposal>, ProcessError> {
        let notes = stage::load_pending(&self.workspace)?;
        if notes.is_empty() {
            return Ok(None);
        }

        let indexed_hashes = Indexer::new(&self.workspace).entry_hashes()?;
        let existing_summaries = load_existing_summaries(&self.workspace)?;

        let trigger = SummaryTrigger::new(&self.config.summarization, &self.similarity);
        let bodies: Vec<&str> = notes.iter().map(|note| note.body.as_str()).collect();
        let decision = trigger.evaluate_batch(&bodies, &existing_summaries);

        let mut entries = Vec::with_capacity(notes.len());
        for (note, note_decision) in notes.into_iter().zip(decision.per_note) {
            let status = entry_status(&note, &indexed_hashes);
            let classified = self.classify(note, status, &note_decision);
            entries.push(into_entry(classified, status));
        }

        let batch_summary = if decision.batch_digest {
            self.batch_summary(&entries)
        } else {
            None
        };

        let proposal_id = new_proposal_id(now);
        let stats = compute_stats(&entries, batch_summary.is_some());
        let proposal = Proposal {
            commit_message_preview: commit_message(
                &self.config.git.commit_prefix,
                &proposal_id,
                stats.ready_items,
                stats.duplicate_items,
                stats.invalid_items,
            ),
            proposal_id,
            created_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            entries,
            batch_summary,
            stats,
            status: ProposalStatus::Pending,
            committed_at: None,
            commit_id: None,
            config_snapshot: Some(self.config.clone()),
        };

        proposal.validate()?;
        Ok(Some(proposal))
    }

    fn classify(
        &self,
        note: StagedNote,
        status: EntryStatus,
        decision: &TriggerDecision,
    ) -> ClassifiedNote {
        let classification = self.classifier.classify(&note);
        let summary = (status == EntryStatus::Ready && decision.is_triggered()).then(|| {
            self.summarizer.summarize(
                &note.body,
                classification.category,
                &decision.signals,
                decision.redundancy_score,
            )
        });
        ClassifiedNote {
            note,
            classification,
            summary,
        }
    }

    fn batch_summary(&self, entries: &[ProposalEntry]) -> Option<BatchSummary> {
        let items: Vec<DigestItem<'_>> = entries
            .iter()
            .filter(|entry| entry.is_ready())
            .map(|entry| DigestItem {
                entry_id: entry.entry_id,
                category: entry.category(),
                body: entry.body.as_str(),
            })
            .collect();
        if items.is_empty() {
            return None;
        }

        let entry_ids: Vec<EntryId> = items.iter().map(|item| item.entry_id).collect();
        let summary_id = batch_summary_id(&entry_ids);
        Some(BatchSummary {
            path: summary_target_path(&summary_id),
            summary_id,
            entry_ids,
            summary: self.summarizer.digest(&items),
        })
    }
}

fn entry_status(note: &StagedNote, indexed_hashes: &BTreeSet<String>) -> EntryStatus {
    if note.body.trim().is_empty() {
        EntryStatus::Invalid
    } else if indexed_hashes.contains(&note.content_hash) {
        EntryStatus::Duplicate
    } else {
        EntryStatus::Ready
    }
}

fn into_entry(classified: ClassifiedNote, status: EntryStatus) -> ProposalEntry {
    let ClassifiedNote {
        note,
        classification,
        summary,
    } = classified;
    let target_summary_path = summary
        .as_ref()
        .map(|_| summary_target_path(&note.entry_id.to_string()));

    ProposalEntry {
        entry_id: note.entry_id,
        target_entry_path: entry_target_path(note.entry_id, classification.category),
        source_stage_path: note.source_rel_path,
        content_hash: note.content_hash,
        created_at: note.created_at,
        body: note.body,
        frontmatter: note.frontmatter,
        warnings: note.warnings,
        classification,
        summary,
        target_summary_path,
        status,
        invalid_reason: (status == EntryStatus::Invalid).then(|| EMPTY_BODY_REASON.to_string()),
    }
}

/// `batch-<12 hex>` over the sorted entry ids.
fn batch_summary_id(entry_ids: &[EntryId]) -> String {
    let mut sorted: Vec<String> = entry_ids.iter().map(|id| id.to_string()).collect();
    sorted.sort();
    let digest = sha256_hex(&sorted.join("\n"));
    format!("batch-{}", &digest[..12])
}

fn compute_stats(entries: &[ProposalEntry], has_batch_summary: bool) -> ProposalStats {
    let count = |status: EntryStatus| entries.iter().filter(|entry| entry.status == status).count();
    ProposalStats {
        total_items: entries.len(),
        ready_items: count(EntryStatus::Ready),
        invalid_items: count(EntryStatus::Invalid),
        duplicate_items: count(EntryStatus::Duplicate),
        summary_items: entries.iter().filter(|entry| entry.summary.is_some()).count()
            + usize::from(has_batch_summary),
    }
}

#[cfg(test)]
mod tests {
    use super::{batch_summary_id, DefaultProcessService};
    use crate::config::AppConfig;
    use crate::model::proposal::EntryStatus;
    use crate::workspace::Workspace;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use uuid::Uuid;

    #[test]
    fn batch_id_ignores_entry_order() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let id = batch_summary_id(&[a, b]);
        assert_eq!(id, batch_summary_id(&[b, a]));
        assert!(id.starts_with("batch-"));
        assert_eq!(id.len(), "batch-".len() + 12);
    }

    #[test]
    fn empty_body_is_invalid_and_not_summarized() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        fs::write(workspace.stage_inbox().join("empty.md"), "---\ntitle: x\n---\n").unwrap();
        fs::write(workspace.stage_inbox().join("full.md"), "- [ ] write docs").unwrap();

        let service = DefaultProcessService::with_defaults(workspace, AppConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let proposal = service.build(now).unwrap().unwrap();

        assert_eq!(proposal.stats.total_items, 2);
        assert_eq!(proposal.stats.invalid_items, 1);
        let invalid = proposal
            .entries
            .iter()
            .find(|entry| entry.status == EntryStatus::Invalid)
            .unwrap();
        assert_eq!(invalid.invalid_reason.as_deref(), Some("empty body"));
        assert!(invalid.summary.is_none());
        assert!(proposal.created_at.starts_with("2026-02-01T00:00:00"));
        assert!(proposal
            .commit_message_preview
            .ends_with("(1 entries, 0 duplicates, 1 invalid)"));
    }

    #[test]
    fn empty_inbox_builds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        let service = DefaultProcessService::with_defaults(workspace, AppConfig::default());
        assert!(service.process().unwrap().is_none());
    }
}
