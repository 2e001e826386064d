//! Core domain logic for the memo note pipeline.
//! This crate is the single source of truth for pipeline invariants.

pub mod classify;
pub mod config;
pub mod lock;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod stage;
pub mod summarize;
pub mod vcs;
pub mod workspace;

pub use classify::{Classifier, KeywordClassifier};
pub use config::{init_default_config, load_config, AppConfig, ConfigError};
pub use logging::{
    default_log_level, init_from_config, init_logging, logging_status, LoggingError,
};
pub use model::category::Category;
pub use model::ledger::{CommitRecord, IndexRecord, RecordKind};
pub use model::note::{Classification, EntryId, StagedNote, Summary, TriggerSignal};
pub use model::proposal::{EntryStatus, Proposal, ProposalEntry, ProposalStatus};
pub use repo::ledger_repo::{Indexer, JsonlLedger, LedgerError};
pub use repo::proposal_repo::{FileProposalStore, ProposalStore, ProposalStoreError};
pub use service::commit_service::{
    CommitEngine, CommitError, CommitErrorKind, CommitReport, DefaultCommitEngine,
};
pub use service::process_service::{DefaultProcessService, ProcessError, ProcessService};
pub use service::status_service::{workspace_status, StatusError, WorkspaceStatus};
pub use summarize::{ExtractiveSummarizer, Similarity, Summarizer, TokenOverlap};
pub use vcs::{CommitId, GitCli, VcsError, VersionControl};
pub use workspace::Workspace;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
