mod common;

use common::{engine, long_text, read_lines, stage_note, workspace, FakeVcs};
use memo_core::config::AppConfig;
use memo_core::lock::VaultLock;
use memo_core::repo::vault_repo::render_entry;
use memo_core::{
    CommitError, CommitErrorKind, CommitRecord, EntryStatus, IndexRecord, LedgerError,
    ProposalStore, RecordKind, VersionControl,
};
use std::collections::BTreeSet;
use std::fs;

fn index_records(workspace: &memo_core::Workspace) -> Vec<IndexRecord> {
    read_lines(&workspace.entries_index())
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn commit_applies_proposal_exactly_once() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "a.md", "- [ ] write tests");
    stage_note(&workspace, "b.md", "See https://example.com/guide");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    let report = engine.commit(&proposal.proposal_id).unwrap();
    assert_eq!(report.committed_entries, 2);
    assert_eq!(report.skipped_duplicates, 0);
    assert_eq!(report.invalid_entries, 0);
    assert!(report.reconciled_paths.is_empty());
    assert_eq!(
        report.message,
        format!(
            "memo: apply proposal {} (2 entries, 0 duplicates, 0 invalid)",
            proposal.proposal_id
        )
    );

    for entry in &proposal.entries {
        let written = fs::read_to_string(workspace.resolve(&entry.target_entry_path)).unwrap();
        assert!(written.contains(&format!("entry_id: \"{}\"", entry.entry_id)));
    }
    assert_eq!(fs::read_dir(workspace.stage_inbox()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(workspace.stage_processed()).unwrap().count(), 2);

    let commits = engine.vcs().commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].message, report.message);
    assert_eq!(commits[0].paths.len(), 2);

    let records = index_records(&workspace);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.commit_id == report.commit_id));
    assert_eq!(read_lines(&workspace.commits_index()).len(), 1);

    let stored = engine.store().load(&proposal.proposal_id).unwrap();
    assert!(stored.is_committed());
    assert_eq!(stored.commit_id.as_deref(), Some(report.commit_id.as_str()));

    let entries_before = fs::read(workspace.entries_index()).unwrap();
    let commits_before = fs::read(workspace.commits_index()).unwrap();
    let again = engine.commit(&proposal.proposal_id).unwrap_err();
    assert!(again.is_noop());
    assert_eq!(again.kind(), CommitErrorKind::Noop);
    assert_eq!(engine.vcs().commits().len(), 1);
    assert_eq!(fs::read(workspace.entries_index()).unwrap(), entries_before);
    assert_eq!(fs::read(workspace.commits_index()).unwrap(), commits_before);
}

#[test]
fn ledgers_only_grow_across_commits() {
    let (_dir, workspace) = workspace();
    let config = AppConfig::default();
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    stage_note(&workspace, "first.md", "first note body");
    let first = common::process(&workspace, &config);
    engine.commit(&first.proposal_id).unwrap();
    let entries_before = fs::read(workspace.entries_index()).unwrap();
    let commits_before = fs::read(workspace.commits_index()).unwrap();

    stage_note(&workspace, "second.md", "second note body");
    let second = common::process(&workspace, &config);
    engine.commit(&second.proposal_id).unwrap();
    assert_ne!(first.proposal_id, second.proposal_id);

    let entries_after = fs::read(workspace.entries_index()).unwrap();
    let commits_after = fs::read(workspace.commits_index()).unwrap();
    assert!(entries_after.starts_with(&entries_before));
    assert!(commits_after.starts_with(&commits_before));
    assert!(entries_after.len() > entries_before.len());

    let paths: BTreeSet<String> = index_records(&workspace)
        .into_iter()
        .map(|record| record.path)
        .collect();
    assert_eq!(paths.len(), 2);
}

#[test]
fn out_of_band_file_conflicts_before_any_write() {
    let (_dir, workspace) = workspace();
    let source = stage_note(&workspace, "a.md", "- [ ] write tests");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let target = workspace.resolve(&proposal.entries[0].target_entry_path);
    fs::write(&target, "hand-written content").unwrap();

    let engine = engine(&workspace, &config, FakeVcs::initialized());
    match engine.commit(&proposal.proposal_id) {
        Err(CommitError::TargetConflict { path, .. }) => {
            assert_eq!(path, proposal.entries[0].target_entry_path);
        }
        other => panic!("expected target conflict, got {other:?}"),
    }

    assert_eq!(fs::read_to_string(&target).unwrap(), "hand-written content");
    assert!(source.is_file());
    assert!(!workspace.entries_index().exists());
    assert!(!workspace.commits_index().exists());
    assert!(engine.vcs().commits().is_empty());
    assert!(!engine.store().load(&proposal.proposal_id).unwrap().is_committed());
}

#[test]
fn vcs_failure_then_retry_heals_without_duplicates() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "long.md", &long_text(400));
    stage_note(&workspace, "todo.md", "- [ ] review roadmap");
    let mut config = AppConfig::default();
    config.summarization.min_words = 300;
    let proposal = common::process(&workspace, &config);

    let vcs = FakeVcs::initialized();
    vcs.fail_next_commits(1);
    let engine = engine(&workspace, &config, vcs);

    let failed = engine.commit(&proposal.proposal_id).unwrap_err();
    assert!(matches!(failed, CommitError::Vcs(_)));
    assert_eq!(failed.kind(), CommitErrorKind::Io);
    assert!(!workspace.entries_index().exists());
    assert!(!workspace.commits_index().exists());
    assert!(!engine.store().load(&proposal.proposal_id).unwrap().is_committed());

    let report = engine.commit(&proposal.proposal_id).unwrap();
    // Entry, its summary and the second entry were all written by the first attempt.
    assert_eq!(report.reconciled_paths.len(), 3);
    assert_eq!(engine.vcs().commits().len(), 1);

    let records = index_records(&workspace);
    assert_eq!(records.len(), 3);
    let unique: BTreeSet<&str> = records.iter().map(|record| record.path.as_str()).collect();
    assert_eq!(unique.len(), 3);
    assert_eq!(
        records
            .iter()
            .filter(|record| record.kind == RecordKind::Summary)
            .count(),
        1
    );
    assert_eq!(read_lines(&workspace.commits_index()).len(), 1);
}

#[test]
fn ledger_failure_after_commit_keeps_own_commit_on_retry() {
    let (_dir, workspace) = workspace();
    let config = AppConfig::default();

    stage_note(&workspace, "a.md", "alpha note body");
    let first = common::process(&workspace, &config);
    fs::remove_file(workspace.stage_inbox().join("a.md")).unwrap();
    stage_note(&workspace, "b.md", "beta note body");
    let second = common::process(&workspace, &config);
    stage_note(&workspace, "a.md", "alpha note body");

    let vcs = FakeVcs::initialized();
    vcs.block_path_after_next_commit(workspace.entries_index());
    let engine = engine(&workspace, &config, vcs);

    assert!(engine.commit(&first.proposal_id).is_err());
    assert_eq!(engine.vcs().commits().len(), 1);
    assert!(!engine.store().load(&first.proposal_id).unwrap().is_committed());
    fs::remove_dir(workspace.entries_index()).unwrap();

    let second_report = engine.commit(&second.proposal_id).unwrap();
    assert_eq!(second_report.commit_id, "fake0002");

    let first_report = engine.commit(&first.proposal_id).unwrap();
    assert_eq!(first_report.commit_id, "fake0001");
    assert_eq!(first_report.reconciled_paths.len(), 1);
    assert_eq!(engine.vcs().commits().len(), 2);

    let ledger: Vec<(String, String)> = read_lines(&workspace.commits_index())
        .iter()
        .map(|line| serde_json::from_str::<CommitRecord>(line).unwrap())
        .map(|record| (record.proposal_id, record.commit_id))
        .collect();
    assert_eq!(
        ledger,
        vec![
            (second.proposal_id.clone(), "fake0002".to_string()),
            (first.proposal_id.clone(), "fake0001".to_string()),
        ]
    );
    for record in index_records(&workspace) {
        let expected = if record.proposal_id == first.proposal_id {
            "fake0001"
        } else {
            "fake0002"
        };
        assert_eq!(record.commit_id, expected);
    }
}

#[test]
fn hand_committed_identical_file_still_gets_proposal_commit() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "a.md", "- [ ] write tests");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let entry = &proposal.entries[0];
    fs::write(
        workspace.resolve(&entry.target_entry_path),
        render_entry(entry, &proposal.proposal_id),
    )
    .unwrap();

    let engine = engine(&workspace, &config, FakeVcs::initialized());
    engine
        .vcs()
        .commit(&[entry.target_entry_path.clone()], "manual import")
        .unwrap();

    let report = engine.commit(&proposal.proposal_id).unwrap();
    assert_eq!(report.reconciled_paths, vec![entry.target_entry_path.clone()]);
    assert_eq!(report.commit_id, "fake0002");

    let commits = engine.vcs().commits();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[1].message, report.message);
    assert!(commits[1].paths.is_empty());
    assert_eq!(index_records(&workspace)[0].commit_id, "fake0002");
}

#[test]
fn same_file_name_in_two_inbox_folders_keeps_both_originals() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "a/note.md", "first body alpha");
    stage_note(&workspace, "b/note.md", "second body beta");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    let report = engine.commit(&proposal.proposal_id).unwrap();
    assert_eq!(report.committed_entries, 2);

    let mut contents: Vec<String> = fs::read_dir(workspace.stage_processed())
        .unwrap()
        .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect();
    contents.sort();
    assert_eq!(contents, vec!["first body alpha", "second body beta"]);
}

#[test]
fn held_lock_fails_fast() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "a.md", "note body");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    let lock = VaultLock::acquire(&workspace).unwrap();
    let err = engine.commit(&proposal.proposal_id).unwrap_err();
    assert!(matches!(err, CommitError::VaultLocked));
    assert_eq!(err.kind(), CommitErrorKind::Precondition);
    drop(lock);

    assert!(engine.commit(&proposal.proposal_id).is_ok());
}

#[test]
fn missing_repository_is_a_precondition_failure() {
    let (_dir, workspace) = workspace();
    let source = stage_note(&workspace, "a.md", "note body");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let engine = engine(&workspace, &config, FakeVcs::uninitialized());

    let err = engine.commit(&proposal.proposal_id).unwrap_err();
    assert!(matches!(err, CommitError::RepoNotInitialized));
    assert!(source.is_file());
    assert!(!workspace
        .resolve(&proposal.entries[0].target_entry_path)
        .exists());
}

#[test]
fn unknown_proposal_is_not_found() {
    let (_dir, workspace) = workspace();
    let config = AppConfig::default();
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    assert!(matches!(
        engine.commit("20260101T000000Z_deadbeef"),
        Err(CommitError::ProposalNotFound(_))
    ));
    assert!(matches!(
        engine.commit("latest"),
        Err(CommitError::ProposalNotFound(_))
    ));
}

#[test]
fn latest_reference_commits_newest_proposal() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "a.md", "note body");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    let report = engine.commit("latest").unwrap();
    assert_eq!(report.proposal_id, proposal.proposal_id);
    assert!(engine.commit("latest").unwrap_err().is_noop());
}

#[test]
fn removed_stage_file_blocks_commit() {
    let (_dir, workspace) = workspace();
    let source = stage_note(&workspace, "a.md", "note body");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    fs::remove_file(&source).unwrap();

    let engine = engine(&workspace, &config, FakeVcs::initialized());
    assert!(matches!(
        engine.commit(&proposal.proposal_id),
        Err(CommitError::StagedSourceMissing(_))
    ));
    assert!(engine.vcs().commits().is_empty());
}

#[test]
fn restaged_content_is_skipped_as_duplicate() {
    let (_dir, workspace) = workspace();
    let config = AppConfig::default();
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    stage_note(&workspace, "a.md", "recurring note");
    let first = common::process(&workspace, &config);
    engine.commit(&first.proposal_id).unwrap();

    stage_note(&workspace, "a-again.md", "recurring note");
    let second = common::process(&workspace, &config);
    assert_eq!(second.entries[0].status, EntryStatus::Duplicate);
    assert_eq!(second.stats.duplicate_items, 1);

    let report = engine.commit(&second.proposal_id).unwrap();
    assert_eq!(report.committed_entries, 0);
    assert_eq!(report.skipped_duplicates, 1);
    assert_eq!(index_records(&workspace).len(), 1);
    assert_eq!(read_lines(&workspace.commits_index()).len(), 2);
}

#[test]
fn late_duplicate_from_parallel_proposal_is_skipped() {
    let (_dir, workspace) = workspace();
    let config = AppConfig::default();
    let engine = engine(&workspace, &config, FakeVcs::initialized());

    stage_note(&workspace, "a.md", "shared note");
    let first = common::process(&workspace, &config);
    fs::write(workspace.stage_inbox().join("b.md"), "shared note").unwrap();
    fs::remove_file(workspace.stage_inbox().join("a.md")).unwrap();
    let second = common::process(&workspace, &config);
    fs::write(workspace.stage_inbox().join("a.md"), "shared note").unwrap();

    engine.commit(&first.proposal_id).unwrap();
    let report = engine.commit(&second.proposal_id).unwrap();
    assert_eq!(report.committed_entries, 0);
    assert_eq!(report.skipped_duplicates, 1);
    assert_eq!(index_records(&workspace).len(), 1);
}

#[test]
fn ledger_ahead_of_store_heals_proposal_status() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "a.md", "note body");
    let config = AppConfig::default();
    let pending = common::process(&workspace, &config);
    let engine = engine(&workspace, &config, FakeVcs::initialized());
    let report = engine.commit(&pending.proposal_id).unwrap();

    // Simulates a crash between the ledger append and the status update.
    engine.store().save(&pending).unwrap();
    assert!(!engine.store().load(&pending.proposal_id).unwrap().is_committed());

    match engine.commit(&pending.proposal_id) {
        Err(CommitError::AlreadyCommitted { commit_id, .. }) => {
            assert_eq!(commit_id.as_deref(), Some(report.commit_id.as_str()));
        }
        other => panic!("expected already committed, got {other:?}"),
    }
    let healed = engine.store().load(&pending.proposal_id).unwrap();
    assert_eq!(healed.commit_id.as_deref(), Some(report.commit_id.as_str()));
    assert_eq!(engine.vcs().commits().len(), 1);
}

#[test]
fn batch_digest_is_written_and_indexed() {
    let (_dir, workspace) = workspace();
    for i in 0..5 {
        stage_note(&workspace, &format!("n{i}.md"), &format!("note number {i}"));
    }
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    let batch = proposal.batch_summary.clone().unwrap();

    let engine = engine(&workspace, &config, FakeVcs::initialized());
    engine.commit(&proposal.proposal_id).unwrap();

    let digest = fs::read_to_string(workspace.resolve(&batch.path)).unwrap();
    assert!(digest.starts_with(&format!("# Batch summary {}", batch.summary_id)));
    let records = index_records(&workspace);
    assert_eq!(records.len(), 6);
    let digest_record = records
        .iter()
        .find(|record| record.kind == RecordKind::BatchSummary)
        .unwrap();
    assert_eq!(digest_record.entry_id, batch.summary_id);
    assert_eq!(digest_record.category, None);
}

#[test]
fn summaries_stay_out_of_index_when_disabled() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "long.md", &long_text(400));
    let mut config = AppConfig::default();
    config.summarization.min_words = 300;
    config.summarization.index_summaries = false;
    let proposal = common::process(&workspace, &config);

    let engine = engine(&workspace, &config, FakeVcs::initialized());
    engine.commit(&proposal.proposal_id).unwrap();

    let summary_path = proposal.entries[0].target_summary_path.clone().unwrap();
    assert!(workspace.resolve(&summary_path).is_file());
    let records = index_records(&workspace);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].summary_path.as_deref(), Some(summary_path.as_str()));
}

#[test]
fn malformed_ledger_blocks_commit() {
    let (_dir, workspace) = workspace();
    stage_note(&workspace, "a.md", "note body");
    let config = AppConfig::default();
    let proposal = common::process(&workspace, &config);
    fs::write(workspace.entries_index(), "{broken\n").unwrap();

    let engine = engine(&workspace, &config, FakeVcs::initialized());
    let err = engine.commit(&proposal.proposal_id).unwrap_err();
    assert!(matches!(
        err,
        CommitError::Ledger(LedgerError::Malformed { line: 1, .. })
    ));
    assert!(engine.vcs().commits().is_empty());
    assert_eq!(fs::read_to_string(workspace.entries_index()).unwrap(), "{broken\n");
}
