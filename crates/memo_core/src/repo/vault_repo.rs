//! Vault artifact rendering and file access.
//!
//! # Responsibility
//! - Render entry, summary and batch digest markdown from a proposal.
//! - Read and write artifacts at vault-relative paths.
//!
//! # Invariants
//! - Rendering is a pure function of the proposal, so a retried commit
//!   produces byte-identical files and can recognize its own partial writes.

use crate::model::ledger::RecordKind;
use crate::model::note::Summary;
use crate::model::proposal::{BatchSummary, Proposal, ProposalEntry};
use crate::workspace::{write_atomic, Workspace};
use std::fs;
use std::io;

/// One file a commit will place in the vault.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultArtifact<'a> {
    pub path: &'a str,
    pub kind: RecordKind,
    /// Owning entry; `None` for the batch digest.
    pub entry: Option<&'a ProposalEntry>,
    pub contents: String,
}

/// Every artifact of `proposal`, in write order.
///
/// Entries matched by `skip` (late duplicates) contribute nothing.
pub fn planned_artifacts<'a>(
    proposal: &'a Proposal,
    skip: impl Fn(&ProposalEntry) -> bool,
) -> Vec<VaultArtifact<'a>> {
    let mut artifacts = Vec::new();
    for entry in proposal.ready_entries().filter(|entry| !skip(entry)) {
        artifacts.push(VaultArtifact {
            path: entry.target_entry_path.as_str(),
            kind: RecordKind::Entry,
            entry: Some(entry),
            contents: render_entry(entry, &proposal.proposal_id),
        });
        if let (Some(summary), Some(path)) = (&entry.summary, &entry.target_summary_path) {
            artifacts.push(VaultArtifact {
                path: path.as_str(),
                kind: RecordKind::Summary,
                entry: Some(entry),
                contents: render_summary(entry, summary),
            });
        }
    }
    if let Some(batch) = &proposal.batch_summary {
        artifacts.push(VaultArtifact {
            path: batch.path.as_str(),
            kind: RecordKind::BatchSummary,
            entry: None,
            contents: render_batch_summary(batch),
        });
    }
    artifacts
}

/// Entry markdown: YAML frontmatter followed by the note body.
///
/// String values are double-quoted so paths containing `: ` or `#` stay
/// valid YAML.
pub fn render_entry(entry: &ProposalEntry, proposal_id: &str) -> String {
    let mut fields: Vec<(&str, FrontmatterValue<'_>)> = vec![
        ("entry_id", FrontmatterValue::Text(entry.entry_id.to_string())),
        (
            "category",
            FrontmatterValue::Text(entry.category().as_str().to_string()),
        ),
        ("tags", FrontmatterValue::List(&entry.classification.tags)),
        (
            "confidence",
            FrontmatterValue::Number(entry.classification.confidence.to_string()),
        ),
        ("content_hash", FrontmatterValue::Text(entry.content_hash.clone())),
        (
            "source_stage_path",
            FrontmatterValue::Text(entry.source_stage_path.clone()),
        ),
        ("created_at", FrontmatterValue::Text(entry.created_at.clone())),
        ("proposal_id", FrontmatterValue::Text(proposal_id.to_string())),
    ];
    let summary_path = entry
        .summary
        .as_ref()
        .and(entry.target_summary_path.clone())
        .unwrap_or_default();
    fields.push(("summary_path", FrontmatterValue::Text(summary_path)));

    let mut out = String::from("---\n");
    for (key, value) in fields {
        match value {
            FrontmatterValue::Text(text) => {
                out.push_str(&format!("{key}: {}\n", quoted(&text)));
            }
            FrontmatterValue::Number(number) => {
                out.push_str(&format!("{key}: {number}\n"));
            }
            FrontmatterValue::List(items) => {
                out.push_str(&format!("{key}:\n"));
                for item in items {
                    out.push_str(&format!("  - {}\n", quoted(item)));
                }
            }
        }
    }
    out.push_str("---\n\n");
    out.push_str(entry.body.trim());
    out.push('\n');
    out
}

enum FrontmatterValue<'a> {
    Text(String),
    Number(String),
    List(&'a [String]),
}

/// YAML double-quoted scalar; control characters fold to spaces.
fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn render_summary(entry: &ProposalEntry, summary: &Summary) -> String {
    let mut lines = vec![
        format!("# Summary for {}", entry.entry_id),
        String::new(),
        summary.short_summary.clone(),
    ];
    push_section(&mut lines, "Key Points", &summary.key_points);
    push_section(&mut lines, "Actions", &summary.actions);
    let signals: Vec<String> = summary
        .triggered_by
        .iter()
        .map(|signal| signal.to_string())
        .collect();
    push_section(&mut lines, "Triggered By", &signals);
    lines.push(String::new());
    lines.push(format!(
        "Redundancy score: {}",
        summary.redundancy_score.unwrap_or(0.0)
    ));
    lines.push(String::new());
    lines.join("\n")
}

pub fn render_batch_summary(batch: &BatchSummary) -> String {
    let mut lines = vec![
        format!("# Batch summary {}", batch.summary_id),
        String::new(),
        batch.summary.short_summary.clone(),
    ];
    push_section(&mut lines, "Notes", &batch.summary.key_points);
    let entry_ids: Vec<String> = batch.entry_ids.iter().map(|id| id.to_string()).collect();
    push_section(&mut lines, "Entries", &entry_ids);
    lines.push(String::new());
    lines.join("\n")
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    lines.push(String::new());
    lines.push(format!("## {title}"));
    if items.is_empty() {
        lines.push("- (none)".to_string());
    } else {
        lines.extend(items.iter().map(|item| format!("- {item}")));
    }
}

/// Current contents at a vault-relative path; `None` when absent.
pub fn read_artifact(workspace: &Workspace, rel_path: &str) -> io::Result<Option<String>> {
    match fs::read_to_string(workspace.resolve(rel_path)) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn write_artifact(workspace: &Workspace, rel_path: &str, contents: &str) -> io::Result<()> {
    write_atomic(&workspace.resolve(rel_path), contents.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::{planned_artifacts, read_artifact, render_entry, write_artifact};
    use crate::model::category::Category;
    use crate::model::ledger::RecordKind;
    use crate::model::note::{Classification, Summary, TriggerSignal};
    use crate::model::proposal::{
        entry_target_path, summary_target_path, EntryStatus, Proposal, ProposalEntry,
        ProposalStats, ProposalStatus,
    };
    use crate::workspace::Workspace;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn entry(n: u128, status: EntryStatus, with_summary: bool) -> ProposalEntry {
        let entry_id = Uuid::from_u128(n);
        ProposalEntry {
            entry_id,
            source_stage_path: format!("stage/inbox/{n}.md"),
            content_hash: format!("hash{n}"),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            body: "- [ ] write tests\n".to_string(),
            frontmatter: BTreeMap::new(),
            warnings: Vec::new(),
            classification: Classification {
                category: Category::Todo,
                tags: vec!["release".to_string(), "todo".to_string()],
                confidence: 0.75,
                reasoning: String::new(),
            },
            summary: with_summary.then(|| Summary {
                short_summary: "Write tests.".to_string(),
                key_points: vec!["[ ] write tests".to_string()],
                actions: vec!["write tests".to_string()],
                triggered_by: vec![TriggerSignal::LongEntry],
                redundancy_score: Some(0.0),
            }),
            target_entry_path: entry_target_path(entry_id, Category::Todo),
            target_summary_path: with_summary.then(|| summary_target_path(&entry_id.to_string())),
            status,
            invalid_reason: None,
        }
    }

    fn proposal(entries: Vec<ProposalEntry>) -> Proposal {
        Proposal {
            proposal_id: "20260101T000000Z_abcdef01".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            entries,
            batch_summary: None,
            stats: ProposalStats::default(),
            commit_message_preview: String::new(),
            status: ProposalStatus::Pending,
            committed_at: None,
            commit_id: None,
            config_snapshot: None,
        }
    }

    #[test]
    fn entry_markdown_has_frontmatter_and_trimmed_body() {
        let rendered = render_entry(&entry(1, EntryStatus::Ready, false), "p1");
        assert!(rendered.starts_with("---\nentry_id: \""));
        assert!(rendered.contains("tags:\n  - \"release\"\n  - \"todo\"\n"));
        assert!(rendered.contains("confidence: 0.75\n"));
        assert!(rendered.contains("proposal_id: \"p1\"\n"));
        assert!(rendered.contains("summary_path: \"\"\n"));
        assert!(rendered.ends_with("---\n\n- [ ] write tests\n"));
    }

    #[test]
    fn awkward_values_keep_frontmatter_valid_yaml() {
        let mut awkward = entry(1, EntryStatus::Ready, false);
        awkward.source_stage_path = "stage/inbox/todo: \"draft\" \\ #1.md".to_string();
        awkward.classification.tags = vec!["key: value".to_string()];
        let rendered = render_entry(&awkward, "p1");

        let yaml = rendered
            .strip_prefix("---\n")
            .and_then(|rest| rest.split("---\n").next())
            .unwrap();
        let parsed: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            parsed["source_stage_path"].as_str(),
            Some(awkward.source_stage_path.as_str())
        );
        assert_eq!(parsed["tags"][0].as_str(), Some("key: value"));
        assert_eq!(parsed["confidence"].as_f64(), Some(0.75));
        assert_eq!(parsed["entry_id"].as_str(), Some(awkward.entry_id.to_string().as_str()));
    }

    #[test]
    fn planned_artifacts_skip_non_ready_and_skipped_entries() {
        let proposal = proposal(vec![
            entry(1, EntryStatus::Ready, true),
            entry(2, EntryStatus::Invalid, false),
            entry(3, EntryStatus::Ready, false),
        ]);

        let all = planned_artifacts(&proposal, |_| false);
        let kinds: Vec<RecordKind> = all.iter().map(|artifact| artifact.kind).collect();
        assert_eq!(
            kinds,
            vec![RecordKind::Entry, RecordKind::Summary, RecordKind::Entry]
        );
        assert!(all[1].contents.contains("## Actions\n- write tests"));

        let skipped = planned_artifacts(&proposal, |entry| entry.entry_id == Uuid::from_u128(1));
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn rendering_is_deterministic() {
        let proposal = proposal(vec![entry(1, EntryStatus::Ready, true)]);
        assert_eq!(
            planned_artifacts(&proposal, |_| false),
            planned_artifacts(&proposal, |_| false)
        );
    }

    #[test]
    fn artifacts_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        assert_eq!(read_artifact(&workspace, "vault/ideas/x.md").unwrap(), None);
        write_artifact(&workspace, "vault/ideas/x.md", "hello").unwrap();
        assert_eq!(
            read_artifact(&workspace, "vault/ideas/x.md").unwrap().as_deref(),
            Some("hello")
        );
    }
}
