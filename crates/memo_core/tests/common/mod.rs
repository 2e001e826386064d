#![allow(dead_code)]

use memo_core::config::AppConfig;
use memo_core::vcs::{CommitId, VcsError, VcsResult, VersionControl};
use memo_core::{CommitEngine, DefaultProcessService, FileProposalStore, Proposal, Workspace};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// One recorded `commit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub id: CommitId,
    pub paths: Vec<String>,
    pub message: String,
}

#[derive(Debug, Default)]
struct FakeState {
    initialized: bool,
    commits: Vec<RecordedCommit>,
    tracked: BTreeSet<String>,
    fail_commits: usize,
    block_after_commit: Option<PathBuf>,
}

/// In-memory version control that records commits and can fail on demand.
#[derive(Debug, Default)]
pub struct FakeVcs {
    state: RefCell<FakeState>,
}

impl FakeVcs {
    pub fn initialized() -> Self {
        let vcs = Self::default();
        vcs.state.borrow_mut().initialized = true;
        vcs
    }

    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// The next `count` commit calls fail with `CommandFailed`.
    pub fn fail_next_commits(&self, count: usize) {
        self.state.borrow_mut().fail_commits = count;
    }

    /// After the next successful commit, a directory appears at `path`,
    /// so any file write there fails.
    pub fn block_path_after_next_commit(&self, path: PathBuf) {
        self.state.borrow_mut().block_after_commit = Some(path);
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.state.borrow().commits.clone()
    }
}

impl VersionControl for FakeVcs {
    fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    fn init(&self, _default_branch: &str) -> VcsResult<()> {
        self.state.borrow_mut().initialized = true;
        Ok(())
    }

    fn commit(&self, paths: &[String], message: &str) -> VcsResult<CommitId> {
        let mut state = self.state.borrow_mut();
        if !state.initialized {
            return Err(VcsError::NotInitialized(PathBuf::from("fake")));
        }
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(VcsError::CommandFailed {
                command: "git commit".to_string(),
                stderr: "injected failure".to_string(),
            });
        }

        let id = format!("fake{:04}", state.commits.len() + 1);
        state.tracked.extend(paths.iter().cloned());
        state.commits.push(RecordedCommit {
            id: id.clone(),
            paths: paths.to_vec(),
            message: message.to_string(),
        });
        if let Some(path) = state.block_after_commit.take() {
            fs::create_dir_all(path).unwrap();
        }
        Ok(id)
    }

    fn status(&self, paths: &[String]) -> VcsResult<Vec<String>> {
        let state = self.state.borrow();
        Ok(paths
            .iter()
            .filter(|path| !state.tracked.contains(*path))
            .map(|path| format!("?? {path}"))
            .collect())
    }

    fn find_commit(&self, marker: &str, paths: &[String]) -> VcsResult<Option<CommitId>> {
        Ok(self
            .state
            .borrow()
            .commits
            .iter()
            .rev()
            .find(|commit| {
                commit.message.contains(marker)
                    && (paths.is_empty() || commit.paths.iter().any(|path| paths.contains(path)))
            })
            .map(|commit| commit.id.clone()))
    }

    fn head(&self) -> VcsResult<Option<CommitId>> {
        Ok(self
            .state
            .borrow()
            .commits
            .last()
            .map(|commit| commit.id.clone()))
    }
}

pub fn workspace() -> (TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::open(dir.path()).unwrap();
    (dir, workspace)
}

pub fn stage_note(workspace: &Workspace, name: &str, content: &str) -> PathBuf {
    let path = workspace.stage_inbox().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn process(workspace: &Workspace, config: &AppConfig) -> Proposal {
    DefaultProcessService::with_defaults(workspace.clone(), config.clone())
        .process()
        .unwrap()
        .expect("inbox should not be empty")
}

pub fn engine(
    workspace: &Workspace,
    config: &AppConfig,
    vcs: FakeVcs,
) -> CommitEngine<FakeVcs, FileProposalStore> {
    CommitEngine::new(
        workspace.clone(),
        config.clone(),
        vcs,
        FileProposalStore::new(workspace),
    )
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn long_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{}", i % 37))
        .collect::<Vec<_>>()
        .join(" ")
}
