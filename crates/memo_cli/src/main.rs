//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `memo_core` linkage.
//! - Print a read-only workspace status for the current directory or the
//!   first argument.

use memo_core::{
    init_from_config, load_config, workspace_status, FileProposalStore, GitCli, Workspace,
};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("memo_core version={}", memo_core::core_version());

    let root = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace = Workspace::at(root);

    let config = match load_config(&workspace) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config load failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_from_config(&config.logging) {
        eprintln!("logging init failed: {err}");
    }

    match workspace_status(
        &workspace,
        &FileProposalStore::new(&workspace),
        &GitCli::from_config(workspace.root(), &config.git),
    ) {
        Ok(status) => {
            println!("{status}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("status failed: {err}");
            ExitCode::FAILURE
        }
    }
}
