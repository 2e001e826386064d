//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate stage, classification, summarization and repository calls
//!   into the process/commit/status use-cases.
//! - Keep callers decoupled from file formats and the version-control tool.

pub mod commit_service;
pub mod process_service;
pub mod status_service;
