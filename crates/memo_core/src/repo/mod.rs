//! Repository layer: persistence contracts and file-backed implementations.
//!
//! # Responsibility
//! - Define use-case oriented storage contracts for proposals and ledgers.
//! - Keep file formats (JSON, JSONL, markdown) out of service orchestration.
//!
//! # Invariants
//! - Ledger files are append-only and written only under the vault lock.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicatePath`) in
//!   addition to transport errors.

pub mod ledger_repo;
pub mod proposal_repo;
pub mod vault_repo;
