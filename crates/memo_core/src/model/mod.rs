//! Domain model for the stage → proposal → vault pipeline.
//!
//! # Responsibility
//! - Define canonical data structures shared by classification, proposal
//!   building, commit and indexing.
//! - Keep serialized shapes stable for proposal artifacts and ledgers.
//!
//! # Invariants
//! - Every staged note is identified by a content-derived `EntryId`.
//! - Proposal entries are immutable once created; only proposal status moves.
//! - Ledger records are write-once.

pub mod category;
pub mod ledger;
pub mod note;
pub mod proposal;
