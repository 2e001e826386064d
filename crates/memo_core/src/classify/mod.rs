//! Note classification strategies.
//!
//! # Responsibility
//! - Define the pluggable `Classifier` contract consumed by proposal building.
//! - Ship the default keyword/pattern heuristic.
//!
//! # Invariants
//! - Classification is total: every input maps to exactly one category.
//! - Classification is deterministic and holds no mutable state.

pub mod keyword;

use crate::model::note::{Classification, StagedNote};

pub use keyword::KeywordClassifier;

/// Assigns one category (plus tags and confidence) to a staged note.
pub trait Classifier {
    fn classify(&self, note: &StagedNote) -> Classification;
}
