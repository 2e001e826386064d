//! Text similarity strategies for the redundancy trigger.

use std::collections::BTreeSet;

/// Symmetric similarity bounded in `[0, 1]`.
pub trait Similarity {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

impl<T: Similarity + ?Sized> Similarity for &T {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        (**self).similarity(a, b)
    }
}

/// Jaccard index over lowercase alphanumeric token sets.
///
/// Two texts without any tokens score `0.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlap;

impl Similarity for TokenOverlap {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let left = tokens(a);
        let right = tokens(b);
        let union = left.union(&right).count();
        if union == 0 {
            return 0.0;
        }
        let shared = left.intersection(&right).count();
        shared as f64 / union as f64
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}
