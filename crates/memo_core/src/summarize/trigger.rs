//! Summary trigger policy.
//!
//! Three independent conditions, any one sufficient:
//! - `long_entry`: word count >= `min_words`.
//! - `batch_threshold`: notes in the run >= `batch_trigger_count`.
//! - `high_redundancy`: best similarity against an existing summary >= threshold.
//!
//! Under `BatchPolicy::Digest` the batch condition requests one digest for
//! the whole run instead of tagging each note.

use super::similarity::Similarity;
use crate::config::{BatchPolicy, SummarizationConfig};
use crate::model::note::TriggerSignal;
use crate::workspace::Workspace;
use std::fs;
use std::io;

/// Per-note trigger outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDecision {
    /// Fired conditions in evaluation order; empty when nothing fired.
    pub signals: Vec<TriggerSignal>,
    /// Best similarity against existing summaries.
    pub redundancy_score: f64,
}

impl TriggerDecision {
    pub fn is_triggered(&self) -> bool {
        !self.signals.is_empty()
    }

    fn none() -> Self {
        Self {
            signals: Vec::new(),
            redundancy_score: 0.0,
        }
    }
}

/// Outcome for a whole processing run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDecision {
    /// One decision per input note, in input order.
    pub per_note: Vec<TriggerDecision>,
    /// Whether one digest should cover the whole batch.
    pub batch_digest: bool,
}

/// Evaluates trigger conditions against configuration and prior summaries.
pub struct SummaryTrigger<'a, S: Similarity> {
    config: &'a SummarizationConfig,
    similarity: S,
}

impl<'a, S: Similarity> SummaryTrigger<'a, S> {
    pub fn new(config: &'a SummarizationConfig, similarity: S) -> Self {
        Self { config, similarity }
    }

    /// Whether the batch-size condition holds for a run of `batch_size` notes.
    pub fn batch_fires(&self, batch_size: usize) -> bool {
        self.config.enabled && batch_size >= self.config.batch_trigger_count
    }

    /// Decides for one note body within a run of `batch_size` notes.
    pub fn evaluate_note(
        &self,
        body: &str,
        batch_size: usize,
        existing_summaries: &[String],
    ) -> TriggerDecision {
        if !self.config.enabled {
            return TriggerDecision::none();
        }

        let mut signals = Vec::new();
        if word_count(body) >= self.config.min_words {
            signals.push(TriggerSignal::LongEntry);
        }
        if self.config.batch_policy == BatchPolicy::PerNote && self.batch_fires(batch_size) {
            signals.push(TriggerSignal::BatchThreshold);
        }

        let best = self.max_similarity(body, existing_summaries);
        if best.is_some_and(|score| score >= self.config.redundancy_similarity_threshold) {
            signals.push(TriggerSignal::HighRedundancy);
        }

        TriggerDecision {
            signals,
            redundancy_score: best.unwrap_or(0.0),
        }
    }

    /// Decides for every note of a run.
    pub fn evaluate_batch(&self, bodies: &[&str], existing_summaries: &[String]) -> BatchDecision {
        let per_note = bodies
            .iter()
            .map(|body| self.evaluate_note(body, bodies.len(), existing_summaries))
            .collect();
        BatchDecision {
            per_note,
            batch_digest: self.config.batch_policy == BatchPolicy::Digest
                && self.batch_fires(bodies.len()),
        }
    }

    /// Best score against existing summaries; `None` when there are none.
    fn max_similarity(&self, body: &str, existing_summaries: &[String]) -> Option<f64> {
        existing_summaries
            .iter()
            .map(|existing| self.similarity.similarity(body, existing))
            .reduce(f64::max)
    }
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Reads every `vault/summaries/*.md` in path order.
pub fn load_existing_summaries(workspace: &Workspace) -> io::Result<Vec<String>> {
    let dir = workspace.summaries_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(fs::read_to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::{word_count, SummaryTrigger};
    use crate::config::{BatchPolicy, SummarizationConfig};
    use crate::model::note::TriggerSignal;
    use crate::summarize::similarity::{Similarity, TokenOverlap};

    struct Fixed(f64);

    impl Similarity for Fixed {
        fn similarity(&self, _a: &str, _b: &str) -> f64 {
            self.0
        }
    }

    fn config(min_words: usize, batch: usize, threshold: f64) -> SummarizationConfig {
        SummarizationConfig {
            enabled: true,
            min_words,
            batch_trigger_count: batch,
            redundancy_similarity_threshold: threshold,
            batch_policy: BatchPolicy::Digest,
            index_summaries: true,
        }
    }

    #[test]
    fn long_entry_triggers_at_min_words() {
        let config = config(20, 5, 0.9);
        let trigger = SummaryTrigger::new(&config, TokenOverlap);
        let long = "word ".repeat(20);
        let short = "word ".repeat(19);

        let decision = trigger.evaluate_note(&long, 1, &[]);
        assert_eq!(decision.signals, vec![TriggerSignal::LongEntry]);
        assert!(!trigger.evaluate_note(&short, 1, &[]).is_triggered());
    }

    #[test]
    fn redundancy_fires_at_threshold_and_not_below() {
        let config = config(1000, 50, 0.6);
        let existing = vec!["prior summary".to_string()];
        let epsilon = 1e-9;

        let at = SummaryTrigger::new(&config, Fixed(0.6));
        assert_eq!(
            at.evaluate_note("body", 1, &existing).signals,
            vec![TriggerSignal::HighRedundancy]
        );

        let above = SummaryTrigger::new(&config, Fixed(0.6 + epsilon));
        assert!(above.evaluate_note("body", 1, &existing).is_triggered());

        let below = SummaryTrigger::new(&config, Fixed(0.6 - epsilon));
        let decision = below.evaluate_note("body", 1, &existing);
        assert!(!decision.is_triggered());
        assert_eq!(decision.redundancy_score, 0.6 - epsilon);
    }

    #[test]
    fn redundancy_never_fires_without_existing_summaries() {
        let config = config(1000, 50, 0.0);
        let trigger = SummaryTrigger::new(&config, Fixed(1.0));
        let decision = trigger.evaluate_note("body", 1, &[]);
        assert_eq!(decision.redundancy_score, 0.0);
        assert!(!decision.is_triggered());
    }

    #[test]
    fn batch_digest_policy_requests_one_digest() {
        let config = config(1000, 3, 0.99);
        let trigger = SummaryTrigger::new(&config, TokenOverlap);
        let decision = trigger.evaluate_batch(&["a", "b", "c"], &[]);
        assert!(decision.batch_digest);
        assert!(decision.per_note.iter().all(|d| !d.is_triggered()));

        let small = trigger.evaluate_batch(&["a", "b"], &[]);
        assert!(!small.batch_digest);
    }

    #[test]
    fn per_note_policy_tags_every_note() {
        let config = SummarizationConfig {
            batch_policy: BatchPolicy::PerNote,
            ..config(1000, 2, 0.99)
        };
        let trigger = SummaryTrigger::new(&config, TokenOverlap);
        let decision = trigger.evaluate_batch(&["a", "b"], &[]);
        assert!(!decision.batch_digest);
        for note in &decision.per_note {
            assert_eq!(note.signals, vec![TriggerSignal::BatchThreshold]);
        }
    }

    #[test]
    fn disabled_summarization_never_fires() {
        let config = SummarizationConfig {
            enabled: false,
            ..config(1, 1, 0.0)
        };
        let trigger = SummaryTrigger::new(&config, Fixed(1.0));
        let decision = trigger.evaluate_batch(&["many words here"], &["x".to_string()]);
        assert!(!decision.batch_digest);
        assert!(!decision.per_note[0].is_triggered());
    }

    #[test]
    fn word_count_ignores_extra_whitespace() {
        assert_eq!(word_count("  one\ttwo \n three  "), 3);
        assert_eq!(word_count(""), 0);
    }
}
