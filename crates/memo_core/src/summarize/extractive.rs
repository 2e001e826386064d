//! Extractive summarizer: picks sentences, bullets and action lines verbatim.

use super::{DigestItem, Summarizer};
use crate::model::category::Category;
use crate::model::note::{Summary, TriggerSignal};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

const SHORT_SUMMARY_SENTENCES: usize = 3;
const SHORT_SUMMARY_MAX_CHARS: usize = 500;
const MAX_KEY_POINTS: usize = 5;
const MAX_ACTIONS: usize = 8;
const DIGEST_POINT_MAX_CHARS: usize = 160;

static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*]\s+(.+)$").expect("valid bullet regex"));
static ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*[-*]?\s*(?:\[[ x]\]\s*)?((?:do|build|write|ship|fix|review|plan|draft|call|email)\b.+)$",
    )
    .expect("valid action regex")
});
static CHECKBOX_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*]\s*\[[ xX]\]\s+(.*)$").expect("valid checkbox item regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(
        &self,
        text: &str,
        category: Category,
        triggered_by: &[TriggerSignal],
        redundancy_score: f64,
    ) -> Summary {
        let sentences = split_sentences(text);
        let short_summary = truncate_chars(
            &sentences
                .iter()
                .take(SHORT_SUMMARY_SENTENCES)
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
            SHORT_SUMMARY_MAX_CHARS,
        );

        let actions = if matches!(category, Category::Todo | Category::Idea) {
            extract_actions(text)
        } else {
            Vec::new()
        };

        Summary {
            short_summary,
            key_points: extract_key_points(text, &sentences),
            actions,
            triggered_by: triggered_by.to_vec(),
            redundancy_score: Some(round3(redundancy_score)),
        }
    }

    fn digest(&self, items: &[DigestItem<'_>]) -> Summary {
        let key_points = items
            .iter()
            .map(|item| {
                let lead = split_sentences(item.body)
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                format!(
                    "[{}] {}: {}",
                    item.category,
                    item.entry_id,
                    truncate_chars(&lead, DIGEST_POINT_MAX_CHARS)
                )
            })
            .collect();

        let mut categories = BTreeSet::new();
        for item in items {
            categories.insert(item.category.as_str());
        }

        Summary {
            short_summary: format!(
                "Batch of {} notes across {}.",
                items.len(),
                categories.into_iter().collect::<Vec<_>>().join(", ")
            ),
            key_points,
            actions: Vec::new(),
            triggered_by: vec![TriggerSignal::BatchThreshold],
            redundancy_score: None,
        }
    }
}

/// Splits whitespace-normalized text after `.`, `!` or `?` followed by space.
fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = normalized.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek() == Some(&' ') {
            chars.next();
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, value: &str) {
    let trimmed = value.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

fn extract_key_points(text: &str, sentences: &[String]) -> Vec<String> {
    let bullets: Vec<String> = BULLET_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .take(MAX_KEY_POINTS)
        .collect();
    if !bullets.is_empty() {
        return bullets;
    }
    sentences.iter().take(MAX_KEY_POINTS).cloned().collect()
}

fn extract_actions(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut actions = Vec::new();

    for line in text.lines() {
        let candidate = if let Some(caps) = ACTION_RE.captures(line) {
            caps.get(1).map(|m| m.as_str().trim().to_string())
        } else {
            CHECKBOX_ITEM_RE
                .captures(line)
                .and_then(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        };

        let Some(action) = candidate.filter(|value| !value.is_empty()) else {
            continue;
        };
        if seen.insert(action.to_lowercase()) {
            actions.push(action);
        }
        if actions.len() == MAX_ACTIONS {
            break;
        }
    }

    actions
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
