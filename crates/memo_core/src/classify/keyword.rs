//! Keyword and pattern scoring classifier.
//!
//! Rules:
//! - One point per keyword of a category found in the lowercased text.
//! - Checkbox line: +3 todo. URL: +2 reference. ISO date: +1 log.
//! - Question mark with speculative phrasing: +1 idea.
//! - Highest score wins; ties resolve in `Category::ALL` order.
//! - No signal at all defaults to `reference`.

use super::Classifier;
use crate::config::TaxonomyConfig;
use crate::model::category::Category;
use crate::model::note::{Classification, StagedNote};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

const TODO_KEYWORDS: &[&str] = &[
    "todo",
    "to-do",
    "task",
    "next",
    "follow up",
    "action item",
    "deadline",
    "due",
    "must",
    "need to",
    "should",
];
const IDEA_KEYWORDS: &[&str] = &[
    "idea",
    "brainstorm",
    "concept",
    "proposal",
    "hypothesis",
    "what if",
    "could we",
    "maybe",
    "experiment",
];
const REFERENCE_KEYWORDS: &[&str] = &[
    "reference",
    "link",
    "documentation",
    "doc",
    "api",
    "guide",
    "source",
    "citation",
    "how-to",
];
const LOG_KEYWORDS: &[&str] = &[
    "today",
    "yesterday",
    "update",
    "status",
    "progress",
    "retrospective",
    "done",
    "completed",
    "blocked",
];

const DEFAULT_CONFIDENCE: f64 = 0.25;
const AMBIGUOUS_CONFIDENCE_CAP: f64 = 0.45;
const OUT_OF_TAXONOMY_CONFIDENCE_CAP: f64 = 0.35;

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w])#([A-Za-z][A-Za-z0-9_-]{1,40})").expect("valid hashtag regex")
});
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://").expect("valid url regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("valid date regex"));
static CHECKBOX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*]\s*\[[ xX]\]").expect("valid checkbox regex"));

/// Default heuristic classifier bound to one taxonomy.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    taxonomy: TaxonomyConfig,
}

impl KeywordClassifier {
    pub fn new(taxonomy: TaxonomyConfig) -> Self {
        Self { taxonomy }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(TaxonomyConfig::default())
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, note: &StagedNote) -> Classification {
        let scores = compute_scores(&note.content);

        let mut ranked: Vec<(Category, u32)> = Category::ALL
            .iter()
            .zip(scores.iter())
            .map(|(category, score)| (*category, *score))
            .collect();
        // Stable sort keeps `Category::ALL` order among equal scores.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let (top_category, top_score) = ranked[0];
        let second_score = ranked[1].1;
        let total: u32 = scores.iter().sum();

        let (mut category, mut confidence, mut reasoning) = if top_score == 0 {
            (
                Category::Reference,
                DEFAULT_CONFIDENCE,
                "no strong lexical signal; defaulted to reference".to_string(),
            )
        } else {
            let ratio = round3(f64::from(top_score) / f64::from(total.max(1)));
            if top_score - second_score <= 1 {
                (
                    top_category,
                    ratio.min(AMBIGUOUS_CONFIDENCE_CAP),
                    "ambiguous lexical signal across categories".to_string(),
                )
            } else {
                (
                    top_category,
                    ratio,
                    format!("dominant lexical signal in {top_category}"),
                )
            }
        };

        if !self.taxonomy.core_categories.contains(&category) {
            category = Category::Reference;
            confidence = confidence.min(OUT_OF_TAXONOMY_CONFIDENCE_CAP);
            reasoning = "category outside configured taxonomy; defaulted to reference".to_string();
        }

        Classification {
            category,
            tags: extract_tags(note, category, self.taxonomy.allow_custom_tags),
            confidence,
            reasoning,
        }
    }
}

/// Scores in `Category::ALL` order.
fn compute_scores(text: &str) -> [u32; 4] {
    let lowered = text.to_lowercase();
    let mut scores = [
        keyword_score(&lowered, IDEA_KEYWORDS),
        keyword_score(&lowered, TODO_KEYWORDS),
        keyword_score(&lowered, REFERENCE_KEYWORDS),
        keyword_score(&lowered, LOG_KEYWORDS),
    ];

    if CHECKBOX_RE.is_match(text) {
        scores[1] += 3;
    }
    if URL_RE.is_match(text) {
        scores[2] += 2;
    }
    if DATE_RE.is_match(text) {
        scores[3] += 1;
    }
    if text.contains('?')
        && ["could", "maybe", "what if"]
            .iter()
            .any(|token| lowered.contains(token))
    {
        scores[0] += 1;
    }

    scores
}

fn keyword_score(lowered: &str, keywords: &[&str]) -> u32 {
    keywords
        .iter()
        .filter(|keyword| lowered.contains(*keyword))
        .count() as u32
}

fn extract_tags(note: &StagedNote, category: Category, allow_custom_tags: bool) -> Vec<String> {
    let mut tags = BTreeSet::new();
    tags.insert(category.as_str().to_string());

    if category == Category::Todo {
        let lowered = note.body.to_lowercase();
        if lowered.contains("urgent") || lowered.contains("asap") {
            tags.insert("priority".to_string());
        }
        if lowered.contains("deadline") || lowered.contains("due") {
            tags.insert("deadline".to_string());
        }
    }

    if allow_custom_tags {
        for captures in HASHTAG_RE.captures_iter(&note.content) {
            if let Some(tag) = captures.get(1) {
                tags.insert(tag.as_str().to_lowercase());
            }
        }
    }

    tags.into_iter().collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
