//! Article analysis
//!
//! Everything here is deterministic and free of side effects, so re-running
//! the process stage over the same article yields the same classification.

mod lexicon;

pub use lexicon::OTHER_CATEGORY;

use crate::plugins::{html_to_text, ExtractedArticle};
use chrono::{DateTime, Utc};
use lexicon::{CATEGORIES, NEGATIVE_TERMS, POSITIVE_TERMS, STOP_WORDS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Keywords reported per article
pub const KEYWORD_LIMIT: usize = 5;

/// Minimum length (in characters) of a non-CJK keyword
const MIN_WORD_LEN: usize = 3;

/// Result of analyzing one article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleAnalysis {
    pub cleaned_content: String,
    pub fingerprint: String,
    pub keywords: Vec<String>,
    pub category: String,
    /// In [-1, 1]
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    /// Id of the earlier article this one repeats
    pub duplicate_of: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Five-step sentiment scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Negative,
    SlightlyNegative,
    Neutral,
    SlightlyPositive,
    Positive,
}

impl SentimentLabel {
    /// Maps a score in [-1, 1] onto the scale
    ///
    /// | Score | Label |
    /// |-------|-------|
    /// | ≤ -0.6 | negative |
    /// | (-0.6, -0.2] | slightly_negative |
    /// | (-0.2, 0.2) | neutral |
    /// | [0.2, 0.6) | slightly_positive |
    /// | ≥ 0.6 | positive |
    pub fn from_score(score: f64) -> Self {
        if score <= -0.6 {
            Self::Negative
        } else if score <= -0.2 {
            Self::SlightlyNegative
        } else if score < 0.2 {
            Self::Neutral
        } else if score < 0.6 {
            Self::SlightlyPositive
        } else {
            Self::Positive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::SlightlyNegative => "slightly_negative",
            Self::Neutral => "neutral",
            Self::SlightlyPositive => "slightly_positive",
            Self::Positive => "positive",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analyzes an extracted article
///
/// `duplicate_of` is left empty; duplicate detection needs the article store
/// and happens in the process stage.
pub fn analyze(article: &ExtractedArticle) -> ArticleAnalysis {
    let cleaned_content = clean_content(&article.content);
    let text = format!("{} {}", article.title, cleaned_content);
    let (sentiment_score, sentiment_label) = score_sentiment(&text);

    ArticleAnalysis {
        fingerprint: fingerprint(&article.title, &cleaned_content),
        keywords: extract_keywords(&text, KEYWORD_LIMIT),
        category: classify_category(&text),
        sentiment_score,
        sentiment_label,
        cleaned_content,
        duplicate_of: None,
        processed_at: Utc::now(),
    }
}

/// Fingerprint of an extracted article, as `analyze` computes it
///
/// Depends only on the title and content, so stores can record it as soon
/// as an article arrives.
pub fn article_fingerprint(article: &ExtractedArticle) -> String {
    fingerprint(&article.title, &clean_content(&article.content))
}

/// Strips leftover markup and collapses whitespace
pub fn clean_content(content: &str) -> String {
    html_to_text(content)
}

/// SHA-256 (hex) of the lowercased, whitespace-collapsed title and content
///
/// Articles repeating the same story under different URLs share a
/// fingerprint.
pub fn fingerprint(title: &str, content: &str) -> String {
    let normalized = format!("{} {}", title, content)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

/// Splits text into lowercase tokens
///
/// A token is a run of CJK ideographs or a run of other alphanumeric
/// characters; everything else separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_cjk = false;

    for c in text.chars() {
        let cjk = is_cjk(c);
        if cjk || c.is_alphanumeric() {
            if !current.is_empty() && cjk != current_cjk {
                tokens.push(std::mem::take(&mut current));
            }
            current_cjk = cjk;
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn is_keyword_candidate(token: &str) -> bool {
    if STOP_WORDS.contains(&token) {
        return false;
    }
    if token.chars().all(|c| c.is_numeric()) {
        return false;
    }
    if token.chars().next().is_some_and(is_cjk) {
        token.chars().count() >= 2
    } else {
        token.chars().count() >= MIN_WORD_LEN
    }
}

/// Most frequent tokens, ties broken alphabetically
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        if is_keyword_candidate(&token) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(token, _)| token).collect()
}

/// Occurrences of lexicon terms in text
///
/// ASCII terms match whole tokens; CJK terms match anywhere, since CJK text
/// has no word boundaries.
fn count_terms(lowercase_text: &str, token_counts: &HashMap<String, usize>, terms: &[&str]) -> usize {
    terms
        .iter()
        .map(|term| {
            if term.is_ascii() {
                token_counts.get(*term).copied().unwrap_or(0)
            } else {
                lowercase_text.matches(term).count()
            }
        })
        .sum()
}

fn token_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Category whose lexicon occurs most often, `other` when none occurs
pub fn classify_category(text: &str) -> String {
    let lowercase = text.to_lowercase();
    let counts = token_counts(text);

    let mut best: Option<(&str, usize)> = None;
    for &(category, terms) in CATEGORIES {
        let hits = count_terms(&lowercase, &counts, terms);
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((category, hits));
        }
    }

    best.map(|(category, _)| category)
        .unwrap_or(OTHER_CATEGORY)
        .to_string()
}

/// Lexicon sentiment score `(pos - neg) / (pos + neg)` and its label
pub fn score_sentiment(text: &str) -> (f64, SentimentLabel) {
    let lowercase = text.to_lowercase();
    let counts = token_counts(text);

    let positive = count_terms(&lowercase, &counts, POSITIVE_TERMS) as f64;
    let negative = count_terms(&lowercase, &counts, NEGATIVE_TERMS) as f64;

    let score = if positive + negative == 0.0 {
        0.0
    } else {
        (positive - negative) / (positive + negative)
    };

    (score, SentimentLabel::from_score(score))
}
