//! Keyword relevance filter and scorer.
//!
//! Each distinct include keyword found in a record adds [`INCLUDE_POINTS`]
//! to its score. Any exclude keyword drops the record outright when the mode
//! uses exclusion, whatever its score.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::Record;

pub const INCLUDE_POINTS: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Include,
    Exclude,
    #[default]
    Both,
}

impl FilterMode {
    fn includes(self) -> bool {
        matches!(self, Self::Include | Self::Both)
    }

    fn excludes(self) -> bool {
        matches!(self, Self::Exclude | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchFields {
    Title,
    Abstract,
    #[default]
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default)]
    pub include_keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default)]
    pub match_fields: MatchFields,
    #[serde(default)]
    pub min_score: u32,
}

/// A compiled keyword list.
pub struct KeywordMatcher {
    patterns: Vec<(String, Regex)>,
}

impl KeywordMatcher {
    /// Blank keywords and case-insensitive repeats are dropped.
    pub fn new(keywords: &[String]) -> Self {
        let mut patterns: Vec<(String, Regex)> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let keyword = keyword.trim();
            let lower = keyword.to_lowercase();
            if keyword.is_empty() || patterns.iter().any(|(k, _)| k.to_lowercase() == lower) {
                continue;
            }
            match Regex::new(&whole_word_pattern(keyword)) {
                Ok(re) => patterns.push((keyword.to_string(), re)),
                Err(e) => warn!(keyword, error = %e, "Ignoring keyword that does not compile"),
            }
        }
        Self { patterns }
    }

    pub(crate) fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Keywords present in `text`, in configured order.
    pub fn matches<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.patterns
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// First keyword present in `text`; stops at the first hit.
    pub fn first_match<'a>(&'a self, text: &str) -> Option<&'a str> {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(k, _)| k.as_str())
    }
}

/// Case-insensitive; the keyword may not touch a word character on either side.
/// Inner whitespace in multi-word keywords matches any whitespace run.
fn whole_word_pattern(keyword: &str) -> String {
    let body = keyword
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    format!(r"(?i)(?:^|\W){body}(?:\W|$)")
}

fn match_text(record: &Record, fields: MatchFields) -> String {
    match fields {
        MatchFields::Title => record.title.clone(),
        MatchFields::Abstract => record.abstract_text.clone(),
        MatchFields::All => record.full_text(),
    }
}

/// Score, drop and order records.
pub fn filter_records(records: Vec<Record>, config: &KeywordFilterConfig) -> Vec<Record> {
    if !config.enabled {
        return records;
    }

    let include = KeywordMatcher::new(&config.include_keywords);
    let exclude = KeywordMatcher::new(&config.exclude_keywords);
    info!(
        mode = ?config.mode,
        include = include.len(),
        exclude = exclude.len(),
        min_score = config.min_score,
        "Filtering records by keyword"
    );

    let total = records.len();
    let mut kept: Vec<Record> = Vec::with_capacity(total);

    for mut record in records {
        let text = match_text(&record, config.match_fields);

        let matched: Vec<String> = if config.mode.includes() {
            include.matches(&text).into_iter().map(str::to_string).collect()
        } else {
            Vec::new()
        };
        let score = INCLUDE_POINTS * matched.len() as u32;

        if config.mode.excludes() {
            if let Some(hit) = exclude.first_match(&text) {
                debug!(id = %record.id, keyword = hit, "Excluded");
                continue;
            }
        }
        if config.mode.includes() && score < config.min_score {
            debug!(id = %record.id, score, min_score = config.min_score, "Below minimum score");
            continue;
        }

        record.keyword_match_score = Some(score);
        record.matched_keywords = Some(matched);
        kept.push(record);
    }

    // Vec::sort_by is stable.
    kept.sort_by(|a, b| b.keyword_match_score.cmp(&a.keyword_match_score));

    info!(total, retained = kept.len(), "Keyword filter complete");
    kept
}
