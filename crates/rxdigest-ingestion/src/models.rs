//! Data models for the acquisition pipeline.

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Substituted when a source reports no authors.
pub const UNKNOWN_AUTHOR: &str = "unknown author";

/// A normalized preprint record, produced by exactly one source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Source-prefixed and stable across fetches, e.g. `arxiv_2401.00001`.
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub published: NaiveDate,
    pub source: RecordSource,
    pub categories: Vec<String>,
    pub pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Set by the keyword filter only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_match_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_keywords: Option<Vec<String>>,
}

impl Record {
    /// Title and abstract joined by a space. Used for keyword matching only.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Arxiv,
    BioRxiv,
    MedRxiv,
    Manual,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Arxiv   => "arxiv",
            RecordSource::BioRxiv => "biorxiv",
            RecordSource::MedRxiv => "medrxiv",
            RecordSource::Manual  => "manual",
        }
    }
}

/// Why a remote item could not become a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum NormaliseError {
    MissingField(&'static str),
    BadDate(String),
}

impl std::fmt::Display for NormaliseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormaliseError::MissingField(field) => write!(f, "missing required field `{field}`"),
            NormaliseError::BadDate(raw) => write!(f, "unparseable date {raw:?}"),
        }
    }
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",   // 2024-01-02
    "%B %d, %Y",  // January 2, 2024
    "%b %d, %Y",  // Jan 2, 2024
    "%d %B %Y",   // 2 January 2024
    "%d %b %Y",   // 2 Jan 2024
];

lazy_static! {
    static ref EMBEDDED_DATE: Regex = Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Parse a publication date from any of the textual forms sources emit.
pub fn parse_published(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    {
        return Some(date);
    }

    let caps = EMBEDDED_DATE.captures(raw)?;
    NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )
}

/// Collapse runs of whitespace (Atom titles wrap across lines).
pub fn clean_text(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// Authors list with the placeholder substituted for an empty one.
pub fn authors_or_placeholder(authors: Vec<String>) -> Vec<String> {
    if authors.is_empty() {
        vec![UNKNOWN_AUTHOR.to_string()]
    } else {
        authors
    }
}

/// Order-preserving category list without duplicates or blanks.
pub fn unique_categories<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for c in raw {
        let c = c.into();
        let c = c.trim();
        if !c.is_empty() && !out.iter().any(|seen| seen == c) {
            out.push(c.to_string());
        }
    }
    out
}

/// Content hash of a title, used as an id only when the source has no stable identifier.
pub fn title_hash(title: &str) -> String {
    let digest = Sha256::digest(clean_text(title).to_lowercase().as_bytes());
    digest.iter().take(12).map(|b| format!("{b:02x}")).collect()
}
