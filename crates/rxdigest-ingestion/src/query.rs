//! Query construction from keyword-group configuration.
//!
//! The built [`SearchQuery`] is a coarse pre-filter at the source level: it
//! is rendered to arXiv's query syntax for the arXiv API and evaluated
//! client-side for sources whose API has no search (bioRxiv/medRxiv). Final
//! relevance is decided later by [`crate::filter`].

use chrono::{Datelike, Duration, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Highest token distance between consecutive keywords of an ADJACENT group
/// when evaluated client-side.
const NEAR_WINDOW: usize = 5;

/// Upper bound of arXiv's `submittedDate` range clause.
const ARXIV_DATE_CEILING: &str = "99991231235959";

/// One keyword-combination rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "keywords", rename_all = "UPPERCASE")]
pub enum QueryGroup {
    /// Every keyword must appear.
    And(Vec<String>),
    /// Any keyword may appear.
    Or(Vec<String>),
    /// Keywords must appear close together. Needs at least two keywords.
    Adjacent(Vec<String>),
    /// First keyword required, the rest excluded. Needs at least two keywords.
    Not(Vec<String>),
}

impl QueryGroup {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryGroup::And(_)      => "AND",
            QueryGroup::Or(_)       => "OR",
            QueryGroup::Adjacent(_) => "ADJACENT",
            QueryGroup::Not(_)      => "NOT",
        }
    }

    pub fn keywords(&self) -> &[String] {
        match self {
            QueryGroup::And(k) | QueryGroup::Or(k) | QueryGroup::Adjacent(k) | QueryGroup::Not(k) => k,
        }
    }

    /// Whether the group yields a clause at all.
    pub fn is_usable(&self) -> bool {
        let n = self.keywords().iter().filter(|k| !k.trim().is_empty()).count();
        match self {
            QueryGroup::And(_) | QueryGroup::Or(_) => n >= 1,
            QueryGroup::Adjacent(_) | QueryGroup::Not(_) => n >= 2,
        }
    }

    fn to_expr(&self) -> Option<QueryExpr> {
        if !self.is_usable() {
            return None;
        }
        let terms: Vec<String> = self
            .keywords()
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        Some(match self {
            QueryGroup::And(_) => QueryExpr::All(terms.into_iter().map(QueryExpr::Term).collect()),
            QueryGroup::Or(_) => QueryExpr::Any(terms.into_iter().map(QueryExpr::Term).collect()),
            QueryGroup::Adjacent(_) => QueryExpr::Near(terms),
            QueryGroup::Not(_) => {
                let mut it = terms.into_iter();
                let include = it.next()?;
                QueryExpr::Not { include, exclude: it.collect() }
            }
        })
    }
}

/// Source-independent keyword expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QueryExpr {
    /// Wildcard used when no group produced a clause.
    MatchAll,
    Term(String),
    All(Vec<QueryExpr>),
    Any(Vec<QueryExpr>),
    Near(Vec<String>),
    Not { include: String, exclude: Vec<String> },
}

impl QueryExpr {
    /// Render in arXiv API query syntax.
    pub fn to_arxiv(&self) -> String {
        match self {
            QueryExpr::MatchAll => "all:*".to_string(),
            QueryExpr::Term(t) => arxiv_term(t),
            QueryExpr::All(parts) => join_arxiv(parts, " AND "),
            QueryExpr::Any(parts) => join_arxiv(parts, " OR "),
            QueryExpr::Near(terms) => {
                let rendered: Vec<String> = terms.iter().map(|t| arxiv_term(t)).collect();
                format!("({})", rendered.join(" NEAR "))
            }
            QueryExpr::Not { include, exclude } => {
                let mut out = arxiv_term(include);
                for t in exclude {
                    out.push_str(" ANDNOT ");
                    out.push_str(&arxiv_term(t));
                }
                format!("({out})")
            }
        }
    }

    /// Evaluate against free text: case-insensitive, whole words only.
    pub fn matches(&self, text: &str) -> bool {
        self.matches_tokens(&tokenize(text))
    }

    fn matches_tokens(&self, tokens: &[String]) -> bool {
        match self {
            QueryExpr::MatchAll => true,
            QueryExpr::Term(t) => !phrase_positions(tokens, &tokenize(t)).is_empty(),
            QueryExpr::All(parts) => parts.iter().all(|p| p.matches_tokens(tokens)),
            QueryExpr::Any(parts) => parts.iter().any(|p| p.matches_tokens(tokens)),
            QueryExpr::Near(terms) => near_match(tokens, terms),
            QueryExpr::Not { include, exclude } => {
                !phrase_positions(tokens, &tokenize(include)).is_empty()
                    && exclude
                        .iter()
                        .all(|t| phrase_positions(tokens, &tokenize(t)).is_empty())
            }
        }
    }
}

/// A built query: domain restriction AND keyword expression AND date lower bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub domains: Vec<String>,
    pub keywords: QueryExpr,
    /// Inclusive lower bound on submission date; `None` means unrestricted.
    pub since: Option<NaiveDate>,
}

impl SearchQuery {
    /// Full arXiv `search_query` value.
    pub fn to_arxiv_query(&self) -> String {
        let mut clauses = Vec::with_capacity(3);

        let domains: Vec<String> = self
            .domains
            .iter()
            .filter(|d| !d.trim().is_empty())
            .map(|d| format!("cat:{}", d.trim()))
            .collect();
        if !domains.is_empty() {
            clauses.push(format!("({})", domains.join(" OR ")));
        }

        clauses.push(self.keywords.to_arxiv());

        if let Some(since) = self.since {
            clauses.push(format!(
                "submittedDate:[{}000000 TO {}]",
                since.format("%Y%m%d"),
                ARXIV_DATE_CEILING
            ));
        }

        clauses.join(" AND ")
    }

    /// Client-side keyword pre-filter for sources without server-side search.
    pub fn matches_text(&self, text: &str) -> bool {
        self.keywords.matches(text)
    }

    pub fn is_match_all(&self) -> bool {
        self.keywords == QueryExpr::MatchAll
    }
}

/// Build a query relative to today's date (UTC).
pub fn build_query(groups: &[QueryGroup], domains: &[String], days: u32) -> SearchQuery {
    build_query_at(groups, domains, days, Utc::now().date_naive())
}

/// Build a query relative to an explicit `today`.
pub fn build_query_at(
    groups: &[QueryGroup],
    domains: &[String],
    days: u32,
    today: NaiveDate,
) -> SearchQuery {
    let mut clauses = Vec::new();
    for group in groups {
        match group.to_expr() {
            Some(expr) => clauses.push(expr),
            None => info!(
                kind = group.kind(),
                keywords = ?group.keywords(),
                "Skipping keyword group without enough keywords"
            ),
        }
    }

    let keywords = match clauses.len() {
        0 => QueryExpr::MatchAll,
        1 => clauses.remove(0),
        _ => QueryExpr::Any(clauses),
    };

    let since = if days > 0 { window_start(today, days) } else { None };

    let query = SearchQuery { domains: domains.to_vec(), keywords, since };
    debug!(query = %query.to_arxiv_query(), "Built search query");
    query
}

// ── helpers ─────────────────────────────────────────────────────────────────

/// First day of a `days`-long window ending `today`. Windows reaching back
/// before year 1 cannot be rendered as a date clause and count as unrestricted.
fn window_start(today: NaiveDate, days: u32) -> Option<NaiveDate> {
    let start = today
        .checked_sub_signed(Duration::days(i64::from(days)))
        .filter(|d| d.year() >= 1);
    if start.is_none() {
        debug!(days, "Search window exceeds the calendar, not restricting by date");
    }
    start
}

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").unwrap();
}

fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Start offsets where `phrase` occurs as a contiguous token run.
fn phrase_positions(tokens: &[String], phrase: &[String]) -> Vec<usize> {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return Vec::new();
    }
    tokens
        .windows(phrase.len())
        .enumerate()
        .filter(|(_, w)| *w == phrase)
        .map(|(i, _)| i)
        .collect()
}

/// Each keyword appears after the previous one, within `NEAR_WINDOW` tokens.
fn near_match(tokens: &[String], terms: &[String]) -> bool {
    let phrases: Vec<Vec<String>> = terms.iter().map(|t| tokenize(t)).collect();
    let Some((first, rest)) = phrases.split_first() else {
        return false;
    };

    'start: for start in phrase_positions(tokens, first) {
        let mut end = start + first.len();
        for phrase in rest {
            let next = phrase_positions(tokens, phrase)
                .into_iter()
                .find(|&p| p >= end && p - end <= NEAR_WINDOW);
            match next {
                Some(p) => end = p + phrase.len(),
                None => continue 'start,
            }
        }
        return true;
    }
    false
}

fn arxiv_term(term: &str) -> String {
    let term = term.replace('"', "");
    if term.split_whitespace().count() > 1 {
        format!("all:\"{}\"", term.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        format!("all:{}", term.trim())
    }
}

fn join_arxiv(parts: &[QueryExpr], sep: &str) -> String {
    match parts {
        [single] => single.to_arxiv(),
        _ => {
            let rendered: Vec<String> = parts.iter().map(QueryExpr::to_arxiv).collect();
            format!("({})", rendered.join(sep))
        }
    }
}
